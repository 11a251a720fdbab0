//! Form input validation and sanitization.
//!
//! Every form is deserialized into a typed struct that rejects unknown
//! fields, then checked here. Failures come back as [`FieldErrors`], keyed by
//! field name, with form-level problems under [`FORM_FIELD`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use unicode_normalization::UnicodeNormalization;
use validator::{Validate, ValidateEmail, ValidationErrors};

use crate::types::Email;

/// Reserved key for errors not attributable to a single field.
pub const FORM_FIELD: &str = "_form";

/// Minimum name length, in characters, after sanitizing.
pub const MIN_NAME_LENGTH: usize = 3;

/// Minimum password length, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Per-field error messages, in the order the rules were checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A single form-level error.
    #[must_use]
    pub fn form(message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(FORM_FIELD, message);
        errors
    }

    /// Append a message for `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Messages recorded for `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Whether no errors were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields with errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over `(field, messages)` pairs in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// `Ok(value)` when empty, otherwise `Err(self)`.
    ///
    /// # Errors
    ///
    /// Returns `self` if any error was recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = Self::new();
        for (field, list) in errors.field_errors() {
            for err in list {
                let message = err
                    .message
                    .as_ref()
                    .map_or_else(|| err.code.to_string(), ToString::to_string);
                out.add(field.to_string(), message);
            }
        }
        out
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Strip control characters, apply NFKC and trim.
#[must_use]
pub fn sanitize_text(input: &str) -> String {
    let stripped: String = input.chars().filter(|c| !c.is_control()).collect();
    stripped.nfkc().collect::<String>().trim().to_string()
}

fn optional_text(input: Option<String>) -> Option<String> {
    input
        .map(|s| sanitize_text(&s))
        .filter(|s| !s.is_empty())
}

/// Check a sanitized display name.
pub fn check_name(name: &str, errors: &mut FieldErrors) {
    if name.chars().count() < MIN_NAME_LENGTH {
        errors.add("name", "name must be at least 3 characters");
    }
}

/// Check an email address is well-formed.
pub fn check_email(email: &str, errors: &mut FieldErrors) {
    if !email.trim().validate_email() {
        errors.add("email", "invalid email");
    }
}

/// Check the password composition rules. Every failing rule adds its own
/// message, in order: length, uppercase, lowercase, digit.
pub fn check_password(password: &str, errors: &mut FieldErrors) {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.add(
            "password",
            format!("password must be at least {MIN_PASSWORD_LENGTH} characters"),
        );
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.add("password", "password must contain an uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.add("password", "password must contain a lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.add("password", "password must contain a digit");
    }
}

/// Registration form as submitted.
#[derive(Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RegisterForm {
    /// Display name.
    #[validate(length(min = 3, message = "name must be at least 3 characters"))]
    #[serde(default)]
    pub name: String,
    /// Email address.
    #[validate(email(message = "invalid email"))]
    #[serde(default)]
    pub email: String,
    /// Plaintext password.
    #[serde(default)]
    pub password: String,
    /// Postal code.
    #[serde(default)]
    pub cep: Option<String>,
    /// State.
    #[serde(default)]
    pub state: Option<String>,
    /// City.
    #[serde(default)]
    pub city: Option<String>,
}

impl fmt::Debug for RegisterForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterForm")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .field("cep", &self.cep)
            .field("state", &self.state)
            .field("city", &self.city)
            .finish()
    }
}

/// A registration that passed every rule.
pub struct Registration {
    /// Sanitized name.
    pub name: String,
    /// Normalized email.
    pub email: Email,
    /// Plaintext password, to be hashed.
    pub password: String,
    /// Postal code, `None` when blank.
    pub cep: Option<String>,
    /// State, `None` when blank.
    pub state: Option<String>,
    /// City, `None` when blank.
    pub city: Option<String>,
}

impl RegisterForm {
    /// Sanitize and check every field.
    ///
    /// # Errors
    ///
    /// Returns every violated rule, attributed to its field.
    pub fn validated(mut self) -> Result<Registration, FieldErrors> {
        self.name = sanitize_text(&self.name);
        self.email = self.email.trim().to_string();

        let mut errors = self
            .validate()
            .map_or_else(FieldErrors::from, |()| FieldErrors::new());
        check_password(&self.password, &mut errors);

        errors.into_result(Registration {
            name: self.name,
            email: Email::new(&self.email),
            password: self.password,
            cep: optional_text(self.cep),
            state: optional_text(self.state),
            city: optional_text(self.city),
        })
    }
}

/// Login form as submitted.
#[derive(Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LoginForm {
    /// Email address.
    #[validate(email(message = "invalid email"))]
    #[serde(default)]
    pub email: String,
    /// Plaintext password.
    #[validate(length(min = 1, message = "password is required"))]
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginForm")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Credentials that passed the shape checks.
pub struct Credentials {
    /// Normalized email.
    pub email: Email,
    /// Plaintext password.
    pub password: String,
}

impl LoginForm {
    /// Check the email shape and that a password was given.
    ///
    /// # Errors
    ///
    /// Returns field errors for a malformed email or an empty password.
    pub fn validated(mut self) -> Result<Credentials, FieldErrors> {
        self.email = self.email.trim().to_string();
        self.validate().map_err(FieldErrors::from)?;
        Ok(Credentials {
            email: Email::new(&self.email),
            password: self.password,
        })
    }
}

/// Admin rename form.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateNameForm {
    /// New display name.
    #[validate(length(min = 3, message = "name must be at least 3 characters"))]
    #[serde(default)]
    pub name: String,
}

impl UpdateNameForm {
    /// Sanitize and check the new name.
    ///
    /// # Errors
    ///
    /// Returns a `name` field error when too short.
    pub fn validated(mut self) -> Result<String, FieldErrors> {
        self.name = sanitize_text(&self.name);
        self.validate().map_err(FieldErrors::from)?;
        Ok(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn register(name: &str, email: &str, password: &str) -> RegisterForm {
        RegisterForm {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            ..RegisterForm::default()
        }
    }

    #[test]
    fn test_valid_registration() {
        let mut form = register("Ana Silva", "Ana@Mail.com", "Abcdef12");
        form.cep = Some("  ".to_string());
        form.city = Some(" Recife ".to_string());

        let reg = form.validated().unwrap();
        assert_eq!(reg.name, "Ana Silva");
        assert_eq!(reg.email.as_str(), "ana@mail.com");
        assert_eq!(reg.cep, None);
        assert_eq!(reg.city.as_deref(), Some("Recife"));
    }

    #[test]
    fn test_password_rules_in_order() {
        let errors = register("Ana Silva", "ana@mail.com", "abc")
            .validated()
            .err()
            .unwrap();

        assert_eq!(
            errors.get("password").unwrap(),
            &[
                "password must be at least 8 characters".to_string(),
                "password must contain an uppercase letter".to_string(),
                "password must contain a digit".to_string(),
            ]
        );
        assert!(errors.get("name").is_none());
    }

    #[test]
    fn test_every_field_reported() {
        let errors = register("  A ", "not-an-email", "ABCDEFGH1")
            .validated()
            .err()
            .unwrap();

        assert_eq!(
            errors.get("name").unwrap(),
            &["name must be at least 3 characters".to_string()]
        );
        assert_eq!(errors.get("email").unwrap(), &["invalid email".to_string()]);
        assert_eq!(
            errors.get("password").unwrap(),
            &["password must contain a lowercase letter".to_string()]
        );
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let raw = r#"{"name":"Ana","email":"a@b.co","password":"x","role":"ADMIN"}"#;
        assert!(serde_json::from_str::<RegisterForm>(raw).is_err());

        let raw = r#"{"email":"a@b.co","password":"x","remember":true}"#;
        assert!(serde_json::from_str::<LoginForm>(raw).is_err());
    }

    #[test]
    fn test_login_validation() {
        let form = LoginForm {
            email: " Ana@Mail.com ".to_string(),
            password: "whatever".to_string(),
        };
        assert_eq!(form.validated().unwrap().email.as_str(), "ana@mail.com");

        let errors = LoginForm {
            email: "nope".to_string(),
            password: String::new(),
        }
        .validated()
        .err()
        .unwrap();
        assert_eq!(errors.get("email").unwrap(), &["invalid email".to_string()]);
        assert_eq!(
            errors.get("password").unwrap(),
            &["password is required".to_string()]
        );
    }

    #[test]
    fn test_update_name() {
        let form = UpdateNameForm {
            name: " Bi\u{0007} ".to_string(),
        };
        assert!(form.validated().is_err());

        let form = UpdateNameForm {
            name: " Bia\u{0007} ".to_string(),
        };
        assert_eq!(form.validated().unwrap(), "Bia");
    }

    #[test]
    fn test_form_errors_serialize() {
        let errors = FieldErrors::form("invalid credentials");
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            serde_json::json!({ "_form": ["invalid credentials"] })
        );
        assert_eq!(errors.to_string(), "_form: invalid credentials");
    }

    #[test]
    fn test_field_checks() {
        let mut errors = FieldErrors::new();
        check_name("Ana", &mut errors);
        check_email(" ana@mail.com ", &mut errors);
        assert!(errors.is_empty());

        check_name("An", &mut errors);
        check_email("ana.mail.com", &mut errors);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("  ﬁne\u{0000} "), "fine");
    }

    #[test]
    fn test_password_not_in_debug() {
        let form = register("Ana Silva", "ana@mail.com", "Abcdef12");
        assert!(!format!("{form:?}").contains("Abcdef12"));
    }
}
