//! Configuration loading and validation.
//!
//! JSON5 format, camelCase keys, every field defaulted.
//! Config location: `~/.gatehouse/gatehouse.json`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default token expiry in hours.
const DEFAULT_TOKEN_EXPIRY_HOURS: u64 = 24;
/// Longest accepted token expiry (one year).
pub const MAX_TOKEN_EXPIRY_HOURS: u64 = 8760;
/// Default session cookie name.
const DEFAULT_COOKIE_NAME: &str = "gatehouse_session";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server configuration.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Session and credential configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Route areas used by the access policy.
    #[serde(default)]
    pub routes: RouteConfig,

    /// Global settings.
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns error if config cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("gatehouse.json")
    }

    /// Get the Gatehouse state directory.
    ///
    /// Uses `GATEHOUSE_STATE_DIR` env var if set, otherwise `~/.gatehouse`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("GATEHOUSE_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".gatehouse")
        } else {
            PathBuf::from(".gatehouse")
        }
    }

    /// Directory holding the credential store.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.gateway
            .data_dir
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("data"))
    }

    /// Apply environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(port) = std::env::var("GATEHOUSE_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            self.gateway.port = port;
        }

        if let Ok(dir) = std::env::var("GATEHOUSE_DATA_DIR") {
            self.gateway.data_dir = Some(PathBuf::from(dir));
        }

        self.auth = self.auth.with_env_overrides();
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.port == 0 {
            return Err(ConfigError::Validation(
                "Gateway port cannot be 0".to_string(),
            ));
        }

        if self.auth.token_expiry_hours == 0 {
            return Err(ConfigError::Validation(
                "Token expiry must be at least one hour".to_string(),
            ));
        }

        if self.auth.token_expiry_hours > MAX_TOKEN_EXPIRY_HOURS {
            return Err(ConfigError::Validation(format!(
                "Token expiry cannot exceed {MAX_TOKEN_EXPIRY_HOURS} hours"
            )));
        }

        if self.auth.cookie_name.is_empty() {
            return Err(ConfigError::Validation(
                "Cookie name cannot be empty".to_string(),
            ));
        }

        self.routes.validate()
    }
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address mode.
    #[serde(default)]
    pub mode: BindMode,

    /// Enable CORS.
    #[serde(default)]
    pub cors: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Credential store directory (defaults to `<state dir>/data`).
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            mode: BindMode::default(),
            cors: false,
            timeout_secs: default_timeout(),
            data_dir: None,
        }
    }
}

impl GatewayConfig {
    /// Resolve the bind address for the configured mode.
    #[must_use]
    pub fn bind_address(&self) -> String {
        match &self.mode {
            BindMode::Local => "127.0.0.1".to_string(),
            BindMode::Public => "0.0.0.0".to_string(),
            BindMode::Custom(addr) => addr.clone(),
        }
    }
}

const fn default_port() -> u16 {
    8787
}

const fn default_timeout() -> u64 {
    30
}

/// Gateway bind mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Bind to localhost only.
    #[default]
    Local,
    /// Bind to all interfaces.
    Public,
    /// Custom bind address.
    Custom(String),
}

/// Session and credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// JWT secret (hex-encoded). Generated at start-up if not set.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Session token expiry in hours.
    #[serde(default = "default_token_expiry")]
    pub token_expiry_hours: u64,

    /// Name of the HTTP-only session cookie.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Mark the session cookie `Secure` (HTTPS only).
    #[serde(default)]
    pub secure_cookie: bool,

    /// Password hashing cost.
    #[serde(default)]
    pub hashing: HashingConfig,
}

fn default_token_expiry() -> u64 {
    DEFAULT_TOKEN_EXPIRY_HOURS
}

fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_expiry_hours: default_token_expiry(),
            cookie_name: default_cookie_name(),
            secure_cookie: false,
            hashing: HashingConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Create a new auth config builder.
    #[must_use]
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Get token expiry as Duration.
    ///
    /// Saturates rather than overflowing; `Config::validate` bounds the
    /// accepted range.
    #[must_use]
    pub const fn token_expiry(&self) -> Duration {
        Duration::from_secs(self.token_expiry_hours.saturating_mul(3600))
    }

    /// Load overrides from environment variables.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var("GATEHOUSE_JWT_SECRET") {
            self.jwt_secret = Some(secret);
        }
        self
    }
}

/// Argon2 cost parameters.
///
/// Fixed per deployment; every stored digest embeds the parameters it was
/// produced with, so changing these only affects new hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashingConfig {
    /// Memory cost in KiB.
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    /// Number of passes.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Degree of parallelism.
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

const fn default_memory_kib() -> u32 {
    19 * 1024
}

const fn default_iterations() -> u32 {
    2
}

const fn default_parallelism() -> u32 {
    1
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

/// Builder for `AuthConfig`.
#[derive(Debug, Default)]
pub struct AuthConfigBuilder {
    config: AuthConfig,
}

impl AuthConfigBuilder {
    /// Set the JWT secret.
    #[must_use]
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt_secret = Some(secret.into());
        self
    }

    /// Set token expiry in hours.
    #[must_use]
    pub const fn token_expiry_hours(mut self, hours: u64) -> Self {
        self.config.token_expiry_hours = hours;
        self
    }

    /// Set the session cookie name.
    #[must_use]
    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.config.cookie_name = name.into();
        self
    }

    /// Set whether the cookie is `Secure`.
    #[must_use]
    pub const fn secure_cookie(mut self, secure: bool) -> Self {
        self.config.secure_cookie = secure;
        self
    }

    /// Set the hashing cost.
    #[must_use]
    pub const fn hashing(mut self, hashing: HashingConfig) -> Self {
        self.config.hashing = hashing;
        self
    }

    /// Build the config.
    #[must_use]
    pub fn build(self) -> AuthConfig {
        self.config
    }
}

/// Route areas consulted by the access policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    /// Prefix of the admin-only area.
    #[serde(default = "default_admin_prefix")]
    pub admin_prefix: String,
    /// Prefix of the area open to any signed-in account.
    #[serde(default = "default_protected_prefix")]
    pub protected_prefix: String,
    /// Login entry point.
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Registration entry point.
    #[serde(default = "default_register_path")]
    pub register_path: String,
    /// Where signed-in accounts land.
    #[serde(default = "default_landing_path")]
    pub landing_path: String,
}

fn default_admin_prefix() -> String {
    "/admin".to_string()
}

fn default_protected_prefix() -> String {
    "/dashboard".to_string()
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_register_path() -> String {
    "/register".to_string()
}

fn default_landing_path() -> String {
    "/dashboard".to_string()
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            admin_prefix: default_admin_prefix(),
            protected_prefix: default_protected_prefix(),
            login_path: default_login_path(),
            register_path: default_register_path(),
            landing_path: default_landing_path(),
        }
    }
}

impl RouteConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (key, path) in [
            ("adminPrefix", &self.admin_prefix),
            ("protectedPrefix", &self.protected_prefix),
            ("loginPath", &self.login_path),
            ("registerPath", &self.register_path),
            ("landingPath", &self.landing_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "routes.{key} must start with '/', got '{path}'"
                )));
            }
        }
        Ok(())
    }
}

/// Global settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Enable debug logging.
    #[serde(default)]
    pub debug: bool,

    /// Log format.
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway.port, 8787);
        assert_eq!(config.auth.token_expiry_hours, 24);
        assert_eq!(config.auth.cookie_name, "gatehouse_session");
        assert_eq!(config.routes.admin_prefix, "/admin");
        assert_eq!(config.routes.landing_path, "/dashboard");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");

        let mut config = Config::default();
        config.gateway.port = 9000;
        config.routes.protected_prefix = "/app".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.gateway.port, 9000);
        assert_eq!(loaded.routes.protected_prefix, "/app");
    }

    #[test]
    fn test_json5_parsing() {
        let json5_content = r#"{
            // comments and trailing commas are fine
            gateway: {
                port: 8080,
                mode: "public",
            },
            auth: {
                tokenExpiryHours: 2,
                secureCookie: true,
            },
            settings: { logFormat: "json" },
        }"#;

        let config: Config = json5::from_str(json5_content).unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.bind_address(), "0.0.0.0");
        assert_eq!(config.auth.token_expiry(), Duration::from_secs(2 * 3600));
        assert!(config.auth.secure_cookie);
        assert_eq!(config.auth.cookie_name, "gatehouse_session");
        assert_eq!(config.settings.log_format, LogFormat::Json);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.gateway.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.auth.token_expiry_hours = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.auth.token_expiry_hours = MAX_TOKEN_EXPIRY_HOURS;
        assert!(config.validate().is_ok());
        config.auth.token_expiry_hours = MAX_TOKEN_EXPIRY_HOURS + 1;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = Config::default();
        config.routes.login_path = "login".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_token_expiry_saturates() {
        let config = AuthConfig::builder()
            .token_expiry_hours(u64::MAX / 1000)
            .build();
        assert_eq!(config.token_expiry(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_oversized_expiry_rejected_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gatehouse.json");
        std::fs::write(&path, "{ auth: { tokenExpiryHours: 1000000 } }").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_auth_builder() {
        let config = AuthConfig::builder()
            .jwt_secret("abcd")
            .token_expiry_hours(12)
            .cookie_name("sid")
            .secure_cookie(true)
            .build();

        assert_eq!(config.jwt_secret.as_deref(), Some("abcd"));
        assert_eq!(config.token_expiry(), Duration::from_secs(12 * 3600));
        assert_eq!(config.cookie_name, "sid");
        assert!(config.secure_cookie);
    }

    #[test]
    fn test_data_dir_override() {
        let mut config = Config::default();
        config.gateway.data_dir = Some(PathBuf::from("/tmp/gatehouse-data"));
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/gatehouse-data"));
    }
}
