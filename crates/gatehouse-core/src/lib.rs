//! # Gatehouse Core
//!
//! Core types, configuration, and access policy for Gatehouse.
//!
//! This crate provides:
//! - Identity types (`UserId`, `Role`, `Email`) and session claims
//! - Configuration loading and validation (JSON5 format)
//! - Form input validation and sanitization
//! - The pure route authorization policy

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod policy;
pub mod types;
pub mod validation;

pub use config::{AuthConfig, Config, ConfigError, RouteConfig};
pub use policy::{Decision, SessionState, authorize_route};
pub use types::{Email, Role, SessionClaims, UserId};
pub use validation::{FORM_FIELD, FieldErrors, LoginForm, RegisterForm, UpdateNameForm};

