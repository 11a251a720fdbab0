//! Config file commands.

use std::path::Path;

use anyhow::{Context, Result};
use gatehouse_core::Config;
use gatehouse_gateway::JwtManager;
use serde_json::Value;

use crate::ui;

/// Placeholder shown instead of secrets.
const REDACTED: &str = "<redacted>";

/// Config actions.
#[derive(Debug, Clone)]
pub enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Print one value by dotted key.
    Get(String),
    /// Print the config file path.
    Path,
    /// Validate the config file.
    Validate,
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        force: bool,
    },
}

/// Run the config command.
///
/// # Errors
///
/// Returns error if the file cannot be read, parsed or written.
pub fn run_config(action: ConfigAction) -> Result<()> {
    let path = Config::default_path();

    match action {
        ConfigAction::Show => {
            let value = effective_config(&path)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        ConfigAction::Get(key) => {
            let value = effective_config(&path)?;
            match lookup(&value, &key) {
                Some(Value::String(s)) => println!("{s}"),
                Some(other) => println!("{}", serde_json::to_string_pretty(other)?),
                None => ui::error(&format!("Key not found: {key}")),
            }
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Validate => validate_config(&path),
        ConfigAction::Init { force } => init_config(&path, force)?,
    }

    Ok(())
}

/// Loaded (or default) config with env overrides, secrets redacted.
fn effective_config(path: &Path) -> Result<Value> {
    let config = if path.exists() {
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        Config::default()
    };

    let mut value = serde_json::to_value(config.with_env_overrides())?;
    redact(&mut value);
    Ok(value)
}

fn redact(value: &mut Value) {
    if let Some(secret) = value.pointer_mut("/auth/jwtSecret") {
        if !secret.is_null() {
            *secret = Value::String(REDACTED.to_string());
        }
    }
}

/// Navigate a dotted path such as `gateway.port`.
fn lookup<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(root, |current, part| match current {
        Value::Object(map) => map.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn validate_config(path: &Path) {
    ui::header("Validating Configuration");

    if !path.exists() {
        ui::warning(&format!("Config file not found: {}", path.display()));
        ui::info("Defaults will be used. Run 'gatehouse config init' to create one.");
        return;
    }

    match Config::load(path) {
        Ok(config) => {
            ui::success("Configuration is valid");
            if config.auth.jwt_secret.is_none() {
                ui::warning("No session secret; sessions will not survive a restart");
            }
        }
        Err(e) => ui::error(&e.to_string()),
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        ui::warning(&format!("Config already exists: {}", path.display()));
        ui::info("Use --force to overwrite");
        return Ok(());
    }

    let mut config = Config::default();
    config.auth.jwt_secret = Some(JwtManager::generate_hex_secret());
    config
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    ui::success(&format!("Wrote {}", path.display()));
    Ok(())
}
