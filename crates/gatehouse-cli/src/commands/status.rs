//! Status command - probe the gateway and report configuration.

use std::time::Duration;

use anyhow::Result;
use gatehouse_core::Config;

use crate::ui::{self, HealthStatus};

/// Status command arguments.
#[derive(Debug, Clone, Default)]
pub struct StatusArgs {
    /// Show configuration details.
    pub all: bool,
}

/// Run the status command.
///
/// # Errors
///
/// Never fails on an unreachable gateway; that is reported as a status.
pub async fn run_status(args: StatusArgs) -> Result<()> {
    ui::header("Gatehouse Status");

    let config = Config::load_default().map(Config::with_env_overrides);
    let port = config
        .as_ref()
        .map_or_else(|_| Config::default().gateway.port, |c| c.gateway.port);

    println!();
    ui::info("Gateway");
    match probe_gateway(port).await {
        GatewayStatus::Running { version } => {
            ui::health_check("Status", HealthStatus::Ok, Some("running"));
            ui::kv("  Port", &port.to_string());
            if let Some(v) = version {
                ui::kv("  Version", &v);
            }
        }
        GatewayStatus::NotRunning => {
            ui::health_check("Status", HealthStatus::Warning, Some("not running"));
            ui::info("  Start with: gatehouse serve");
        }
        GatewayStatus::Unhealthy(msg) => {
            ui::health_check("Status", HealthStatus::Error, Some(&msg));
        }
    }

    println!();
    ui::info("Configuration");
    match &config {
        Ok(config) => {
            let path = Config::default_path();
            let detail = if path.exists() { "loaded" } else { "defaults" };
            ui::health_check("Config", HealthStatus::Ok, Some(detail));

            let secret = if config.auth.jwt_secret.is_some() {
                HealthStatus::Ok
            } else {
                HealthStatus::Warning
            };
            ui::health_check("Session secret", secret, None);

            if args.all {
                ui::kv("  Path", &path.display().to_string());
                ui::kv("  Data dir", &config.data_dir().display().to_string());
                ui::kv("  Admin area", &config.routes.admin_prefix);
                ui::kv("  Protected area", &config.routes.protected_prefix);
                ui::kv(
                    "  Token expiry",
                    &format!("{}h", config.auth.token_expiry_hours),
                );
            }
        }
        Err(e) => {
            ui::health_check("Config", HealthStatus::Error, Some(&e.to_string()));
        }
    }

    Ok(())
}

/// Gateway probe result.
enum GatewayStatus {
    Running { version: Option<String> },
    NotRunning,
    Unhealthy(String),
}

async fn probe_gateway(port: u16) -> GatewayStatus {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    {
        Ok(client) => client,
        Err(e) => return GatewayStatus::Unhealthy(e.to_string()),
    };

    let base = format!("http://127.0.0.1:{port}");
    match client.get(format!("{base}/health")).send().await {
        Ok(resp) if resp.status().is_success() => GatewayStatus::Running {
            version: probe_version(&client, &base).await,
        },
        Ok(resp) => GatewayStatus::Unhealthy(format!("HTTP {}", resp.status())),
        Err(e) if e.is_connect() || e.is_timeout() => GatewayStatus::NotRunning,
        Err(e) => GatewayStatus::Unhealthy(e.to_string()),
    }
}

async fn probe_version(client: &reqwest::Client, base: &str) -> Option<String> {
    let body: serde_json::Value = client.get(base).send().await.ok()?.json().await.ok()?;
    body.get("version")
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
}
