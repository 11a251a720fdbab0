//! Serve command - start the gateway server.

use anyhow::Result;
use gatehouse_core::Config;
use gatehouse_core::config::BindMode;
use gatehouse_gateway::GatewayConfig;

use crate::ui;

/// Serve command arguments.
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Port override.
    pub port: Option<u16>,
    /// Bind address override.
    pub bind: Option<String>,
    /// Skip the port-in-use check.
    pub force: bool,
}

/// Start the gateway and serve until it fails.
///
/// # Errors
///
/// Returns error if the gateway cannot start.
pub async fn run_serve(config: Config, args: ServeArgs) -> Result<()> {
    let config = config.with_env_overrides();
    let mut gateway_config = GatewayConfig::from_config(&config);

    if let Some(port) = args.port {
        gateway_config.port = port;
    }
    if let Some(bind) = args.bind {
        gateway_config.bind_address = bind;
    }

    let address = format!("{}:{}", gateway_config.bind_address, gateway_config.port);

    if !args.force {
        ensure_port_free(&address)?;
    }

    ui::header("Starting Gatehouse");
    ui::kv("Address", &address);
    let mode = match &config.gateway.mode {
        BindMode::Local => "local",
        BindMode::Public => "public",
        BindMode::Custom(_) => "custom",
    };
    ui::kv("Mode", mode);
    ui::kv("Data", &gateway_config.data_dir.display().to_string());
    if config.auth.jwt_secret.is_none() {
        ui::warning("No session secret configured; run 'gatehouse config init' to persist one");
    }
    println!();

    ui::info("Press Ctrl+C to stop");
    println!();

    gatehouse_gateway::start(gateway_config).await?;

    Ok(())
}

/// Fail if something is already listening on `address`.
fn ensure_port_free(address: &str) -> Result<()> {
    if std::net::TcpListener::bind(address).is_err() {
        anyhow::bail!("{address} is already in use. Use --force to override.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_port_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let err = ensure_port_free(&address).unwrap_err();
        assert!(err.to_string().contains("already in use"));

        drop(listener);
        assert!(ensure_port_free(&address).is_ok());
    }
}
