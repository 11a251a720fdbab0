//! Gatehouse CLI - run and administer the Gatehouse gateway.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gatehouse_core::Config;
use gatehouse_core::config::LogFormat;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(about = "Gatehouse - session gateway with role-gated routes")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address (IP)
        #[arg(long)]
        bind: Option<String>,

        /// Start even if the port looks taken
        #[arg(long)]
        force: bool,
    },

    /// Probe a running gateway
    Status {
        /// Show configuration details
        #[arg(long)]
        all: bool,
    },

    /// Account management, writing directly to the store
    Admin {
        #[command(subcommand)]
        action: AdminCommands,

        /// Data directory override
        #[arg(long, global = true, env = "GATEHOUSE_DATA_DIR")]
        data_dir: Option<PathBuf>,
    },

    /// Configuration file operations
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create an account with any role
    Create {
        /// Email address
        #[arg(long)]
        email: String,

        /// Display name
        #[arg(long, default_value = "Administrator")]
        name: String,

        /// Password (prompted for when omitted)
        #[arg(long, conflicts_with = "generate_password")]
        password: Option<String>,

        /// Generate a random password
        #[arg(long)]
        generate_password: bool,

        /// Account role: admin or user
        #[arg(long, default_value = "admin")]
        role: String,
    },

    /// List all accounts
    List,

    /// Delete an account
    Delete {
        /// Email of the account to delete
        #[arg(long)]
        email: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Get a value by dotted key (e.g. gateway.port)
    Get {
        /// Configuration key
        key: String,
    },

    /// Print the config file path
    Path,

    /// Validate the config file
    Validate,

    /// Write a default config file with a fresh session secret
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool, config: Option<&Config>) {
    let debug = verbose || config.is_some_and(|c| c.settings.debug);
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.map(|c| c.settings.log_format) {
        Some(LogFormat::Json) => registry.with(fmt::layer().json()).init(),
        _ => registry.with(fmt::layer().with_target(false)).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load_default();
    init_tracing(cli.verbose, loaded.as_ref().ok());
    if let Err(e) = &loaded {
        tracing::warn!(error = %e, "Config could not be loaded, using defaults");
    }

    let Some(command) = cli.command else {
        commands::run_status(commands::status::StatusArgs::default()).await?;
        return Ok(());
    };

    match command {
        Commands::Serve { port, bind, force } => {
            let config = loaded?;
            let args = commands::serve::ServeArgs { port, bind, force };
            commands::run_serve(config, args).await?;
        }

        Commands::Status { all } => {
            commands::run_status(commands::status::StatusArgs { all }).await?;
        }

        Commands::Admin { action, data_dir } => {
            let args = commands::admin::AdminArgs {
                action: match action {
                    AdminCommands::Create {
                        email,
                        name,
                        password,
                        generate_password,
                        role,
                    } => commands::admin::AdminAction::Create {
                        email,
                        name,
                        password,
                        generate_password,
                        role,
                    },
                    AdminCommands::List => commands::admin::AdminAction::List,
                    AdminCommands::Delete { email, yes } => {
                        commands::admin::AdminAction::Delete { email, yes }
                    }
                },
                data_dir,
            };
            commands::run_admin(loaded?, args)?;
        }

        Commands::Config { action } => {
            let action = match action {
                None | Some(ConfigCommands::Show) => commands::config::ConfigAction::Show,
                Some(ConfigCommands::Get { key }) => commands::config::ConfigAction::Get(key),
                Some(ConfigCommands::Path) => commands::config::ConfigAction::Path,
                Some(ConfigCommands::Validate) => commands::config::ConfigAction::Validate,
                Some(ConfigCommands::Init { force }) => {
                    commands::config::ConfigAction::Init { force }
                }
            };
            commands::run_config(action)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_admin_create_args() {
        let cli = Cli::try_parse_from([
            "gatehouse",
            "admin",
            "create",
            "--email",
            "root@mail.com",
            "--generate-password",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Admin {
                action:
                    AdminCommands::Create {
                        email,
                        role,
                        generate_password,
                        ..
                    },
                ..
            }) => {
                assert_eq!(email, "root@mail.com");
                assert_eq!(role, "admin");
                assert!(generate_password);
            }
            _ => panic!("expected admin create"),
        }
    }

    #[test]
    fn test_password_flags_conflict() {
        let result = Cli::try_parse_from([
            "gatehouse",
            "admin",
            "create",
            "--email",
            "root@mail.com",
            "--password",
            "Secret123",
            "--generate-password",
        ]);
        assert!(result.is_err());
    }
}
