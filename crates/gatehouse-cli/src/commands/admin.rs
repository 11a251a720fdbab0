//! Admin account management commands.
//!
//! These write straight to the credential store, so the gateway must not be
//! running against the same data directory.

use std::path::PathBuf;

use anyhow::Context;
use gatehouse_core::{Config, Email, Role};
use gatehouse_gateway::auth::setup::{generate_password, provision_user};
use gatehouse_gateway::{Argon2Hasher, CredentialStore, SledCredentialStore};
use zeroize::Zeroizing;

use crate::ui;

/// Length of generated passwords.
const GENERATED_PASSWORD_LENGTH: usize = 16;

/// Arguments for admin commands.
pub struct AdminArgs {
    /// The admin action to perform.
    pub action: AdminAction,
    /// Data directory override.
    pub data_dir: Option<PathBuf>,
}

/// Admin actions.
pub enum AdminAction {
    /// Create an account.
    Create {
        email: String,
        name: String,
        password: Option<String>,
        generate_password: bool,
        role: String,
    },
    /// List all accounts.
    List,
    /// Delete an account.
    Delete { email: String, yes: bool },
}

/// Run the admin command.
///
/// # Errors
///
/// Returns error if the store cannot be opened or the operation fails.
pub fn run_admin(config: Config, args: AdminArgs) -> anyhow::Result<()> {
    let config = config.with_env_overrides();
    let data_dir = args.data_dir.unwrap_or_else(|| config.data_dir());

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let store = SledCredentialStore::open(&data_dir)
        .context("Failed to open credential store (is the gateway running?)")?;

    match args.action {
        AdminAction::Create {
            email,
            name,
            password,
            generate_password: generate,
            role,
        } => {
            let hasher = Argon2Hasher::new(config.auth.hashing)?;
            let role: Role = role
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid role: {role}. Use: admin or user"))?;
            let password = resolve_password(password, generate)?;
            create_user(&store, &hasher, &name, &email, &password, role)?;
        }
        AdminAction::List => list_users(&store)?,
        AdminAction::Delete { email, yes } => delete_user(&store, &email, yes)?,
    }

    Ok(())
}

fn resolve_password(
    password: Option<String>,
    generate: bool,
) -> anyhow::Result<Zeroizing<String>> {
    if generate {
        let password = generate_password(GENERATED_PASSWORD_LENGTH);
        ui::success(&format!("Generated password: {}", password.as_str()));
        return Ok(password);
    }

    match password {
        Some(p) => Ok(Zeroizing::new(p)),
        None => Ok(Zeroizing::new(ui::prompts::new_password("Password")?)),
    }
}

fn create_user(
    store: &SledCredentialStore,
    hasher: &Argon2Hasher,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
) -> anyhow::Result<()> {
    let user = provision_user(store, hasher, name, email, password, role)
        .context("Failed to create user")?;

    ui::success(&format!(
        "Created {} '{}' with role {}",
        user.email, user.name, user.role
    ));

    Ok(())
}

fn list_users(store: &SledCredentialStore) -> anyhow::Result<()> {
    let mut users = store.list().context("Failed to list users")?;

    if users.is_empty() {
        ui::info("No users found.");
        ui::info(
            "Run 'gatehouse admin create --email you@example.com --generate-password' to create an admin.",
        );
        return Ok(());
    }

    users.sort_by(|a, b| a.name.cmp(&b.name));

    ui::info(&format!("Users ({}):", users.len()));
    println!();
    println!("{:<24} {:<32} {:<6} {:<20}", "NAME", "EMAIL", "ROLE", "CREATED");
    println!("{}", "-".repeat(84));

    for user in users {
        let created = user.created_at.format("%Y-%m-%d %H:%M:%S");
        println!(
            "{:<24} {:<32} {:<6} {:<20}",
            user.name, user.email, user.role, created
        );
    }

    Ok(())
}

fn delete_user(store: &SledCredentialStore, email: &str, yes: bool) -> anyhow::Result<()> {
    let email = Email::new(email);
    let user = store
        .find_by_email(&email)
        .context("Failed to find user")?
        .ok_or_else(|| anyhow::anyhow!("User not found: {email}"))?;

    if user.role.is_admin() {
        let admins = store
            .list()
            .context("Failed to list users")?
            .iter()
            .filter(|u| u.role.is_admin())
            .count();
        if admins <= 1 {
            anyhow::bail!("Cannot delete the last admin user");
        }
    }

    if !yes && !ui::prompts::confirm(&format!("Delete {email}?"))? {
        ui::info("Delete cancelled");
        return Ok(());
    }

    if !store.delete(&user.id).context("Failed to delete user")? {
        anyhow::bail!("User not found: {email}");
    }

    ui::success(&format!("Deleted user '{email}'"));

    Ok(())
}
