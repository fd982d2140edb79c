use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Password;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rollcall::auth::LoginOutcome;
use rollcall::security::permissions::{self, Permission};
use rollcall::{App, Config};

/// Account administration for the attendance system.
#[derive(Parser, Debug)]
#[command(name = "rollcall", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Migrate the schema and legacy accounts, and create the default admin
    Init,
    /// Check a username/password pair
    Login { username: String },
    /// Manage accounts
    #[command(subcommand)]
    User(UserCommand),
    /// Hash legacy plaintext passwords
    Migrate,
    /// Show the permission table
    Perms { role: Option<String> },
    /// Show audit entries
    Audit {
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Institution settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Create an account (password is prompted)
    Add {
        username: String,
        #[arg(long, default_value = "Student")]
        role: String,
    },
    List,
    /// Set a new password (prompted)
    Passwd { username: String },
    Role { username: String, role: String },
    Delete { username: String },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    List,
    Get { key: String },
    Set { key: String, value: String },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn prompt_new_password() -> Result<String> {
    Ok(Password::new()
        .with_prompt("New password")
        .with_confirmation("Repeat password", "Passwords do not match")
        .interact()?)
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database.path = Some(db);
    }

    let app = App::open(config)?;

    match cli.command {
        Command::Init => {
            let report = app.init()?;
            println!(
                "Migrated {} legacy account(s), {} failed.",
                report.migration.migrated, report.migration.failed
            );
            if report.admin_created {
                println!("Created default account 'admin'. Change its password now.");
            }
        }
        Command::Login { username } => {
            let password = Password::new().with_prompt("Password").interact()?;
            let outcome = app.login.login(&username, &password);
            println!("{}", outcome.message());
            if let LoginOutcome::Granted { role, .. } = &outcome {
                println!("Role: {role}");
            } else {
                std::process::exit(1);
            }
        }
        Command::User(cmd) => run_user(&app, cmd)?,
        Command::Migrate => {
            let report = app.credentials().migrate_legacy()?;
            println!("Migrated {} legacy account(s).", report.migrated);
            report.into_result()?;
        }
        Command::Perms { role } => print_permissions(role.as_deref()),
        Command::Audit { user, limit, json } => {
            let mut entries = match user {
                Some(u) => app.audit.for_user(&u)?,
                None => app.audit.recent(limit)?,
            };
            entries.truncate(limit as usize);
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for e in entries {
                    println!("{}  {:<20} {:<18} {}", e.created_at, e.username, e.action, e.details);
                }
            }
        }
        Command::Settings(cmd) => match cmd {
            SettingsCommand::List => {
                for (key, value) in app.settings.all()? {
                    println!("{key} = {value}");
                }
            }
            SettingsCommand::Get { key } => match app.settings.get(&key)? {
                Some(value) => println!("{value}"),
                None => bail!("No setting named '{key}'"),
            },
            SettingsCommand::Set { key, value } => {
                app.settings.set(&key, &value)?;
                app.audit.record(
                    "cli",
                    rollcall::audit::AuditAction::SettingChanged,
                    &format!("{key}={value}"),
                )?;
            }
        },
    }
    Ok(())
}

fn run_user(app: &App, cmd: UserCommand) -> Result<()> {
    match cmd {
        UserCommand::Add { username, role } => {
            if permissions::Role::parse(&role).is_none() {
                tracing::warn!(role = %role, "Unknown role; the account will have no permissions");
            }
            let password = prompt_new_password()?;
            let account = app
                .login
                .register(&username, &password, &role)
                .with_context(|| format!("Could not create '{username}'"))?;
            println!("Created '{}' ({}).", account.username, account.role);
        }
        UserCommand::List => {
            for account in app.credentials().list_accounts()? {
                let marker = if account.has_credentials { "" } else { "  (legacy, not migrated)" };
                println!("{:>5}  {:<24} {}{}", account.id, account.username, account.role, marker);
            }
        }
        UserCommand::Passwd { username } => {
            let password = prompt_new_password()?;
            app.login.reset_password(&username, &password)?;
            app.login.unlock(&username);
            println!("Password for '{username}' changed.");
        }
        UserCommand::Role { username, role } => {
            app.credentials().change_role(&username, &role)?;
            println!("'{username}' is now {role}.");
        }
        UserCommand::Delete { username } => {
            app.credentials().delete_account(&username)?;
            println!("Deleted '{username}'.");
        }
    }
    Ok(())
}

fn print_permissions(role: Option<&str>) {
    let roles: Vec<&str> = match role {
        Some(r) => vec![r],
        None => permissions::known_roles().to_vec(),
    };
    for role in roles {
        let granted = permissions::permissions_for(role);
        println!("{role}:");
        for perm in Permission::ALL {
            let mark = if granted.contains(&perm) { "yes" } else { "no" };
            println!("  {:<22} {mark}", perm.as_str());
        }
    }
}
