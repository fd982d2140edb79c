//! Configuration file handling.
//!
//! The file is TOML. Every section and key is optional; anything missing
//! falls back to the defaults below.
//!
//! ```toml
//! [database]
//! path = "/var/lib/rollcall/rollcall.db"
//!
//! [security]
//! min_password_length = 6
//! max_attempts = 3
//! lockout_minutes = 30
//!
//! [bootstrap]
//! admin_password = "1234"
//!
//! [audit]
//! retention_days = 30
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::auth::password::PasswordPolicy;
use crate::auth::store::DEFAULT_ADMIN_PASSWORD;
use crate::security::lockout::{LoginGuard, DEFAULT_LOCKOUT_SECS, DEFAULT_MAX_ATTEMPTS};

const APP_NAME: &str = "rollcall";
const CONFIG_FILE: &str = "config.toml";
const DB_FILE: &str = "rollcall.db";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub bootstrap: BootstrapConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub min_password_length: usize,
    /// Failed logins before a temporary lock. `0` disables locking.
    pub max_attempts: u32,
    pub lockout_minutes: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            min_password_length: PasswordPolicy::default().min_len,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout_minutes: DEFAULT_LOCKOUT_SECS / 60,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Initial password of the default `admin` account. Only used when the
    /// account does not exist yet.
    pub admin_password: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
        }
    }
}

impl fmt::Debug for BootstrapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapConfig")
            .field("admin_password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Entries older than this are pruned at startup. `0` keeps everything.
    pub retention_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { retention_days: 30 }
    }
}

impl Config {
    /// Platform config file location (`<config_dir>/rollcall/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load `path` if given (it must exist), otherwise the default location
    /// if present, otherwise built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => match Self::default_path() {
                Some(p) if p.exists() => Self::from_file(&p),
                _ => {
                    tracing::debug!("No config file found; using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read config file: {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Unable to parse config file: {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Resolved database file location.
    pub fn database_path(&self) -> PathBuf {
        if let Some(p) = &self.database.path {
            return p.clone();
        }
        directories::ProjectDirs::from("", "", APP_NAME)
            .map(|dirs| dirs.data_dir().join(DB_FILE))
            .unwrap_or_else(|| PathBuf::from(DB_FILE))
    }

    pub fn password_policy(&self) -> PasswordPolicy {
        PasswordPolicy::new(self.security.min_password_length)
    }

    pub fn login_guard(&self) -> LoginGuard {
        LoginGuard::new(
            self.security.max_attempts,
            self.security.lockout_minutes.saturating_mul(60),
        )
    }
}
