//! Wiring of the stores behind one database file.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::audit::AuditLog;
use crate::auth::{BootstrapReport, CredentialStore, LoginService};
use crate::config::Config;
use crate::settings::Settings;
use crate::store::SqliteAccountStore;

/// Everything the front end needs, opened from one config.
pub struct App {
    pub login: LoginService<SqliteAccountStore>,
    pub audit: Arc<AuditLog>,
    pub settings: Settings,
    config: Config,
}

impl App {
    /// Open (and migrate) the database named by `config`.
    pub fn open(config: Config) -> Result<Self> {
        let db_path = config.database_path();
        Self::open_at(&db_path, config)
    }

    pub fn open_at(db_path: &Path, config: Config) -> Result<Self> {
        let accounts = SqliteAccountStore::open(db_path)?;
        let audit = Arc::new(AuditLog::open(db_path)?);
        let settings = Settings::open(db_path)?;

        let credentials = CredentialStore::new(accounts).with_audit(Arc::clone(&audit));
        let login = LoginService::new(credentials, config.login_guard(), config.password_policy());

        tracing::debug!(db = %db_path.display(), "Database opened");
        Ok(Self {
            login,
            audit,
            settings,
            config,
        })
    }

    pub fn credentials(&self) -> &CredentialStore<SqliteAccountStore> {
        self.login.credentials()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Startup routine: legacy migration, default admin, audit retention.
    pub fn init(&self) -> Result<BootstrapReport> {
        let report = self
            .credentials()
            .bootstrap(&self.config.bootstrap.admin_password)
            .context("Bootstrap failed")?;

        if report.migration.failed > 0 {
            tracing::warn!(
                failed = report.migration.failed,
                "Some legacy accounts could not be migrated; they cannot log in until fixed"
            );
        }

        let retention = self.config.audit.retention_days;
        if retention > 0 {
            if let Err(e) = self.audit.prune_older_than(retention) {
                tracing::warn!("Failed to prune audit log: {e}");
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_twice_creates_one_admin() {
        let tmp = TempDir::new().unwrap();
        let app = App::open_at(&tmp.path().join("rollcall.db"), Config::default()).unwrap();

        assert!(app.init().unwrap().admin_created);
        assert!(!app.init().unwrap().admin_created);
        assert_eq!(app.credentials().account_count().unwrap(), 1);
    }

    #[test]
    fn init_uses_configured_admin_password() {
        let tmp = TempDir::new().unwrap();
        let config = Config::from_toml("[bootstrap]\nadmin_password = \"arranque-2026\"").unwrap();
        let app = App::open_at(&tmp.path().join("rollcall.db"), config).unwrap();

        app.init().unwrap();
        assert!(app.login.login("admin", "arranque-2026").is_granted());
        assert!(!app.login.login("admin", "1234").is_granted());
    }

    #[test]
    fn open_uses_configured_path() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("data").join("school.db");
        let config = Config::from_toml(&format!(
            "[database]\npath = {:?}",
            db.display().to_string()
        ))
        .unwrap();

        let app = App::open(config).unwrap();
        app.init().unwrap();
        assert!(db.exists());
    }
}
