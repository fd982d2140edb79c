//! Credential store: account creation, verification, rotation and legacy
//! migration on top of any [`AccountStore`].
//!
//! Plaintext passwords only ever live in the arguments of these methods.
//! They are hashed immediately and never logged or stored.

use std::sync::Arc;

use crate::audit::{AuditAction, AuditLog};
use crate::security::permissions::{self, Permission};
use crate::store::{AccountRecord, AccountStore, StoreError};

use super::error::CredentialError;
use super::password::{constant_time_eq, dummy_verify, generate_salt, hash_password};

/// Name of the bootstrap account. It can never be deleted.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

/// Role given to the bootstrap account.
pub const DEFAULT_ADMIN_ROLE: &str = "Administrator";

/// Initial password of the bootstrap account in a stock deployment.
pub const DEFAULT_ADMIN_PASSWORD: &str = "1234";

/// Public view of an account. Carries no credential material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub role: String,
    /// `false` only for legacy rows that have not been migrated yet.
    pub has_credentials: bool,
}

impl Account {
    pub fn can(&self, permission: Permission) -> bool {
        permissions::role_has(&self.role, permission)
    }
}

impl From<AccountRecord> for Account {
    fn from(rec: AccountRecord) -> Self {
        let has_credentials = rec.has_credentials();
        Self {
            id: rec.id,
            username: rec.username,
            role: rec.role,
            has_credentials,
        }
    }
}

/// Outcome of a legacy migration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: usize,
    pub failed: usize,
}

impl MigrationReport {
    /// Turn any per-record failure into [`CredentialError::MigrationPartialFailure`].
    pub fn into_result(self) -> Result<usize, CredentialError> {
        if self.failed > 0 {
            return Err(CredentialError::MigrationPartialFailure {
                migrated: self.migrated,
                failed: self.failed,
            });
        }
        Ok(self.migrated)
    }
}

/// Outcome of first-run bootstrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub migration: MigrationReport,
    pub admin_created: bool,
}

/// Owns hashing and validation for accounts kept in `S`.
pub struct CredentialStore<S: AccountStore> {
    store: S,
    audit: Option<Arc<AuditLog>>,
}

impl<S: AccountStore> CredentialStore<S> {
    pub fn new(store: S) -> Self {
        Self { store, audit: None }
    }

    /// Record account changes in `audit`.
    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub(crate) fn audit_log(&self) -> Option<&AuditLog> {
        self.audit.as_deref()
    }

    fn audit(&self, username: &str, action: AuditAction, details: &str) {
        if let Some(log) = &self.audit {
            if let Err(e) = log.record(username, action, details) {
                tracing::warn!(username, action = action.as_str(), "Failed to write audit entry: {e}");
            }
        }
    }

    // ── Account Lifecycle ───────────────────────────────────────────

    /// Create a new account with a freshly salted hash.
    pub fn create_account(
        &self,
        username: &str,
        password: &str,
        role: &str,
    ) -> Result<Account, CredentialError> {
        if username.trim().is_empty() {
            return Err(CredentialError::InvalidInput("username cannot be empty"));
        }
        if password.is_empty() {
            return Err(CredentialError::InvalidInput("password cannot be empty"));
        }

        let salt = generate_salt();
        let password_hash = hash_password(password, &salt);

        let record = match self.store.insert(username, &password_hash, &salt, role) {
            Ok(rec) => rec,
            Err(StoreError::UniqueViolation) => {
                return Err(CredentialError::DuplicateUsername(username.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(username, role, "Account created");
        self.audit(username, AuditAction::AccountCreated, &format!("role={role}"));
        Ok(record.into())
    }

    /// Check a login attempt. Returns `(username, role)` only on an exact
    /// digest match; every failure looks the same to the caller.
    pub fn verify(&self, username: &str, password: &str) -> Option<(String, String)> {
        let record = match self.store.find(username) {
            Ok(rec) => rec,
            Err(e) => {
                tracing::warn!(username, "Account lookup failed during verify: {e}");
                None
            }
        };

        let Some(record) = record else {
            // Perform dummy hash to prevent timing side-channel
            dummy_verify(password);
            return None;
        };

        let (Some(stored_hash), Some(salt)) = (&record.password_hash, &record.salt) else {
            dummy_verify(password);
            tracing::debug!(username, "Verify refused: account has no credential pair");
            return None;
        };
        if stored_hash.is_empty() || salt.is_empty() {
            dummy_verify(password);
            return None;
        }

        let attempt = hash_password(password, salt);
        if !constant_time_eq(stored_hash.as_bytes(), attempt.as_bytes()) {
            return None;
        }
        Some((record.username, record.role))
    }

    /// Rotate the password: new salt, new hash, both written together.
    pub fn change_password(&self, username: &str, new_password: &str) -> Result<(), CredentialError> {
        if new_password.is_empty() {
            return Err(CredentialError::InvalidInput("password cannot be empty"));
        }

        let salt = generate_salt();
        let password_hash = hash_password(new_password, &salt);

        if !self.store.update_credentials(username, &password_hash, &salt)? {
            return Err(CredentialError::NotFound(username.to_string()));
        }

        tracing::info!(username, "Password changed");
        self.audit(username, AuditAction::PasswordChanged, "");
        Ok(())
    }

    pub fn change_role(&self, username: &str, role: &str) -> Result<(), CredentialError> {
        if !self.store.update_role(username, role)? {
            return Err(CredentialError::NotFound(username.to_string()));
        }
        tracing::info!(username, role, "Role changed");
        self.audit(username, AuditAction::RoleChanged, &format!("role={role}"));
        Ok(())
    }

    /// Delete an account. The bootstrap `admin` account is always refused.
    pub fn delete_account(&self, username: &str) -> Result<(), CredentialError> {
        if username == DEFAULT_ADMIN_USERNAME {
            return Err(CredentialError::ProtectedAccount(username.to_string()));
        }
        if !self.store.delete(username)? {
            return Err(CredentialError::NotFound(username.to_string()));
        }
        tracing::info!(username, "Account deleted");
        self.audit(username, AuditAction::AccountDeleted, "");
        Ok(())
    }

    // ── Lookup ──────────────────────────────────────────────────────

    pub fn account_exists(&self, username: &str) -> bool {
        match self.store.find(username) {
            Ok(rec) => rec.is_some(),
            Err(e) => {
                tracing::warn!(username, "Account lookup failed: {e}");
                false
            }
        }
    }

    pub fn get_account(&self, username: &str) -> Result<Option<Account>, CredentialError> {
        Ok(self.store.find(username)?.map(Account::from))
    }

    /// All accounts, newest first.
    pub fn list_accounts(&self) -> Result<Vec<Account>, CredentialError> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .map(Account::from)
            .collect())
    }

    pub fn account_count(&self) -> Result<u64, CredentialError> {
        Ok(self.store.count()?)
    }

    // ── Migration & Bootstrap ───────────────────────────────────────

    /// Give every legacy row (plaintext `clave`, no hash/salt pair) a salted
    /// hash. The legacy field is left in place. Rows already carrying a
    /// hash are never candidates, so a second run writes nothing.
    ///
    /// A failing row is logged and counted; the rest of the batch proceeds.
    pub fn migrate_legacy(&self) -> Result<MigrationReport, CredentialError> {
        let candidates = self.store.legacy_candidates()?;
        let mut report = MigrationReport::default();

        for record in candidates {
            let Some(secret) = record.legacy_secret.as_deref() else {
                continue;
            };
            let salt = generate_salt();
            let password_hash = hash_password(secret, &salt);

            match self.store.backfill_credentials(record.id, &password_hash, &salt) {
                Ok(true) => {
                    report.migrated += 1;
                    tracing::debug!(username = %record.username, "Migrated legacy account");
                    self.audit(&record.username, AuditAction::LegacyMigrated, "");
                }
                // Another writer filled the pair in first.
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(username = %record.username, "Legacy migration failed: {e}");
                }
            }
        }

        if report.migrated > 0 || report.failed > 0 {
            tracing::info!(
                migrated = report.migrated,
                failed = report.failed,
                "Legacy credential migration finished"
            );
        }
        Ok(report)
    }

    /// First-run setup: migrate legacy rows, then make sure the default
    /// administrator exists. Safe to call on every start.
    pub fn bootstrap(&self, initial_admin_password: &str) -> Result<BootstrapReport, CredentialError> {
        let migration = self.migrate_legacy()?;

        let admin_created = if self.store.find(DEFAULT_ADMIN_USERNAME)?.is_some() {
            false
        } else {
            match self.create_account(
                DEFAULT_ADMIN_USERNAME,
                initial_admin_password,
                DEFAULT_ADMIN_ROLE,
            ) {
                Ok(_) => {
                    tracing::warn!(
                        "Default '{DEFAULT_ADMIN_USERNAME}' account created with the initial password; change it"
                    );
                    true
                }
                // Created concurrently between the lookup and the insert.
                Err(CredentialError::DuplicateUsername(_)) => false,
                Err(e) => return Err(e),
            }
        };

        Ok(BootstrapReport {
            migration,
            admin_created,
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::{DIGEST_HEX_LEN, SALT_HEX_LEN};
    use crate::store::SqliteAccountStore;
    use std::path::Path;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, CredentialStore<SqliteAccountStore>) {
        let tmp = TempDir::new().unwrap();
        let store = SqliteAccountStore::open(&tmp.path().join("rollcall.db")).unwrap();
        (tmp, CredentialStore::new(store))
    }

    fn raw(tmp: &TempDir) -> rusqlite::Connection {
        rusqlite::Connection::open(tmp.path().join("rollcall.db")).unwrap()
    }

    fn insert_legacy(db: &Path, username: &str, clave: &str) {
        let conn = rusqlite::Connection::open(db).unwrap();
        conn.execute(
            "INSERT INTO users (username, role, clave) VALUES (?1, 'Teacher', ?2)",
            rusqlite::params![username, clave],
        )
        .unwrap();
    }

    fn stored_pair(tmp: &TempDir, username: &str) -> (Option<String>, Option<String>) {
        raw(tmp)
            .query_row(
                "SELECT password_hash, salt FROM users WHERE username = ?1",
                rusqlite::params![username],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap()
    }

    #[test]
    fn create_and_verify() {
        let (_tmp, creds) = test_store();

        let account = creds.create_account("maria", "secreto1", "Teacher").unwrap();
        assert_eq!(account.username, "maria");
        assert_eq!(account.role, "Teacher");
        assert!(account.has_credentials);

        assert_eq!(
            creds.verify("maria", "secreto1"),
            Some(("maria".to_string(), "Teacher".to_string()))
        );
    }

    #[test]
    fn stored_pair_has_fixed_format() {
        let (tmp, creds) = test_store();
        creds.create_account("maria", "secreto1", "Teacher").unwrap();

        let (hash, salt) = stored_pair(&tmp, "maria");
        let (hash, salt) = (hash.unwrap(), salt.unwrap());
        assert_eq!(hash.len(), DIGEST_HEX_LEN);
        assert_eq!(salt.len(), SALT_HEX_LEN);
        assert_eq!(hash, hash_password("secreto1", &salt));
    }

    #[test]
    fn same_password_gets_different_hashes() {
        let (tmp, creds) = test_store();
        creds.create_account("a", "shared-pw", "Student").unwrap();
        creds.create_account("b", "shared-pw", "Student").unwrap();

        assert_ne!(stored_pair(&tmp, "a"), stored_pair(&tmp, "b"));
    }

    #[test]
    fn any_single_char_mutation_fails() {
        let (_tmp, creds) = test_store();
        let password = "clave2024";
        creds.create_account("maria", password, "Teacher").unwrap();

        assert!(creds.verify("maria", &format!("{password}x")).is_none());
        assert!(creds.verify("maria", &format!("x{password}")).is_none());
        assert!(creds.verify("maria", &password[..password.len() - 1]).is_none());
        for i in 0..password.len() {
            let mut bytes = password.as_bytes().to_vec();
            bytes[i] = if bytes[i] == b'z' { b'y' } else { b'z' };
            let mutated = String::from_utf8(bytes).unwrap();
            assert!(creds.verify("maria", &mutated).is_none(), "{mutated}");
        }
    }

    #[test]
    fn unknown_user_and_wrong_password_look_the_same() {
        let (_tmp, creds) = test_store();
        creds.create_account("maria", "secreto1", "Teacher").unwrap();

        let unknown = creds.verify("ghost", "secreto1");
        let wrong = creds.verify("maria", "wrong");
        assert_eq!(unknown, wrong);
        assert!(unknown.is_none());
    }

    #[test]
    fn username_is_case_sensitive() {
        let (_tmp, creds) = test_store();
        creds.create_account("Maria", "secreto1", "Teacher").unwrap();
        assert!(creds.verify("maria", "secreto1").is_none());
    }

    #[test]
    fn duplicate_username_fails_and_keeps_original() {
        let (tmp, creds) = test_store();
        creds.bootstrap(DEFAULT_ADMIN_PASSWORD).unwrap();
        let before = stored_pair(&tmp, "admin");

        let err = creds.create_account("admin", "x", "Administrator").unwrap_err();
        assert!(matches!(err, CredentialError::DuplicateUsername(ref u) if u == "admin"));

        assert_eq!(stored_pair(&tmp, "admin"), before);
        assert!(creds.verify("admin", DEFAULT_ADMIN_PASSWORD).is_some());
    }

    #[test]
    fn empty_input_is_rejected() {
        let (_tmp, creds) = test_store();
        assert!(matches!(
            creds.create_account("", "pw", "Teacher"),
            Err(CredentialError::InvalidInput(_))
        ));
        assert!(matches!(
            creds.create_account("   ", "pw", "Teacher"),
            Err(CredentialError::InvalidInput(_))
        ));
        assert!(matches!(
            creds.create_account("maria", "", "Teacher"),
            Err(CredentialError::InvalidInput(_))
        ));
        assert_eq!(creds.account_count().unwrap(), 0);
    }

    #[test]
    fn unknown_role_is_accepted_without_permissions() {
        let (_tmp, creds) = test_store();
        let account = creds.create_account("guest", "pw", "Visitor").unwrap();
        assert!(!account.can(Permission::ViewReports));
        assert!(creds.verify("guest", "pw").is_some());
    }

    #[test]
    fn change_password_rotates_salt_and_hash() {
        let (tmp, creds) = test_store();
        creds.create_account("maria", "old-pass", "Teacher").unwrap();
        let (old_hash, old_salt) = stored_pair(&tmp, "maria");

        creds.change_password("maria", "new-pass").unwrap();
        let (new_hash, new_salt) = stored_pair(&tmp, "maria");

        assert_ne!(old_salt, new_salt);
        assert_ne!(old_hash, new_hash);
        assert!(creds.verify("maria", "new-pass").is_some());
        assert!(creds.verify("maria", "old-pass").is_none());
    }

    #[test]
    fn change_password_to_same_value_still_rotates_salt() {
        let (tmp, creds) = test_store();
        creds.create_account("maria", "same-pass", "Teacher").unwrap();
        let (_, old_salt) = stored_pair(&tmp, "maria");

        creds.change_password("maria", "same-pass").unwrap();
        let (_, new_salt) = stored_pair(&tmp, "maria");
        assert_ne!(old_salt, new_salt);
    }

    #[test]
    fn change_password_unknown_user_is_not_found() {
        let (_tmp, creds) = test_store();
        let err = creds.change_password("ghost", "whatever").unwrap_err();
        assert!(matches!(err, CredentialError::NotFound(ref u) if u == "ghost"));
    }

    #[test]
    fn role_change_and_delete() {
        let (_tmp, creds) = test_store();
        creds.create_account("maria", "secreto1", "Student").unwrap();

        creds.change_role("maria", "Teacher").unwrap();
        assert_eq!(
            creds.verify("maria", "secreto1").map(|(_, role)| role),
            Some("Teacher".to_string())
        );

        creds.delete_account("maria").unwrap();
        assert!(!creds.account_exists("maria"));
        assert!(matches!(
            creds.delete_account("maria"),
            Err(CredentialError::NotFound(_))
        ));
        assert!(matches!(
            creds.change_role("maria", "Teacher"),
            Err(CredentialError::NotFound(_))
        ));
    }

    #[test]
    fn admin_cannot_be_deleted() {
        let (_tmp, creds) = test_store();
        creds.bootstrap(DEFAULT_ADMIN_PASSWORD).unwrap();

        let err = creds.delete_account("admin").unwrap_err();
        assert!(matches!(err, CredentialError::ProtectedAccount(_)));
        assert!(creds.account_exists("admin"));
    }

    #[test]
    fn bootstrap_creates_single_admin() {
        let (_tmp, creds) = test_store();

        let report = creds.bootstrap(DEFAULT_ADMIN_PASSWORD).unwrap();
        assert!(report.admin_created);
        assert_eq!(creds.account_count().unwrap(), 1);

        let accounts = creds.list_accounts().unwrap();
        assert_eq!(accounts[0].username, "admin");
        assert_eq!(accounts[0].role, "Administrator");
        assert_eq!(
            creds.verify("admin", "1234"),
            Some(("admin".to_string(), "Administrator".to_string()))
        );

        let again = creds.bootstrap(DEFAULT_ADMIN_PASSWORD).unwrap();
        assert!(!again.admin_created);
        assert_eq!(creds.account_count().unwrap(), 1);
    }

    #[test]
    fn bootstrap_keeps_changed_admin_password() {
        let (_tmp, creds) = test_store();
        creds.bootstrap(DEFAULT_ADMIN_PASSWORD).unwrap();
        creds.change_password("admin", "much-better").unwrap();

        creds.bootstrap(DEFAULT_ADMIN_PASSWORD).unwrap();
        assert!(creds.verify("admin", "1234").is_none());
        assert!(creds.verify("admin", "much-better").is_some());
    }

    #[test]
    fn unmigrated_account_cannot_log_in() {
        let (tmp, creds) = test_store();
        insert_legacy(&tmp.path().join("rollcall.db"), "viejo", "clave-vieja");

        assert!(creds.account_exists("viejo"));
        assert!(creds.verify("viejo", "clave-vieja").is_none());
        assert!(!creds.get_account("viejo").unwrap().unwrap().has_credentials);
    }

    #[test]
    fn migrate_legacy_is_idempotent() {
        let (tmp, creds) = test_store();
        let db = tmp.path().join("rollcall.db");
        insert_legacy(&db, "viejo", "clave-vieja");
        insert_legacy(&db, "antiguo", "otra-clave");
        creds.create_account("nuevo", "nueva", "Student").unwrap();

        let first = creds.migrate_legacy().unwrap();
        assert_eq!(first, MigrationReport { migrated: 2, failed: 0 });
        let pair_after_first = stored_pair(&tmp, "viejo");

        let second = creds.migrate_legacy().unwrap();
        assert_eq!(second, MigrationReport { migrated: 0, failed: 0 });
        assert_eq!(stored_pair(&tmp, "viejo"), pair_after_first);

        assert!(creds.verify("viejo", "clave-vieja").is_some());
        assert!(creds.verify("antiguo", "otra-clave").is_some());

        // Legacy field is retained untouched.
        let clave: Option<String> = raw(&tmp)
            .query_row("SELECT clave FROM users WHERE username = 'viejo'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(clave.as_deref(), Some("clave-vieja"));
    }

    #[test]
    fn migrate_legacy_continues_past_failures() {
        let (tmp, creds) = test_store();
        let db = tmp.path().join("rollcall.db");
        insert_legacy(&db, "bueno", "uno");
        insert_legacy(&db, "roto", "dos");
        insert_legacy(&db, "otro", "tres");
        raw(&tmp)
            .execute_batch(
                "CREATE TRIGGER fail_roto BEFORE UPDATE ON users
                 WHEN OLD.username = 'roto'
                 BEGIN SELECT RAISE(ABORT, 'simulated failure'); END;",
            )
            .unwrap();

        let report = creds.migrate_legacy().unwrap();
        assert_eq!(report, MigrationReport { migrated: 2, failed: 1 });
        assert!(matches!(
            report.into_result(),
            Err(CredentialError::MigrationPartialFailure { migrated: 2, failed: 1 })
        ));
        assert!(creds.verify("bueno", "uno").is_some());
        assert!(creds.verify("otro", "tres").is_some());
        assert!(creds.verify("roto", "dos").is_none());
    }

    #[test]
    fn bootstrap_migrates_before_creating_admin() {
        let (tmp, creds) = test_store();
        insert_legacy(&tmp.path().join("rollcall.db"), "viejo", "clave-vieja");

        let report = creds.bootstrap(DEFAULT_ADMIN_PASSWORD).unwrap();
        assert_eq!(report.migration.migrated, 1);
        assert!(report.admin_created);
        assert_eq!(creds.account_count().unwrap(), 2);
    }

    #[test]
    fn audit_records_account_changes() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("rollcall.db");
        let audit = Arc::new(AuditLog::open(&db).unwrap());
        let creds = CredentialStore::new(SqliteAccountStore::open(&db).unwrap())
            .with_audit(Arc::clone(&audit));

        creds.create_account("maria", "secreto1", "Teacher").unwrap();
        creds.change_password("maria", "secreto2").unwrap();
        creds.delete_account("maria").unwrap();

        let actions: Vec<String> = audit
            .for_user("maria")
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert!(actions.contains(&"account_created".to_string()));
        assert!(actions.contains(&"password_changed".to_string()));
        assert!(actions.contains(&"account_deleted".to_string()));

        for entry in audit.recent(100).unwrap() {
            assert!(!entry.details.contains("secreto"));
        }
    }
}
