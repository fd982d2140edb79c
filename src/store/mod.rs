//! Account record storage.
//!
//! The credential core never talks to SQLite directly; it goes through the
//! [`AccountStore`] trait so the persistence layer can be swapped (or faked
//! in tests). The only shipped implementation is [`SqliteAccountStore`].
//!
//! Storage rows carry the password hash, the salt and the legacy plaintext
//! field. They stay inside this module and `auth::store`; callers above the
//! credential store only ever see `auth::Account`.

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteAccountStore;

use std::fmt;

/// Error raised by a record store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The `username` uniqueness constraint rejected the write.
    #[error("unique constraint violated")]
    UniqueViolation,
    /// Any other backend failure (I/O, corruption, locked database, ...).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY) =>
            {
                Self::UniqueViolation
            }
            other => Self::Backend(other.to_string()),
        }
    }
}

/// One row of the `users` table.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: Option<String>,
    pub salt: Option<String>,
    pub role: String,
    /// Historical plaintext-equivalent field (`clave`). Only read by the
    /// legacy migration.
    pub legacy_secret: Option<String>,
}

impl AccountRecord {
    /// Both halves of the credential pair are present.
    pub fn has_credentials(&self) -> bool {
        matches!(
            (&self.password_hash, &self.salt),
            (Some(h), Some(s)) if !h.is_empty() && !s.is_empty()
        )
    }
}

// Secrets are never printed, not even in debug output.
impl fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("has_credentials", &self.has_credentials())
            .field("role", &self.role)
            .field("has_legacy_secret", &self.legacy_secret.is_some())
            .finish()
    }
}

/// Persistence seam for account rows.
///
/// Implementations must enforce `username` uniqueness themselves (a
/// constraint, not a check-then-insert) and report it as
/// [`StoreError::UniqueViolation`]. Every write of credentials must set the
/// hash and the salt together.
pub trait AccountStore: Send + Sync {
    /// Insert a fully credentialed account.
    fn insert(
        &self,
        username: &str,
        password_hash: &str,
        salt: &str,
        role: &str,
    ) -> Result<AccountRecord, StoreError>;

    /// Look up a row by exact (case-sensitive) username.
    fn find(&self, username: &str) -> Result<Option<AccountRecord>, StoreError>;

    /// Replace hash and salt together. Returns `false` when no row matched.
    fn update_credentials(
        &self,
        username: &str,
        password_hash: &str,
        salt: &str,
    ) -> Result<bool, StoreError>;

    /// Write hash and salt for a legacy row, but only while the row still
    /// lacks a credential pair. Returns `false` when nothing was written.
    fn backfill_credentials(
        &self,
        id: i64,
        password_hash: &str,
        salt: &str,
    ) -> Result<bool, StoreError>;

    /// Returns `false` when no row matched.
    fn update_role(&self, username: &str, role: &str) -> Result<bool, StoreError>;

    /// Returns `false` when no row matched.
    fn delete(&self, username: &str) -> Result<bool, StoreError>;

    /// All rows, newest first.
    fn list(&self) -> Result<Vec<AccountRecord>, StoreError>;

    /// Rows with a legacy secret and no complete credential pair.
    fn legacy_candidates(&self) -> Result<Vec<AccountRecord>, StoreError>;

    fn count(&self) -> Result<u64, StoreError>;
}
