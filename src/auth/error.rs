//! Typed errors returned by the credential core.
//!
//! Messages name the account at most; they never carry a password, a
//! digest or a salt.

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),

    #[error("no account named '{0}'")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("legacy migration incomplete: {migrated} migrated, {failed} failed")]
    MigrationPartialFailure { migrated: usize, failed: usize },

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("account '{0}' is protected and cannot be deleted")]
    ProtectedAccount(String),

    #[error("password must be at least {min_len} characters")]
    WeakPassword { min_len: usize },
}

impl From<StoreError> for CredentialError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}
