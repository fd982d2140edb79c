//! Account credentials and login.
//!
//! Provides:
//! - Salted SHA-256 password digests (`hex(sha256(salt || password))`, 8-byte salt)
//! - Account creation, verification, password rotation, role change, deletion
//! - One-time, idempotent migration of legacy plaintext rows
//! - First-run bootstrap of the protected `admin` account
//! - A login flow with temporary lockout and audit entries
//!
//! ## Design Decisions
//! - The credential core is generic over `store::AccountStore`; uniqueness is
//!   a storage constraint, never a check-then-insert.
//! - Verification returns `Option`, so "no such user" and "wrong password"
//!   are indistinguishable to callers. Digests are compared in constant time.
//! - Passwords, digests and salts never appear in logs or error messages.

pub mod error;
pub mod login;
pub mod password;
pub mod store;

pub use error::CredentialError;
pub use login::{LoginOutcome, LoginService, GENERIC_FAILURE};
pub use password::{hash_password, PasswordPolicy};
pub use store::{
    Account, BootstrapReport, CredentialStore, MigrationReport, DEFAULT_ADMIN_PASSWORD,
    DEFAULT_ADMIN_USERNAME,
};
