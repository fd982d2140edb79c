//! Login flow used by the front end.
//!
//! Order of checks for one attempt:
//! 1. lockout (refused without touching stored credentials)
//! 2. credential verification
//! 3. lockout bookkeeping and audit entry
//!
//! Failure text is identical for unknown users and wrong passwords.

use parking_lot::Mutex;

use crate::audit::AuditAction;
use crate::security::lockout::{GuardStatus, LoginGuard};
use crate::store::AccountStore;

use super::error::CredentialError;
use super::password::PasswordPolicy;
use super::store::{Account, CredentialStore};

/// The one message shown for any rejected credentials.
pub const GENERIC_FAILURE: &str = "Invalid username or password.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Granted { username: String, role: String },
    Denied,
    LockedOut { retry_after_secs: u64 },
}

impl LoginOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }

    /// User-facing text for this outcome.
    pub fn message(&self) -> String {
        match self {
            Self::Granted { username, .. } => format!("Welcome, {username}."),
            Self::Denied => GENERIC_FAILURE.to_string(),
            Self::LockedOut { retry_after_secs } => {
                let minutes = retry_after_secs.div_ceil(60).max(1);
                format!("Too many failed attempts. Try again in {minutes} minute(s).")
            }
        }
    }
}

pub struct LoginService<S: AccountStore> {
    credentials: CredentialStore<S>,
    guard: Mutex<LoginGuard>,
    policy: PasswordPolicy,
}

impl<S: AccountStore> LoginService<S> {
    pub fn new(credentials: CredentialStore<S>, guard: LoginGuard, policy: PasswordPolicy) -> Self {
        Self {
            credentials,
            guard: Mutex::new(guard),
            policy,
        }
    }

    pub fn credentials(&self) -> &CredentialStore<S> {
        &self.credentials
    }

    pub fn policy(&self) -> PasswordPolicy {
        self.policy
    }

    fn audit(&self, username: &str, action: AuditAction, details: &str) {
        if let Some(log) = self.credentials.audit_log() {
            if let Err(e) = log.record(username, action, details) {
                tracing::warn!(username, action = action.as_str(), "Failed to write audit entry: {e}");
            }
        }
    }

    pub fn login(&self, username: &str, password: &str) -> LoginOutcome {
        if let GuardStatus::Locked { retry_after_secs } = self.guard.lock().check(username) {
            self.audit(username, AuditAction::LoginLocked, "attempt refused while locked");
            return LoginOutcome::LockedOut { retry_after_secs };
        }

        match self.credentials.verify(username, password) {
            Some((username, role)) => {
                self.guard.lock().record_success(&username);
                tracing::info!(username = %username, role = %role, "Login succeeded");
                self.audit(&username, AuditAction::LoginSucceeded, "");
                LoginOutcome::Granted { username, role }
            }
            None => {
                let status = self.guard.lock().record_failure(username);
                tracing::info!(username, "Login failed");
                self.audit(username, AuditAction::LoginFailed, "");
                match status {
                    GuardStatus::Locked { retry_after_secs } => {
                        self.audit(username, AuditAction::LoginLocked, "lock engaged");
                        LoginOutcome::LockedOut { retry_after_secs }
                    }
                    GuardStatus::Open => LoginOutcome::Denied,
                }
            }
        }
    }

    /// Admin unlock of a locked username.
    pub fn unlock(&self, username: &str) -> bool {
        self.guard.lock().reset(username)
    }

    /// Create an account after applying the password policy.
    pub fn register(&self, username: &str, password: &str, role: &str) -> Result<Account, CredentialError> {
        self.policy.check(password)?;
        self.credentials.create_account(username, password, role)
    }

    /// Administrative reset, subject to the password policy.
    pub fn reset_password(&self, username: &str, new_password: &str) -> Result<(), CredentialError> {
        self.policy.check(new_password)?;
        self.credentials.change_password(username, new_password)
    }

    /// Self-service change: the current password must verify first.
    pub fn change_own_password(
        &self,
        username: &str,
        current: &str,
        new_password: &str,
    ) -> Result<(), CredentialError> {
        if self.credentials.verify(username, current).is_none() {
            return Err(CredentialError::InvalidInput("current password does not match"));
        }
        self.reset_password(username, new_password)
    }
}
