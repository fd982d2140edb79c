//! Audit trail of account activity.
//!
//! Every account change and every login outcome is written to the
//! `audit_log` table, so administrators holding the `view_audit_log`
//! permission can answer "who did what, and when". Entries never contain
//! passwords or credential material.

pub mod store;

pub use store::{AuditAction, AuditEntry, AuditLog};
