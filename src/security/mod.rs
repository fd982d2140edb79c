//! Authorization and login hardening.

pub mod lockout;
pub mod permissions;

pub use lockout::{GuardStatus, LoginGuard};
pub use permissions::{has_permission, known_roles, permissions_for, Permission, Role};
