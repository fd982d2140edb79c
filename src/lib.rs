//! Account and credential core for a school attendance system.
//!
//! The roster and attendance screens of the surrounding
//! application sit on top of this crate: it owns who may log in, with what
//! role, and what that role may do.
//!
//! - [`auth`]: salted password storage, verification, rotation, legacy
//!   migration, bootstrap and the login flow
//! - [`security`]: the static role/permission table and login lockout
//! - [`store`]: the record-store seam and its SQLite implementation
//! - [`audit`]: account activity trail
//! - [`settings`]: institution settings table
//! - [`config`]: TOML configuration

pub mod app;
pub mod audit;
pub mod auth;
pub mod config;
pub mod security;
pub mod settings;
pub mod store;

pub use app::App;
pub use config::Config;
