//! Configuration management
//!
//! Handles loading and validation of gpp configuration from
//! `<home>/config.json` and environment variables.

pub mod loader;
pub mod schema;
pub mod validate;

pub use loader::{default_home, ConfigLoader, API_ENV};
pub use schema::*;
