pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod geocode;
pub mod idp;
pub mod prefs;
pub mod utils;

pub use error::{Error, Result};

/// Crate version, reported by the CLI version flag.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
