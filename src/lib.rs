// PZ Mod Manager - Mod list management for Project Zomboid dedicated servers
//
// This is the library crate containing the core logic and data structures.
// The binary crate (main.rs) provides the `pzmm` command line entry point.

pub mod cli;
pub mod config;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use models::{AppSettings, ModEntry, NewEntry, Session};
pub use services::{ConfigDocument, ModList};
pub use state::{SessionChange, SessionError, SessionManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
