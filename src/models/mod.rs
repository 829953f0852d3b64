//! Data models for the mod manager.
//!
//! - [`ModEntry`]: one row of the managed list, pairing a mod id with a workshop id
//! - [`NewEntry`]: input for manual insertions
//! - [`Session`]: the single open server configuration and everything derived from it
//! - [`AppSettings`]: user preferences loaded from `PZ Mod Manager.yaml`
//! - [`ServerSetting`]: a scalar server key as presented to a settings editor

pub mod config;
pub mod mod_entry;
pub mod server_setting;
pub mod session;

pub use config::{AppSettings, MAX_RECENT_FILES};
pub use mod_entry::{ModEntry, NewEntry};
pub use server_setting::{ServerSetting, SettingType};
pub use session::Session;
