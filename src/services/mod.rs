//! Services module - Pure logic for reading, editing and writing mod lists.
//!
//! Nothing in here knows about the session or any front end; every input is an
//! explicit parameter, which keeps the pieces testable on their own.
//!
//! # Components
//!
//! - [`ConfigDocument`]: line-preserving model of `servertest.ini` with typed
//!   accessors for the `Mods=` and `WorkshopItems=` lists
//! - [`ModList`]: pairs the two lists into ordered [`ModEntry`](crate::models::ModEntry)
//!   rows and validates every edit
//! - [`DisabledStore`]: JSON sidecar remembering disabled entries
//! - [`serializer`]: projects the list back into the document and performs
//!   the atomic two-file save
//! - [`WorkshopLookup`] / [`SteamWorkshopClient`]: workshop id to title lookups
//! - [`workshop_scanner`]: reads `mod.info` files from downloaded workshop content
//! - [`export`]: Docker env var formatting
//!
//! # Flow
//!
//! ```no_run
//! use pzmm::services::{ConfigDocument, DisabledStore, ModList, serializer};
//!
//! # fn main() -> anyhow::Result<()> {
//! # let path = camino::Utf8PathBuf::from("servertest.ini");
//! let mut document = ConfigDocument::from_bytes(&std::fs::read(&path)?)?;
//! let store = DisabledStore::for_config(&path);
//! let mut mods = ModList::build(&document, &store.load());
//!
//! mods.add_entry("https://steamcommunity.com/sharedfiles/filedetails/?id=2875848298", None)?;
//! serializer::save(&path, &mut document, &mods, &store)?;
//! # Ok(())
//! # }
//! ```

pub mod disabled_store;
pub mod document;
pub mod export;
pub mod identifier;
pub mod reconciler;
pub mod serializer;
pub mod workshop_lookup;
pub mod workshop_scanner;

pub use disabled_store::{DisabledMod, DisabledState, DisabledStore, SIDECAR_FILE_NAME};
pub use document::{ConfigDocument, DocumentError, ModListFormat};
pub use export::{docker_mods_value, docker_workshop_value};
pub use identifier::{extract_workshop_id, is_workshop_id};
pub use reconciler::{EnrichReport, ListChange, ModList, ReconcileError};
pub use serializer::{AtomicFile, PersistenceError, StagedFile};
pub use workshop_lookup::{LookupError, LookupResult, SteamWorkshopClient, WorkshopLookup};
pub use workshop_scanner::{
    ScanError, ScanResult, ScannedMod, WorkshopModInfo, scan_workshop_content,
    try_scan_workshop_content,
};
