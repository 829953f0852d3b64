use crate::services::{ConfigDocument, DisabledStore, ModList};
use camino::{Utf8Path, Utf8PathBuf};

/// The open server configuration and everything derived from it.
///
/// Opening a file replaces the whole session; nothing carries over from the
/// previous one except the generation counter, which only moves forward.
#[derive(Debug, Clone)]
pub struct Session {
    /// Path of the configuration file
    pub path: Utf8PathBuf,

    pub document: ConfigDocument,

    pub mods: ModList,

    /// Sidecar store scoped to `path`
    pub store: DisabledStore,

    /// Unsaved edits to the configuration file
    pub dirty: bool,

    /// Tag for background results; results carrying another generation are stale
    pub generation: u64,
}

impl Session {
    /// Build a session from an already parsed document, loading the sidecar.
    pub fn new(path: &Utf8Path, document: ConfigDocument, generation: u64) -> Self {
        let store = DisabledStore::for_config(path);
        let mods = ModList::build(&document, &store.load());

        Self {
            path: path.to_path_buf(),
            document,
            mods,
            store,
            dirty: false,
            generation,
        }
    }

    /// File name shown in titles and status lines.
    pub fn file_name(&self) -> &str {
        self.path.file_name().unwrap_or(self.path.as_str())
    }
}
