//! Sidecar storage for disabled mods.
//!
//! Disabled entries are left out of `Mods=` / `WorkshopItems=` on save, so the
//! server configuration has no slot for them. They are remembered in
//! `.pz_mod_manager.json` next to the configuration file instead, keyed by the
//! configuration file name so several server configs can share a directory:
//!
//! ```json
//! {
//!   "servertest.ini": {
//!     "disabled_mods": [
//!       { "mod_id": "ModB", "workshop_id": "222", "name": "Mod B", "position": 1 }
//!     ]
//!   }
//! }
//! ```

use crate::models::ModEntry;
use crate::services::serializer::{PersistenceError, StagedFile};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;

/// File name of the sidecar.
pub const SIDECAR_FILE_NAME: &str = ".pz_mod_manager.json";

/// A disabled entry as remembered in the sidecar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisabledMod {
    #[serde(default)]
    pub mod_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workshop_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Position in the list when the entry was last saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

impl DisabledMod {
    pub fn from_entry(entry: &ModEntry) -> Self {
        Self {
            mod_id: entry.mod_id.clone(),
            workshop_id: entry.workshop_id.clone().unwrap_or_default(),
            name: entry.display_name.clone().unwrap_or_default(),
            position: Some(entry.order),
        }
    }

    /// Records with both ids match the exact pair. A record with only one id
    /// matches on that id, and a workshop-only record only matches entries
    /// without a mod id.
    pub fn matches(&self, entry: &ModEntry) -> bool {
        let workshop_matches = entry.workshop_id.as_deref() == Some(self.workshop_id.as_str());
        match (self.mod_id.is_empty(), self.workshop_id.is_empty()) {
            (false, false) => self.mod_id == entry.mod_id && workshop_matches,
            (false, true) => self.mod_id == entry.mod_id,
            (true, false) => entry.mod_id.is_empty() && workshop_matches,
            (true, true) => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mod_id.is_empty() && self.workshop_id.is_empty()
    }

    pub fn to_entry(&self) -> ModEntry {
        let mut entry = ModEntry::new(
            self.mod_id.clone(),
            (!self.workshop_id.is_empty()).then(|| self.workshop_id.clone()),
        );
        entry.display_name = (!self.name.is_empty()).then(|| self.name.clone());
        entry.enabled = false;
        entry
    }
}

/// The disabled entries of one configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisabledState {
    #[serde(default)]
    pub disabled_mods: Vec<DisabledMod>,
}

impl DisabledState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a ModEntry>) -> Self {
        Self {
            disabled_mods: entries
                .into_iter()
                .filter(|e| !e.enabled)
                .map(DisabledMod::from_entry)
                .collect(),
        }
    }

    pub fn matches(&self, entry: &ModEntry) -> bool {
        self.disabled_mods.iter().any(|m| m.matches(entry))
    }

    pub fn len(&self) -> usize {
        self.disabled_mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.disabled_mods.is_empty()
    }
}

type SidecarMap = IndexMap<String, DisabledState>;

/// Disabled-state store scoped to one configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisabledStore {
    sidecar_path: Utf8PathBuf,
    key: String,
}

impl DisabledStore {
    /// Store for the configuration file at `config_path`.
    pub fn for_config(config_path: &Utf8Path) -> Self {
        let dir = match config_path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };
        let key = config_path
            .file_name()
            .unwrap_or(config_path.as_str())
            .to_string();

        Self {
            sidecar_path: dir.join(SIDECAR_FILE_NAME),
            key,
        }
    }

    pub fn sidecar_path(&self) -> &Utf8Path {
        &self.sidecar_path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn read_map(&self) -> SidecarMap {
        if !self.sidecar_path.exists() {
            return SidecarMap::new();
        }

        let contents = match fs::read_to_string(&self.sidecar_path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!("Failed to read sidecar {}: {}", self.sidecar_path, e);
                return SidecarMap::new();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!(
                "Ignoring corrupt sidecar {}: {}",
                self.sidecar_path,
                e
            );
            SidecarMap::new()
        })
    }

    /// Disabled entries for this configuration file.
    ///
    /// A missing or corrupt sidecar gives an empty state; only the on/off
    /// toggles are lost, the mods themselves stay in the configuration.
    pub fn load(&self) -> DisabledState {
        let state = self.read_map().shift_remove(&self.key).unwrap_or_default();
        tracing::debug!(
            "Loaded {} disabled mods for {} from {}",
            state.len(),
            self.key,
            self.sidecar_path
        );
        state
    }

    /// Prepare the sidecar write without touching the existing file.
    ///
    /// Entries of other configuration files are kept; an empty state removes
    /// this file's key, and an empty sidecar is deleted on commit.
    pub fn stage(&self, state: &DisabledState) -> Result<StagedFile, PersistenceError> {
        let mut map = self.read_map();
        if state.is_empty() {
            map.shift_remove(&self.key);
        } else {
            map.insert(self.key.clone(), state.clone());
        }

        if map.is_empty() {
            return Ok(StagedFile::removal(&self.sidecar_path));
        }

        let json = serde_json::to_string_pretty(&map)
            .map_err(|e| PersistenceError::Serialize(e.to_string()))?;
        StagedFile::stage(&self.sidecar_path, json.as_bytes())
    }

    /// Atomically write `state` to the sidecar.
    pub fn save(&self, state: &DisabledState) -> Result<(), PersistenceError> {
        self.stage(state)?.commit()?;
        tracing::debug!(
            "Saved {} disabled mods for {} to {}",
            state.len(),
            self.key,
            self.sidecar_path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store(name: &str) -> (DisabledStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (DisabledStore::for_config(&dir.join(name)), temp_dir)
    }

    fn disabled(mod_id: &str, workshop_id: &str) -> DisabledMod {
        DisabledMod {
            mod_id: mod_id.to_string(),
            workshop_id: workshop_id.to_string(),
            name: String::new(),
            position: None,
        }
    }

    #[test]
    fn test_for_config_paths() {
        let store = DisabledStore::for_config(Utf8Path::new("/srv/pz/servertest.ini"));
        assert_eq!(store.sidecar_path().as_str(), "/srv/pz/.pz_mod_manager.json");
        assert_eq!(store.key(), "servertest.ini");

        let relative = DisabledStore::for_config(Utf8Path::new("servertest.ini"));
        assert_eq!(relative.sidecar_path().as_str(), "./.pz_mod_manager.json");
    }

    #[test]
    fn test_missing_sidecar_is_empty() {
        let (store, _temp) = create_test_store("servertest.ini");
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_corrupt_sidecar_is_empty() {
        let (store, _temp) = create_test_store("servertest.ini");
        fs::write(store.sidecar_path(), "{ not json").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let (store, _temp) = create_test_store("servertest.ini");
        let state = DisabledState {
            disabled_mods: vec![disabled("ModB", "222")],
        };

        store.save(&state).unwrap();
        let loaded = store.load();

        assert_eq!(loaded, state);
        assert!(loaded.disabled_mods.iter().any(|m| m.mod_id == "ModB"));
        assert!(!loaded.disabled_mods.iter().any(|m| m.mod_id == "ModA"));
    }

    #[test]
    fn test_configs_share_sidecar_without_clobbering() {
        let (first, temp) = create_test_store("servertest.ini");
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let second = DisabledStore::for_config(&dir.join("pvp.ini"));

        first
            .save(&DisabledState {
                disabled_mods: vec![disabled("ModA", "")],
            })
            .unwrap();
        second
            .save(&DisabledState {
                disabled_mods: vec![disabled("ModZ", "")],
            })
            .unwrap();

        assert!(first.load().disabled_mods.iter().any(|m| m.mod_id == "ModA"));
        assert!(!first.load().disabled_mods.iter().any(|m| m.mod_id == "ModZ"));
        assert!(second.load().disabled_mods.iter().any(|m| m.mod_id == "ModZ"));
    }

    #[test]
    fn test_empty_state_removes_sidecar() {
        let (store, _temp) = create_test_store("servertest.ini");
        store
            .save(&DisabledState {
                disabled_mods: vec![disabled("ModA", "")],
            })
            .unwrap();
        assert!(store.sidecar_path().exists());

        store.save(&DisabledState::new()).unwrap();
        assert!(!store.sidecar_path().exists());

        // Removing an already missing sidecar is fine
        store.save(&DisabledState::new()).unwrap();
    }

    #[test]
    fn test_workshop_only_record_matching() {
        let record = disabled("", "333");
        assert!(record.matches(&ModEntry::new("", Some("333".to_string()))));
        assert!(!record.matches(&ModEntry::new("ModC", Some("333".to_string()))));

        let by_mod = disabled("ModC", "");
        assert!(by_mod.matches(&ModEntry::new("ModC", Some("333".to_string()))));
    }

    #[test]
    fn test_pair_record_matches_only_its_pair() {
        let record = disabled("a", "2");
        assert!(record.matches(&ModEntry::new("a", Some("2".to_string()))));
        assert!(!record.matches(&ModEntry::new("a", Some("1".to_string()))));
        assert!(!record.matches(&ModEntry::new("a", None)));
        assert!(!disabled("", "").matches(&ModEntry::new("", None)));
    }

    #[test]
    fn test_to_entry_is_disabled() {
        let mut record = disabled("ModB", "222");
        record.name = "Mod B".to_string();

        let entry = record.to_entry();
        assert!(!entry.enabled);
        assert_eq!(entry.workshop_id.as_deref(), Some("222"));
        assert_eq!(entry.display_name.as_deref(), Some("Mod B"));
    }
}
