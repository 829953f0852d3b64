//! Writing the mod list back to disk.
//!
//! [`write`] projects a [`ModList`] into a [`ConfigDocument`] and renders the
//! text. [`save`] persists the configuration file and the disabled-mods sidecar
//! with temp-file-then-rename so that a failed save never leaves a truncated or
//! half-written file behind.

use crate::services::disabled_store::DisabledStore;
use crate::services::document::{ConfigDocument, MODS_KEY, WORKSHOP_ITEMS_KEY};
use crate::services::reconciler::ModList;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::{self, Write};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors that can occur while persisting files
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize: {0}")]
    Serialize(String),
}

impl PersistenceError {
    fn io(path: &Utf8Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn parent_dir(path: &Utf8Path) -> &Utf8Path {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    }
}

#[derive(Debug)]
enum Pending {
    Write(NamedTempFile),
    Remove,
}

/// A file change prepared next to its target and applied by [`commit`](Self::commit).
///
/// Staging writes and syncs a temp file in the target's directory; the target
/// is untouched until the rename. Dropping an uncommitted stage deletes the
/// temp file.
#[derive(Debug)]
pub struct StagedFile {
    target: Utf8PathBuf,
    pending: Pending,
}

impl StagedFile {
    /// Stage `contents` for `target`.
    pub fn stage(target: &Utf8Path, contents: &[u8]) -> Result<Self, PersistenceError> {
        Self::stage_with(target, |w| w.write_all(contents))
    }

    /// Stage whatever `writer` produces for `target`. An error from `writer`
    /// discards the temp file.
    pub fn stage_with<F>(target: &Utf8Path, writer: F) -> Result<Self, PersistenceError>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let mut temp = tempfile::Builder::new()
            .prefix(".pz_")
            .suffix(".tmp")
            .tempfile_in(parent_dir(target))
            .map_err(|e| PersistenceError::io(target, e))?;

        // The temp file is created owner-only; keep the target's mode instead
        match fs::metadata(target) {
            Ok(metadata) => temp
                .as_file()
                .set_permissions(metadata.permissions())
                .map_err(|e| PersistenceError::io(target, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(PersistenceError::io(target, e)),
        }

        writer(temp.as_file_mut())
            .and_then(|_| temp.as_file_mut().flush())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| PersistenceError::io(target, e))?;

        Ok(Self {
            target: target.to_path_buf(),
            pending: Pending::Write(temp),
        })
    }

    /// Stage deletion of `target`; a missing target is not an error.
    pub fn removal(target: &Utf8Path) -> Self {
        Self {
            target: target.to_path_buf(),
            pending: Pending::Remove,
        }
    }

    pub fn target(&self) -> &Utf8Path {
        &self.target
    }

    /// Apply the staged change.
    pub fn commit(self) -> Result<(), PersistenceError> {
        match self.pending {
            Pending::Write(temp) => {
                temp.persist(&self.target)
                    .map_err(|e| PersistenceError::io(&self.target, e.error))?;
            }
            Pending::Remove => match fs::remove_file(&self.target) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(PersistenceError::io(&self.target, e)),
            },
        }
        Ok(())
    }
}

/// Temp-then-rename file writes.
pub struct AtomicFile;

impl AtomicFile {
    pub fn write(path: &Utf8Path, contents: &[u8]) -> Result<(), PersistenceError> {
        StagedFile::stage(path, contents)?.commit()
    }

    /// Write through `writer`; on error the existing file is left as it was.
    pub fn write_with<F>(path: &Utf8Path, writer: F) -> Result<(), PersistenceError>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        StagedFile::stage_with(path, writer)?.commit()
    }
}

/// Project `mods` into `document` and render the full text.
///
/// Only `Mods=` and `WorkshopItems=` change; every other line keeps its
/// original bytes and position.
pub fn write(document: &mut ConfigDocument, mods: &ModList) -> String {
    let (mod_ids, workshop_ids) = mods.to_lists();
    // Empty lists are not added to files that never had the key
    if !mod_ids.is_empty() || document.contains_key(MODS_KEY) {
        document.set_mod_ids(&mod_ids);
    }
    if !workshop_ids.is_empty() || document.contains_key(WORKSHOP_ITEMS_KEY) {
        document.set_workshop_ids(&workshop_ids);
    }
    document.to_text()
}

/// Save the configuration file and the disabled-mods sidecar together.
///
/// Both files are staged before either is renamed. If the sidecar cannot be
/// renamed after the configuration file was, the configuration file is put
/// back to its previous bytes. `document` is only updated once both files are
/// on disk.
pub fn save(
    config_path: &Utf8Path,
    document: &mut ConfigDocument,
    mods: &ModList,
    store: &DisabledStore,
) -> Result<(), PersistenceError> {
    let mut staged_document = document.clone();
    let text = write(&mut staged_document, mods);

    let previous = match fs::read(config_path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(PersistenceError::io(config_path, e)),
    };

    let staged_config = StagedFile::stage(config_path, text.as_bytes())?;
    let staged_sidecar = store.stage(&mods.disabled_state())?;

    staged_config.commit()?;

    if let Err(e) = staged_sidecar.commit() {
        tracing::error!("Sidecar write failed, restoring {}: {}", config_path, e);
        let restored = match &previous {
            Some(bytes) => AtomicFile::write(config_path, bytes),
            None => StagedFile::removal(config_path).commit(),
        };
        if let Err(restore_err) = restored {
            tracing::error!("Failed to restore {}: {}", config_path, restore_err);
        }
        return Err(e);
    }

    *document = staged_document;

    tracing::info!(
        "Saved {} ({} mods, {} disabled)",
        config_path,
        mods.len(),
        mods.disabled_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewEntry;
    use crate::services::disabled_store::DisabledState;
    use tempfile::TempDir;

    fn temp_dir() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (temp_dir, dir)
    }

    #[test]
    fn test_write_only_touches_list_keys() {
        let text = "PVP=true\nMods=\\A;\\B\nWorkshopItems=1;2\nPublicName=x\n";
        let mut doc = ConfigDocument::parse(text).unwrap();
        let mut mods = ModList::build(&doc, &DisabledState::new());
        mods.move_entry(1, 0).unwrap();

        let out = write(&mut doc, &mods);
        assert_eq!(out, "PVP=true\nMods=\\B;\\A\nWorkshopItems=2;1\nPublicName=x\n");
    }

    #[test]
    fn test_write_unchanged_list_is_identity() {
        let text = "# comment\nMods=\\A;\\B\nWorkshopItems=1;2\n";
        let mut doc = ConfigDocument::parse(text).unwrap();
        let mods = ModList::build(&doc, &DisabledState::new());

        assert_eq!(write(&mut doc, &mods), text);
    }

    #[test]
    fn test_write_without_lists_adds_nothing() {
        let text = "PVP=true\nPublicName=x\n";
        let mut doc = ConfigDocument::parse(text).unwrap();
        let mods = ModList::build(&doc, &DisabledState::new());

        assert_eq!(write(&mut doc, &mods), text);
    }

    #[test]
    fn test_atomic_write_failure_keeps_previous_file() {
        let (_temp, dir) = temp_dir();
        let path = dir.join("servertest.ini");
        fs::write(&path, "Mods=\\A\n").unwrap();

        let result = AtomicFile::write_with(&path, |w| {
            w.write_all(b"Mods=\\Trunc")?;
            Err(io::Error::other("disk full"))
        });

        assert!(matches!(result, Err(PersistenceError::Io { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), "Mods=\\A\n");

        // No temp files left behind
        let leftovers = fs::read_dir(&dir).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let (_temp, dir) = temp_dir();
        let path = dir.join("servertest.ini");
        fs::write(&path, "Mods=\\A\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        AtomicFile::write(&path, b"Mods=\\B\n").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
        assert_eq!(fs::read_to_string(&path).unwrap(), "Mods=\\B\n");
    }

    #[test]
    fn test_save_writes_both_files() {
        let (_temp, dir) = temp_dir();
        let path = dir.join("servertest.ini");
        fs::write(&path, "Mods=\\A;\\B\nWorkshopItems=1;2\n").unwrap();

        let mut doc = ConfigDocument::parse(&fs::read_to_string(&path).unwrap()).unwrap();
        let store = DisabledStore::for_config(&path);
        let mut mods = ModList::build(&doc, &store.load());
        mods.set_enabled(1, false).unwrap();
        mods.insert_entry(NewEntry::workshop("3").with_mod_id("C"), None)
            .unwrap();

        save(&path, &mut doc, &mods, &store).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Mods=\\A;\\C\nWorkshopItems=1;3\n"
        );
        assert!(store.load().disabled_mods.iter().any(|m| m.mod_id == "B"));
        assert_eq!(doc.mod_ids(), vec!["A", "C"]);
    }

    #[test]
    fn test_save_failure_leaves_document_untouched() {
        let (_temp, dir) = temp_dir();
        let path = dir.join("missing-dir").join("servertest.ini");

        let mut doc = ConfigDocument::parse("Mods=\\A\n").unwrap();
        let store = DisabledStore::for_config(&path);
        let mut mods = ModList::build(&doc, &DisabledState::new());
        mods.remove_entry(0).unwrap();

        assert!(save(&path, &mut doc, &mods, &store).is_err());
        assert_eq!(doc.mod_ids(), vec!["A"]);
    }
}
