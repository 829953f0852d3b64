// Session management module
//
// This module provides the SessionManager which wraps the open Session with thread-safe
// access using Arc<RwLock<T>> and emits change events for front ends. Background workshop
// lookups and scans deliver their results through it, tagged with the session generation.

use crate::models::{ModEntry, NewEntry, ServerSetting, Session};
use crate::services::document::MOD_LIST_KEYS;
use crate::services::{
    ConfigDocument, DisabledStore, ListChange, LookupResult, PersistenceError, ReconcileError,
    ScanError, ScanResult, WorkshopLookup, serializer, try_scan_workshop_content,
};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Errors returned by session edits
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No configuration file is open")]
    NotOpen,

    #[error(transparent)]
    Edit(#[from] ReconcileError),

    #[error(transparent)]
    Persist(#[from] PersistenceError),

    #[error("'{value}' is not a valid value for {key}")]
    InvalidSetting { key: String, value: String },
}

/// Change events emitted when the session is modified
///
/// These events let a front end redraw incrementally without polling the session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionChange {
    /// A configuration file was opened
    Opened { path: Utf8PathBuf, generation: u64 },

    /// The session was closed
    Closed,

    /// The configuration file and sidecar were written
    Saved { path: Utf8PathBuf },

    /// The mod list changed
    List(ListChange),

    /// Workshop names were applied
    NamesResolved { applied: usize },

    /// A workshop scan was applied
    ScanApplied {
        mod_ids_filled: usize,
        workshop_ids_filled: usize,
        names_applied: usize,
    },

    /// A name lookup failed; display names stay unset
    LookupFailed { message: String },

    /// A workshop scan failed
    ScanFailed { message: String },
}

/// Thread-safe owner of the single open [`Session`]
///
/// - Opening replaces the document, mod list and sidecar store wholesale
/// - Edits go through the reconciler and emit [`SessionChange`] events
/// - Background results carry the generation they were started for; results
///   for a closed or reopened session are discarded
///
/// Cloning is cheap and every clone shares the same session.
pub struct SessionManager {
    session: Arc<RwLock<Option<Session>>>,

    /// Last generation handed out; only moves forward
    generation: Arc<AtomicU64>,

    /// Cancellation token of the in-flight workshop scan
    scan_token: Arc<Mutex<Option<CancellationToken>>>,

    change_tx: broadcast::Sender<SessionChange>,
}

impl SessionManager {
    /// Create a manager with no open session and a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(100);
        Self {
            session: Arc::new(RwLock::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            scan_token: Arc::new(Mutex::new(None)),
            change_tx,
        }
    }

    /// Subscribe to session change events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.change_tx.subscribe()
    }

    fn emit(&self, changes: &[SessionChange]) {
        for change in changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.change_tx.send(change.clone());
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.read().unwrap().is_some()
    }

    /// Execute a function with read access to the open session
    ///
    /// # Example
    /// ```ignore
    /// let count = manager.read(|session| session.mods.len())?;
    /// ```
    pub fn read<F, R>(&self, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&Session) -> R,
    {
        let guard = self.session.read().unwrap();
        guard.as_ref().map(f).ok_or(SessionError::NotOpen)
    }

    /// Generation of the open session
    pub fn generation(&self) -> Option<u64> {
        self.read(|session| session.generation).ok()
    }

    pub fn entries(&self) -> Result<Vec<ModEntry>, SessionError> {
        self.read(|session| session.mods.entries().to_vec())
    }

    pub fn is_dirty(&self) -> bool {
        self.read(|session| session.dirty).unwrap_or(false)
    }

    /// Apply an edit to the open session and emit its events after the lock is released
    fn edit<F, R>(&self, edit_fn: F) -> Result<R, SessionError>
    where
        F: FnOnce(&mut Session) -> Result<(R, Vec<SessionChange>), SessionError>,
    {
        let (value, changes) = {
            let mut guard = self.session.write().unwrap();
            let session = guard.as_mut().ok_or(SessionError::NotOpen)?;
            edit_fn(session)?
        };
        self.emit(&changes);
        Ok(value)
    }

    /// Open a configuration file, replacing the current session
    pub fn open(&self, path: &Utf8Path) -> Result<Vec<SessionChange>> {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path))?;
        let document = ConfigDocument::from_bytes(&bytes)
            .with_context(|| format!("Failed to parse {}", path))?;

        self.cancel_scan();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let session = Session::new(path, document, generation);
        let len = session.mods.len();

        tracing::info!(
            "Opened {} ({} mods, {:?} format, generation {})",
            path,
            len,
            session.document.format(),
            generation
        );
        *self.session.write().unwrap() = Some(session);

        let changes = vec![
            SessionChange::Opened {
                path: path.to_path_buf(),
                generation,
            },
            SessionChange::List(ListChange::Reset { len }),
        ];
        self.emit(&changes);
        Ok(changes)
    }

    /// Close the session; in-flight lookups and scans become stale
    pub fn close(&self) -> Vec<SessionChange> {
        self.cancel_scan();
        self.generation.fetch_add(1, Ordering::SeqCst);

        let closed = self.session.write().unwrap().take();
        match closed {
            Some(session) => {
                if session.dirty {
                    tracing::warn!("Closing {} with unsaved changes", session.path);
                }
                let changes = vec![SessionChange::Closed];
                self.emit(&changes);
                changes
            }
            None => Vec::new(),
        }
    }

    /// Save the configuration file and the sidecar
    pub fn save(&self) -> Result<Vec<SessionChange>> {
        let path = {
            let mut guard = self.session.write().unwrap();
            let session = guard.as_mut().ok_or(SessionError::NotOpen)?;
            serializer::save(
                &session.path,
                &mut session.document,
                &session.mods,
                &session.store,
            )
            .with_context(|| format!("Failed to save {}", session.path))?;
            session.dirty = false;
            session.path.clone()
        };

        let changes = vec![SessionChange::Saved { path }];
        self.emit(&changes);
        Ok(changes)
    }

    /// Save to a new path; the session follows the new file and its sidecar
    pub fn save_as(&self, path: &Utf8Path) -> Result<Vec<SessionChange>> {
        {
            let mut guard = self.session.write().unwrap();
            let session = guard.as_mut().ok_or(SessionError::NotOpen)?;
            let store = DisabledStore::for_config(path);
            serializer::save(path, &mut session.document, &session.mods, &store)
                .with_context(|| format!("Failed to save {}", path))?;
            session.path = path.to_path_buf();
            session.store = store;
            session.dirty = false;
        }

        let changes = vec![SessionChange::Saved {
            path: path.to_path_buf(),
        }];
        self.emit(&changes);
        Ok(changes)
    }

    // Mod list edits

    /// Add an entry from a workshop id or URL; returns its order
    pub fn add_entry(&self, input: &str, position: Option<usize>) -> Result<usize, SessionError> {
        self.edit(|session| {
            let order = session.mods.add_entry(input, position)?;
            session.dirty = true;
            Ok((order, vec![SessionChange::List(ListChange::Added { order })]))
        })
    }

    /// Insert an entry whose ids are already known; returns its order
    pub fn insert_entry(
        &self,
        new: NewEntry,
        position: Option<usize>,
    ) -> Result<usize, SessionError> {
        self.edit(|session| {
            let order = session.mods.insert_entry(new, position)?;
            session.dirty = true;
            Ok((order, vec![SessionChange::List(ListChange::Added { order })]))
        })
    }

    pub fn remove_entry(&self, order: usize) -> Result<ModEntry, SessionError> {
        self.edit(|session| {
            let entry = session.mods.remove_entry(order)?;
            session.dirty = true;
            let change = SessionChange::List(ListChange::Removed {
                order,
                entry: entry.clone(),
            });
            Ok((entry, vec![change]))
        })
    }

    pub fn move_entry(&self, from: usize, to: usize) -> Result<bool, SessionError> {
        self.edit(|session| {
            if !session.mods.move_entry(from, to)? {
                return Ok((false, Vec::new()));
            }
            session.dirty = true;
            Ok((true, vec![SessionChange::List(ListChange::Moved { from, to })]))
        })
    }

    /// Enable or disable an entry and persist the sidecar right away.
    ///
    /// If the sidecar cannot be written the toggle is reverted.
    pub fn set_enabled(&self, order: usize, enabled: bool) -> Result<bool, SessionError> {
        self.edit(|session| {
            if !session.mods.set_enabled(order, enabled)? {
                return Ok((false, Vec::new()));
            }
            if let Err(e) = session.store.save(&session.mods.disabled_state()) {
                session.mods.set_enabled(order, !enabled)?;
                return Err(e.into());
            }
            session.dirty = true;
            Ok((true, vec![SessionChange::List(ListChange::Updated { order })]))
        })
    }

    /// Enable or disable every entry, persisting the sidecar; returns how many changed
    pub fn set_all_enabled(&self, enabled: bool) -> Result<usize, SessionError> {
        self.edit(|session| {
            let changed = session.mods.set_all_enabled(enabled);
            if changed.is_empty() {
                return Ok((0, Vec::new()));
            }
            if let Err(e) = session.store.save(&session.mods.disabled_state()) {
                for &order in &changed {
                    session.mods.set_enabled(order, !enabled)?;
                }
                return Err(e.into());
            }
            session.dirty = true;
            let changes = changed
                .iter()
                .map(|&order| SessionChange::List(ListChange::Updated { order }))
                .collect();
            Ok((changed.len(), changes))
        })
    }

    pub fn set_mod_id(&self, order: usize, mod_id: &str) -> Result<bool, SessionError> {
        self.edit(|session| {
            if !session.mods.set_mod_id(order, mod_id)? {
                return Ok((false, Vec::new()));
            }
            session.dirty = true;
            Ok((true, vec![SessionChange::List(ListChange::Updated { order })]))
        })
    }

    // Server settings

    pub fn settings(&self) -> Result<Vec<ServerSetting>, SessionError> {
        self.read(|session| session.document.settings())
    }

    /// Set a scalar server setting.
    ///
    /// Known keys are checked against their inferred type and comment bounds;
    /// the mod list keys can only be changed through list edits.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<bool, SessionError> {
        self.edit(|session| {
            let invalid = || SessionError::InvalidSetting {
                key: key.to_string(),
                value: value.to_string(),
            };

            if MOD_LIST_KEYS.contains(&key) {
                return Err(invalid());
            }
            if let Some(setting) = session.document.settings().iter().find(|s| s.key == key) {
                if !setting.accepts(value) {
                    return Err(invalid());
                }
            }
            if session.document.get_scalar(key) == Some(value) {
                return Ok((false, Vec::new()));
            }

            session.document.set_scalar(key, value);
            session.dirty = true;
            tracing::debug!("Set {}={}", key, value);
            Ok((true, Vec::new()))
        })
    }

    // Background results

    /// Apply workshop names resolved for `generation`.
    ///
    /// Stale results are dropped; names for removed workshop ids are no-ops.
    pub fn apply_lookup(&self, generation: u64, lookup: &LookupResult) -> Vec<SessionChange> {
        let changes = {
            let mut guard = self.session.write().unwrap();
            let Some(session) = guard.as_mut().filter(|s| s.generation == generation) else {
                tracing::debug!("Discarding name lookup for stale generation {}", generation);
                return Vec::new();
            };

            let report = session.mods.enrich(lookup, &ScanResult::default());
            let mut changes: Vec<_> = report
                .changes()
                .into_iter()
                .map(SessionChange::List)
                .collect();
            changes.push(SessionChange::NamesResolved {
                applied: report.names_applied,
            });
            changes
        };

        self.emit(&changes);
        changes
    }

    /// Apply a workshop scan completed for `generation`.
    pub fn apply_scan(&self, generation: u64, scan: &ScanResult) -> Vec<SessionChange> {
        let changes = {
            let mut guard = self.session.write().unwrap();
            let Some(session) = guard.as_mut().filter(|s| s.generation == generation) else {
                tracing::debug!("Discarding workshop scan for stale generation {}", generation);
                return Vec::new();
            };

            let report = session.mods.enrich(&LookupResult::new(), scan);
            if report.mod_ids_filled + report.workshop_ids_filled > 0 {
                session.dirty = true;
            }

            let mut changes: Vec<_> = report
                .changes()
                .into_iter()
                .map(SessionChange::List)
                .collect();
            changes.push(SessionChange::ScanApplied {
                mod_ids_filled: report.mod_ids_filled,
                workshop_ids_filled: report.workshop_ids_filled,
                names_applied: report.names_applied,
            });
            changes
        };

        self.emit(&changes);
        changes
    }

    /// Resolve display names for unnamed workshop ids in the background.
    ///
    /// Returns `None` when no session is open or nothing needs resolving. A
    /// failed lookup leaves names unset and emits [`SessionChange::LookupFailed`].
    pub fn spawn_name_lookup(
        &self,
        handle: &Handle,
        lookup: Arc<dyn WorkshopLookup>,
    ) -> Option<JoinHandle<()>> {
        let (generation, workshop_ids) = {
            let guard = self.session.read().unwrap();
            let session = guard.as_ref()?;
            (session.generation, session.mods.unresolved_workshop_ids())
        };
        if workshop_ids.is_empty() {
            return None;
        }

        tracing::debug!(
            "Looking up {} workshop names for generation {}",
            workshop_ids.len(),
            generation
        );

        let manager = self.clone();
        Some(handle.spawn(async move {
            match lookup.fetch_names(&workshop_ids).await {
                Ok(result) => {
                    manager.apply_lookup(generation, &result);
                }
                Err(e) => {
                    tracing::warn!("Workshop name lookup failed: {}", e);
                    manager.emit(&[SessionChange::LookupFailed {
                        message: e.to_string(),
                    }]);
                }
            }
        }))
    }

    /// Scan local workshop content on the blocking pool and apply the result.
    ///
    /// Starting a scan cancels the previous one. A cancelled scan, or one that
    /// finishes after the session changed, is discarded.
    pub fn spawn_scan(&self, handle: &Handle, root: Utf8PathBuf) -> Option<JoinHandle<()>> {
        let generation = self.generation()?;

        let token = CancellationToken::new();
        if let Some(previous) = self.scan_token.lock().unwrap().replace(token.clone()) {
            previous.cancel();
        }

        let manager = self.clone();
        Some(handle.spawn(async move {
            let scan = tokio::task::spawn_blocking(move || try_scan_workshop_content(&root));

            let outcome = tokio::select! {
                _ = token.cancelled() => Err(ScanError::Cancelled),
                joined = scan => match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!("Workshop scan task failed: {}", e);
                        return;
                    }
                },
            };

            match outcome {
                Ok(mods) if !token.is_cancelled() => {
                    manager.apply_scan(generation, &ScanResult::from_mods(&mods));
                }
                Ok(_) | Err(ScanError::Cancelled) => {
                    tracing::debug!("Workshop scan for generation {} cancelled", generation);
                }
                Err(e) => {
                    tracing::warn!("Workshop scan failed: {}", e);
                    manager.emit(&[SessionChange::ScanFailed {
                        message: e.to_string(),
                    }]);
                }
            }
        }))
    }

    /// Cancel the in-flight workshop scan, if any
    pub fn cancel_scan(&self) {
        if let Some(token) = self.scan_token.lock().unwrap().take() {
            token.cancel();
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

// Clones share the session, counters and event channel
impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            generation: Arc::clone(&self.generation),
            scan_token: Arc::clone(&self.scan_token),
            change_tx: self.change_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_manager(contents: &str) -> (SessionManager, TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let path = dir.join("servertest.ini");
        fs::write(&path, contents).unwrap();

        let manager = SessionManager::new();
        manager.open(&path).unwrap();
        (manager, temp_dir, path)
    }

    #[test]
    fn test_new_manager_has_no_session() {
        let manager = SessionManager::new();
        assert!(!manager.is_open());
        assert!(manager.generation().is_none());
        assert!(matches!(manager.entries(), Err(SessionError::NotOpen)));
        assert!(manager.close().is_empty());
    }

    #[test]
    fn test_open_emits_events() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let path = dir.join("servertest.ini");
        fs::write(&path, "Mods=\\A;\\B\nWorkshopItems=1;2\n").unwrap();

        let manager = SessionManager::new();
        let mut rx = manager.subscribe();
        let changes = manager.open(&path).unwrap();

        assert_eq!(changes.len(), 2);
        assert!(matches!(changes[0], SessionChange::Opened { generation: 1, .. }));
        assert_eq!(changes[1], SessionChange::List(ListChange::Reset { len: 2 }));
        assert!(matches!(rx.try_recv().unwrap(), SessionChange::Opened { .. }));
    }

    #[test]
    fn test_open_missing_file_fails() {
        let manager = SessionManager::new();
        assert!(manager.open(Utf8Path::new("/nonexistent/servertest.ini")).is_err());
        assert!(!manager.is_open());
    }

    #[test]
    fn test_edits_mark_dirty_and_save_clears() {
        let (manager, _temp, path) = open_manager("Mods=\\A\nWorkshopItems=1\n");
        assert!(!manager.is_dirty());

        let order = manager.add_entry("2", None).unwrap();
        assert_eq!(order, 1);
        assert!(manager.is_dirty());

        manager.set_mod_id(1, "B").unwrap();
        manager.save().unwrap();

        assert!(!manager.is_dirty());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Mods=\\A;\\B\nWorkshopItems=1;2\n"
        );
    }

    #[test]
    fn test_set_enabled_persists_sidecar_immediately() {
        let (manager, _temp, path) = open_manager("Mods=\\A;\\B\nWorkshopItems=1;2\n");

        assert!(manager.set_enabled(1, false).unwrap());
        let store = DisabledStore::for_config(&path);
        assert!(store.load().disabled_mods.iter().any(|m| m.mod_id == "B"));

        // The configuration file itself is untouched until save
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Mods=\\A;\\B\nWorkshopItems=1;2\n"
        );
        assert!(!manager.set_enabled(1, false).unwrap());
    }

    #[test]
    fn test_rejected_edit_emits_nothing() {
        let (manager, _temp, _path) = open_manager("Mods=\\A\nWorkshopItems=1\n");
        let mut rx = manager.subscribe();

        let err = manager
            .insert_entry(NewEntry::workshop("1").with_mod_id("A"), None)
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Edit(ReconcileError::DuplicateEntry { .. })
        ));
        assert!(rx.try_recv().is_err());
        assert!(!manager.is_dirty());
    }

    #[test]
    fn test_set_setting_validates_bounds() {
        let (manager, _temp, _path) = open_manager(
            "# Max players. Min: 1 Max: 32 Default: 16\nMaxPlayers=16\nMods=\\A\n",
        );

        assert!(manager.set_setting("MaxPlayers", "20").unwrap());
        assert!(!manager.set_setting("MaxPlayers", "20").unwrap());
        assert!(matches!(
            manager.set_setting("MaxPlayers", "64"),
            Err(SessionError::InvalidSetting { .. })
        ));
        assert!(matches!(
            manager.set_setting("Mods", "\\X"),
            Err(SessionError::InvalidSetting { .. })
        ));
        // Unknown keys are written as is
        assert!(manager.set_setting("NewKey", "x").unwrap());
    }

    #[test]
    fn test_stale_lookup_discarded_after_reopen() {
        let (manager, _temp, path) = open_manager("Mods=\\A\nWorkshopItems=1\n");
        let stale = manager.generation().unwrap();
        manager.open(&path).unwrap();

        let lookup: LookupResult = [("1", "Mod A")].into_iter().collect();
        assert!(manager.apply_lookup(stale, &lookup).is_empty());

        let current = manager.generation().unwrap();
        let changes = manager.apply_lookup(current, &lookup);
        assert!(changes.contains(&SessionChange::NamesResolved { applied: 1 }));
        assert_eq!(
            manager.entries().unwrap()[0].display_name.as_deref(),
            Some("Mod A")
        );
    }

    #[test]
    fn test_apply_scan_fills_ids_and_marks_dirty() {
        let (manager, _temp, _path) = open_manager("WorkshopItems=1\n");
        let generation = manager.generation().unwrap();

        let mut scan = ScanResult::default();
        scan.insert("1", "ModA", "Mod A");
        let changes = manager.apply_scan(generation, &scan);

        assert!(changes.contains(&SessionChange::ScanApplied {
            mod_ids_filled: 1,
            workshop_ids_filled: 0,
            names_applied: 1,
        }));
        assert!(manager.is_dirty());
        assert_eq!(manager.entries().unwrap()[0].mod_id, "ModA");
    }

    #[test]
    fn test_close_invalidates_generation() {
        let (manager, _temp, _path) = open_manager("Mods=\\A\n");
        let generation = manager.generation().unwrap();

        assert_eq!(manager.close(), vec![SessionChange::Closed]);
        assert!(manager.apply_scan(generation, &ScanResult::default()).is_empty());
    }

    #[test]
    fn test_clone_shares_session() {
        let (manager, _temp, _path) = open_manager("Mods=\\A\n");
        let other = manager.clone();

        other.remove_entry(0).unwrap();
        assert!(manager.entries().unwrap().is_empty());
    }
}
