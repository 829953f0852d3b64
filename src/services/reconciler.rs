//! Mod list reconciliation.
//!
//! Project Zomboid keeps two parallel lists in the server configuration:
//! `Mods=` (mod ids) and `WorkshopItems=` (Steam Workshop ids). [`ModList`]
//! turns them into one ordered collection of [`ModEntry`] rows and back.
//!
//! # Pairing
//!
//! [`ModList::build`] pairs the lists by index. When the lengths differ, as many
//! entries as possible are paired and the rest of the longer list becomes
//! entries with the other side unset. Hand-edited files whose lists drifted out
//! of sync still load; [`ModList::enrich`] can complete them from a workshop
//! scan later.
//!
//! # Invariants
//!
//! - `order` equals the position of each entry and runs `0..len`
//! - no two entries carry the same `(mod_id, workshop_id)` pair
//! - no entry has both ids empty
//!
//! Every mutation returns a [`ListChange`] describing what happened so that a
//! front end can update incrementally.

use crate::models::{ModEntry, NewEntry};
use crate::services::disabled_store::DisabledState;
use crate::services::document::ConfigDocument;
use crate::services::identifier::{extract_workshop_id, is_workshop_id};
use crate::services::workshop_lookup::LookupResult;
use crate::services::workshop_scanner::ScanResult;
use indexmap::IndexSet;
use thiserror::Error;

/// Errors for rejected edits. The list is unchanged when one is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("No workshop id found in '{0}'")]
    InvalidIdentifier(String),

    #[error("'{mod_id}' / '{workshop_id}' is already in the list at position {order}")]
    DuplicateEntry {
        mod_id: String,
        workshop_id: String,
        order: usize,
    },

    #[error("An entry needs a mod id or a workshop id")]
    EmptyEntry,

    #[error("No entry at position {order} (list has {len})")]
    OrderOutOfRange { order: usize, len: usize },
}

/// Change notifications emitted by list mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListChange {
    /// The whole list was replaced
    Reset { len: usize },

    Added { order: usize },

    Removed { order: usize, entry: ModEntry },

    Moved { from: usize, to: usize },

    /// Fields of an entry changed in place
    Updated { order: usize },
}

/// What an [`ModList::enrich`] call filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub names_applied: usize,
    pub mod_ids_filled: usize,
    pub workshop_ids_filled: usize,
    /// Fills skipped because they would have duplicated another entry
    pub duplicates_skipped: usize,
    /// Orders of the entries that changed
    pub updated: Vec<usize>,
}

impl EnrichReport {
    pub fn has_changes(&self) -> bool {
        !self.updated.is_empty()
    }

    pub fn changes(&self) -> Vec<ListChange> {
        self.updated
            .iter()
            .map(|&order| ListChange::Updated { order })
            .collect()
    }
}

/// Ordered, deduplicated collection of mod entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModList {
    entries: Vec<ModEntry>,
}

impl ModList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from entries, renumbering them.
    pub fn from_entries(entries: Vec<ModEntry>) -> Self {
        let mut list = Self { entries };
        list.renumber();
        list
    }

    /// Build the list from a configuration document and its disabled state.
    ///
    /// Entries matching a disabled record are marked disabled.
    /// Disabled records that are no longer in the configuration (a previous
    /// save left them out) are put back at their recorded position.
    pub fn build(document: &ConfigDocument, disabled: &DisabledState) -> Self {
        let mod_ids = document.mod_ids();
        let workshop_ids = document.workshop_ids();

        if !mod_ids.is_empty() && !workshop_ids.is_empty() && mod_ids.len() != workshop_ids.len() {
            tracing::warn!(
                "Mods= has {} entries but WorkshopItems= has {}; pairing by position",
                mod_ids.len(),
                workshop_ids.len()
            );
        }

        let mut list = Self::new();
        let len = mod_ids.len().max(workshop_ids.len());

        for i in 0..len {
            let mod_id = mod_ids.get(i).cloned().unwrap_or_default();
            let workshop_id = workshop_ids.get(i).cloned();

            if let Some(order) = list.find_pair(&mod_id, workshop_id.as_deref()) {
                tracing::debug!(
                    "Dropping duplicate pair {}/{:?} (already at {})",
                    mod_id,
                    workshop_id,
                    order
                );
                continue;
            }

            let mut entry = ModEntry::new(mod_id, workshop_id);
            entry.enabled = !disabled.matches(&entry);
            list.entries.push(entry);
        }

        let mut restored: Vec<_> = disabled
            .disabled_mods
            .iter()
            .filter(|record| !record.is_empty())
            .filter(|record| !list.entries.iter().any(|e| record.matches(e)))
            .collect();
        restored.sort_by_key(|record| record.position.unwrap_or(usize::MAX));

        for record in restored {
            let entry = record.to_entry();
            if list.find_pair(&entry.mod_id, entry.workshop_id.as_deref()).is_some() {
                continue;
            }
            let position = record
                .position
                .unwrap_or(list.entries.len())
                .min(list.entries.len());
            list.entries.insert(position, entry);
        }

        list.renumber();

        tracing::info!(
            "Built mod list: {} entries ({} disabled)",
            list.len(),
            list.disabled_count()
        );
        list
    }

    fn renumber(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.order = i;
        }
    }

    fn check_order(&self, order: usize) -> Result<(), ReconcileError> {
        if order < self.entries.len() {
            Ok(())
        } else {
            Err(ReconcileError::OrderOutOfRange {
                order,
                len: self.entries.len(),
            })
        }
    }

    pub fn entries(&self) -> &[ModEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModEntry> {
        self.entries.iter()
    }

    pub fn get(&self, order: usize) -> Option<&ModEntry> {
        self.entries.get(order)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.entries.iter().filter(|e| e.enabled).count()
    }

    pub fn disabled_count(&self) -> usize {
        self.len() - self.enabled_count()
    }

    /// Order of the entry carrying this exact pair.
    pub fn find_pair(&self, mod_id: &str, workshop_id: Option<&str>) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.has_pair(mod_id, workshop_id))
    }

    /// True if any entry, enabled or not, uses `mod_id`.
    pub fn contains_mod_id(&self, mod_id: &str) -> bool {
        !mod_id.is_empty() && self.entries.iter().any(|e| e.mod_id == mod_id)
    }

    /// Workshop ids of entries still lacking a display name, deduplicated.
    pub fn unresolved_workshop_ids(&self) -> Vec<String> {
        let ids: IndexSet<&str> = self
            .entries
            .iter()
            .filter(|e| e.display_name.is_none())
            .filter_map(|e| e.workshop_id.as_deref())
            .collect();
        ids.into_iter().map(str::to_string).collect()
    }

    /// Fill empty fields from a name lookup and a workshop scan.
    ///
    /// Populated fields are never overwritten, and results for workshop ids
    /// that are no longer in the list have no effect. A fill that would
    /// duplicate another entry's pair is skipped.
    pub fn enrich(&mut self, lookup: &LookupResult, scan: &ScanResult) -> EnrichReport {
        let mut report = EnrichReport::default();

        for i in 0..self.entries.len() {
            let mut changed = false;

            // Mod id from the workshop item's scanned mods
            if !self.entries[i].has_mod_id() {
                if let Some(workshop_id) = self.entries[i].workshop_id.clone() {
                    let candidates = scan.mods_for(&workshop_id);
                    // A mod id already in the list would be written to Mods= twice
                    let free = candidates.iter().find(|m| !self.contains_mod_id(&m.mod_id));
                    match free {
                        Some(scanned) => {
                            self.entries[i].mod_id = scanned.mod_id.clone();
                            report.mod_ids_filled += 1;
                            changed = true;
                        }
                        None if !candidates.is_empty() => report.duplicates_skipped += 1,
                        None => {}
                    }
                }
            }

            // Workshop id from the reverse index
            if self.entries[i].workshop_id.is_none() && self.entries[i].has_mod_id() {
                let mod_id = self.entries[i].mod_id.clone();
                if let Some(workshop_id) = scan.workshop_for(&mod_id) {
                    if self.find_pair(&mod_id, Some(workshop_id)).is_some() {
                        report.duplicates_skipped += 1;
                    } else {
                        self.entries[i].workshop_id = Some(workshop_id.to_string());
                        report.workshop_ids_filled += 1;
                        changed = true;
                    }
                }
            }

            // Display name: lookup first, then the scanned mod.info name
            let entry = &self.entries[i];
            if entry.display_name.is_none() {
                if let Some(workshop_id) = entry.workshop_id.as_deref() {
                    let name = lookup
                        .get(workshop_id)
                        .filter(|n| !n.is_empty())
                        .or_else(|| scan.name_for(workshop_id, &entry.mod_id))
                        .map(str::to_string);
                    if let Some(name) = name {
                        self.entries[i].display_name = Some(name);
                        report.names_applied += 1;
                        changed = true;
                    }
                }
            }

            if changed {
                report.updated.push(i);
            }
        }

        if report.has_changes() {
            tracing::debug!(
                "Enriched mod list: {} names, {} mod ids, {} workshop ids, {} duplicates skipped",
                report.names_applied,
                report.mod_ids_filled,
                report.workshop_ids_filled,
                report.duplicates_skipped
            );
        }
        report
    }

    /// Add an entry from a workshop id or a pasted workshop URL.
    ///
    /// Inserts at `position` (default: end). Returns the new entry's order.
    pub fn add_entry(
        &mut self,
        id_or_url: &str,
        position: Option<usize>,
    ) -> Result<usize, ReconcileError> {
        let workshop_id = extract_workshop_id(id_or_url)
            .ok_or_else(|| ReconcileError::InvalidIdentifier(id_or_url.trim().to_string()))?;
        self.insert_entry(NewEntry::workshop(workshop_id), position)
    }

    /// Insert an entry whose ids are already known.
    ///
    /// Adding a pair that is already present is rejected with
    /// [`ReconcileError::DuplicateEntry`].
    pub fn insert_entry(
        &mut self,
        new: NewEntry,
        position: Option<usize>,
    ) -> Result<usize, ReconcileError> {
        let mod_id = new.mod_id.trim().trim_start_matches('\\').to_string();
        let workshop_id = new
            .workshop_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        if let Some(id) = &workshop_id {
            if !is_workshop_id(id) {
                return Err(ReconcileError::InvalidIdentifier(id.clone()));
            }
        }
        if mod_id.is_empty() && workshop_id.is_none() {
            return Err(ReconcileError::EmptyEntry);
        }
        if let Some(order) = self.find_pair(&mod_id, workshop_id.as_deref()) {
            return Err(ReconcileError::DuplicateEntry {
                mod_id,
                workshop_id: workshop_id.unwrap_or_default(),
                order,
            });
        }

        let order = position.unwrap_or(self.entries.len()).min(self.entries.len());
        let mut entry = ModEntry::new(mod_id, workshop_id);
        entry.display_name = new.display_name.filter(|n| !n.is_empty());
        self.entries.insert(order, entry);
        self.renumber();

        tracing::debug!("Added entry at {}", order);
        Ok(order)
    }

    /// Remove the entry at `order`; later entries move up by one.
    pub fn remove_entry(&mut self, order: usize) -> Result<ModEntry, ReconcileError> {
        self.check_order(order)?;
        let entry = self.entries.remove(order);
        self.renumber();
        tracing::debug!("Removed entry {} ({})", order, entry.label());
        Ok(entry)
    }

    /// Move the entry at `from` to `to`, shifting the entries in between.
    ///
    /// Returns false when `from == to`.
    pub fn move_entry(&mut self, from: usize, to: usize) -> Result<bool, ReconcileError> {
        self.check_order(from)?;
        self.check_order(to)?;
        if from == to {
            return Ok(false);
        }

        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);
        self.renumber();
        Ok(true)
    }

    /// Set the enabled flag. Returns whether it changed.
    pub fn set_enabled(&mut self, order: usize, enabled: bool) -> Result<bool, ReconcileError> {
        self.check_order(order)?;
        let entry = &mut self.entries[order];
        let changed = entry.enabled != enabled;
        entry.enabled = enabled;
        Ok(changed)
    }

    /// Enable or disable every entry. Returns the orders that changed.
    pub fn set_all_enabled(&mut self, enabled: bool) -> Vec<usize> {
        self.entries
            .iter_mut()
            .filter(|e| e.enabled != enabled)
            .map(|e| {
                e.enabled = enabled;
                e.order
            })
            .collect()
    }

    /// Replace the mod id of an entry, keeping pairs unique.
    pub fn set_mod_id(&mut self, order: usize, mod_id: &str) -> Result<bool, ReconcileError> {
        self.check_order(order)?;
        let mod_id = mod_id.trim().trim_start_matches('\\');
        let workshop_id = self.entries[order].workshop_id.clone();

        if self.entries[order].mod_id == mod_id {
            return Ok(false);
        }
        if mod_id.is_empty() && workshop_id.is_none() {
            return Err(ReconcileError::EmptyEntry);
        }
        if let Some(existing) = self.find_pair(mod_id, workshop_id.as_deref()) {
            return Err(ReconcileError::DuplicateEntry {
                mod_id: mod_id.to_string(),
                workshop_id: workshop_id.unwrap_or_default(),
                order: existing,
            });
        }

        self.entries[order].mod_id = mod_id.to_string();
        Ok(true)
    }

    /// The two lists to write back, in order, without disabled entries.
    ///
    /// Empty mod ids are skipped. Workshop ids are deduplicated keeping the
    /// first occurrence, since one workshop item can provide several mods.
    pub fn to_lists(&self) -> (Vec<String>, Vec<String>) {
        let enabled = self.entries.iter().filter(|e| e.enabled);

        let mod_ids = enabled
            .clone()
            .filter(|e| e.has_mod_id())
            .map(|e| e.mod_id.clone())
            .collect();

        let workshop_ids: IndexSet<&str> = enabled
            .filter_map(|e| e.workshop_id.as_deref())
            .collect();

        (
            mod_ids,
            workshop_ids.into_iter().map(str::to_string).collect(),
        )
    }

    /// Disabled entries as they are stored in the sidecar.
    pub fn disabled_state(&self) -> DisabledState {
        DisabledState::from_entries(&self.entries)
    }
}
