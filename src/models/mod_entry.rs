use serde::{Deserialize, Serialize};

/// One row of the managed mod list.
///
/// Pairs an entry of the `Mods=` list with at most one entry of the
/// `WorkshopItems=` list. `order` always equals the entry's position inside its
/// [`ModList`](crate::services::ModList); the list renumbers after every edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModEntry {
    /// Identifier from the `Mods=` list, without the B42 backslash prefix.
    /// Empty while only the workshop side is known.
    pub mod_id: String,

    /// Numeric Steam Workshop identifier.
    pub workshop_id: Option<String>,

    /// Human readable name, filled in by a workshop lookup or scan.
    pub display_name: Option<String>,

    /// Disabled entries stay in the list but are left out of the written lists.
    pub enabled: bool,

    /// Position in the list, contiguous from 0.
    pub order: usize,
}

impl ModEntry {
    pub fn new(mod_id: impl Into<String>, workshop_id: Option<String>) -> Self {
        Self {
            mod_id: mod_id.into(),
            workshop_id,
            display_name: None,
            enabled: true,
            order: 0,
        }
    }

    /// True if the entry carries the given identifier pair.
    pub fn has_pair(&self, mod_id: &str, workshop_id: Option<&str>) -> bool {
        self.mod_id == mod_id && self.workshop_id.as_deref() == workshop_id
    }

    pub fn has_mod_id(&self) -> bool {
        !self.mod_id.is_empty()
    }

    /// Name to show in listings: display name, then mod id, then workshop id.
    pub fn label(&self) -> &str {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.is_empty()) {
            return name;
        }
        if self.has_mod_id() {
            return &self.mod_id;
        }
        self.workshop_id.as_deref().unwrap_or("")
    }
}

/// Input for a manual insertion where both sides may already be known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewEntry {
    pub mod_id: String,
    pub workshop_id: Option<String>,
    pub display_name: Option<String>,
}

impl NewEntry {
    pub fn workshop(workshop_id: impl Into<String>) -> Self {
        Self {
            workshop_id: Some(workshop_id.into()),
            ..Self::default()
        }
    }

    pub fn with_mod_id(mut self, mod_id: impl Into<String>) -> Self {
        self.mod_id = mod_id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.display_name = (!name.is_empty()).then_some(name);
        self
    }
}
