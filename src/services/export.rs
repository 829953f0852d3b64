//! Mod list values for Docker environment variables.
//!
//! Container images for dedicated servers take the mod list through env vars
//! (`MOD_IDS`, `WORKSHOP_IDS`). The shell layer of those images unescapes one
//! level of backslashes, so mod ids are written with a double backslash prefix
//! to arrive as the B42 `\ModA` form inside the container.

use crate::models::ModEntry;
use indexmap::IndexSet;

/// Escape one mod id: `&` becomes `\&`, and the id gets a `\\` prefix.
pub fn escape_docker_mod_id(mod_id: &str) -> String {
    format!("\\\\{}", mod_id.replace('&', "\\&"))
}

/// Enabled mod ids, escaped and joined by `;`.
pub fn docker_mods_value<'a>(entries: impl IntoIterator<Item = &'a ModEntry>) -> String {
    entries
        .into_iter()
        .filter(|e| e.enabled && e.has_mod_id())
        .map(|e| escape_docker_mod_id(&e.mod_id))
        .collect::<Vec<_>>()
        .join(";")
}

/// Enabled workshop ids, first occurrence kept, joined by `;`.
pub fn docker_workshop_value<'a>(entries: impl IntoIterator<Item = &'a ModEntry>) -> String {
    let ids: IndexSet<&str> = entries
        .into_iter()
        .filter(|e| e.enabled)
        .filter_map(|e| e.workshop_id.as_deref())
        .collect();
    ids.into_iter().collect::<Vec<_>>().join(";")
}
