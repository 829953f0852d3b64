//! Local Steam Workshop content scanner.
//!
//! Downloaded workshop items live under `<workshop>/content/108600/<workshop id>/`
//! and contain one directory per mod under `mods/`. Each mod directory holds a
//! `mod.info` file, optionally duplicated in version subdirectories
//! (`42/`, `42.13/`, ...) for B42+ builds:
//!
//! ```text
//! content/108600/2875848298/mods/Hydrocraft/mod.info
//! content/108600/2875848298/mods/Hydrocraft/42/mod.info
//! ```
//!
//! The scanner maps workshop ids to the mod ids they provide so that entries
//! known from only one side of the `Mods=` / `WorkshopItems=` pair can be
//! completed.

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs;
use thiserror::Error;
use walkdir::WalkDir;

/// Steam app id of Project Zomboid.
pub const PZ_APP_ID: &str = "108600";

const MOD_INFO_FILE: &str = "mod.info";

/// Errors that can occur while scanning workshop content
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("No workshop content directory found under {0}")]
    ContentDirNotFound(Utf8PathBuf),

    #[error("Failed to read workshop directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Scan cancelled")]
    Cancelled,
}

/// A single mod found inside a workshop item's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkshopModInfo {
    pub mod_id: String,
    pub name: String,
    pub workshop_id: String,
}

/// A mod provided by a workshop item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedMod {
    pub mod_id: String,
    pub name: String,
}

/// Indexed scan results: workshop id -> mods, and mod id -> workshop id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    by_workshop: IndexMap<String, Vec<ScannedMod>>,
    by_mod: IndexMap<String, String>,
}

impl ScanResult {
    pub fn from_mods(mods: &[WorkshopModInfo]) -> Self {
        let mut result = Self::default();
        for info in mods {
            result.insert(&info.workshop_id, &info.mod_id, &info.name);
        }
        result
    }

    pub fn insert(&mut self, workshop_id: &str, mod_id: &str, name: &str) {
        self.by_workshop
            .entry(workshop_id.to_string())
            .or_default()
            .push(ScannedMod {
                mod_id: mod_id.to_string(),
                name: name.to_string(),
            });
        self.by_mod
            .insert(mod_id.to_string(), workshop_id.to_string());
    }

    /// Mods provided by a workshop item, in scan order.
    pub fn mods_for(&self, workshop_id: &str) -> &[ScannedMod] {
        self.by_workshop
            .get(workshop_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Workshop item providing `mod_id`.
    ///
    /// Server files sometimes escape characters in mod ids (`\&`), so a miss is
    /// retried with backslashes removed.
    pub fn workshop_for(&self, mod_id: &str) -> Option<&str> {
        self.by_mod
            .get(mod_id)
            .or_else(|| self.by_mod.get(&mod_id.replace('\\', "")))
            .map(String::as_str)
    }

    /// `mod.info` name of a scanned mod.
    pub fn name_for(&self, workshop_id: &str, mod_id: &str) -> Option<&str> {
        self.mods_for(workshop_id)
            .iter()
            .find(|m| m.mod_id == mod_id)
            .map(|m| m.name.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn workshop_count(&self) -> usize {
        self.by_workshop.len()
    }

    pub fn mod_count(&self) -> usize {
        self.by_workshop.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_workshop.is_empty()
    }
}

/// Find the `content/108600` directory from the app directory itself, from
/// `content/`, or from the workshop root.
pub fn resolve_content_dir(path: &Utf8Path) -> Option<Utf8PathBuf> {
    if path.file_name() == Some(PZ_APP_ID) && path.is_dir() {
        return Some(path.to_path_buf());
    }

    [path.join(PZ_APP_ID), path.join("content").join(PZ_APP_ID)]
        .into_iter()
        .find(|candidate| candidate.is_dir())
}

/// Scan a workshop directory, failing if no content directory can be found.
pub fn try_scan_workshop_content(path: &Utf8Path) -> Result<Vec<WorkshopModInfo>, ScanError> {
    let content_dir =
        resolve_content_dir(path).ok_or_else(|| ScanError::ContentDirNotFound(path.to_path_buf()))?;

    let mut results = Vec::new();

    for item in child_dirs(&content_dir)? {
        let Some(workshop_id) = item.file_name().filter(|n| is_numeric(n)) else {
            continue;
        };

        let mods_dir = item.join("mods");
        if !mods_dir.is_dir() {
            continue;
        }

        let mod_dirs = match child_dirs(&mods_dir) {
            Ok(dirs) => dirs,
            Err(e) => {
                tracing::warn!("Skipping workshop item {}: {}", workshop_id, e);
                continue;
            }
        };

        for mod_dir in mod_dirs {
            if let Some((mod_id, name)) = find_best_mod_info(&mod_dir) {
                results.push(WorkshopModInfo {
                    mod_id,
                    name,
                    workshop_id: workshop_id.to_string(),
                });
            }
        }
    }

    tracing::info!("Scanned {} mods under {}", results.len(), content_dir);
    Ok(results)
}

/// Scan a workshop directory; missing or unreadable paths give an empty result.
pub fn scan_workshop_content(path: &Utf8Path) -> Vec<WorkshopModInfo> {
    try_scan_workshop_content(path).unwrap_or_else(|e| {
        tracing::warn!("Workshop scan of {} failed: {}", path, e);
        Vec::new()
    })
}

/// Immediate subdirectories of `dir`, sorted by name.
///
/// Fails only when `dir` itself cannot be read. Unreadable children and non
/// UTF-8 names are skipped.
fn child_dirs(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ScanError> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {}: {}", dir, e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        match Utf8PathBuf::from_path_buf(entry.into_path()) {
            Ok(path) => dirs.push(path),
            Err(path) => tracing::debug!("Skipping non UTF-8 path: {}", path.display()),
        }
    }
    Ok(dirs)
}

fn is_numeric(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

/// Dotted numeric version of a directory name (`42.13` -> `[42, 13]`).
fn parse_version(name: &str) -> Option<Vec<u32>> {
    name.split('.').map(|part| part.parse().ok()).collect()
}

/// Pick the `mod.info` of a mod directory: the highest version subdirectory
/// first, then the root file, then any other subdirectory.
fn find_best_mod_info(mod_dir: &Utf8Path) -> Option<(String, String)> {
    let mut versioned: Vec<(Vec<u32>, Utf8PathBuf)> = Vec::new();
    let mut others: Vec<Utf8PathBuf> = Vec::new();

    let subdirs = child_dirs(mod_dir).unwrap_or_else(|e| {
        tracing::warn!("Cannot list {}: {}", mod_dir, e);
        Vec::new()
    });

    for sub in subdirs {
        let info = sub.join(MOD_INFO_FILE);
        if !info.is_file() {
            continue;
        }
        match sub.file_name().and_then(parse_version) {
            Some(version) => versioned.push((version, info)),
            None => others.push(info),
        }
    }

    // Highest version first
    versioned.sort_by(|a, b| b.0.cmp(&a.0));

    let root = mod_dir.join(MOD_INFO_FILE);
    let candidates = versioned
        .into_iter()
        .map(|(_, path)| path)
        .chain(root.is_file().then_some(root))
        .chain(others);

    candidates.into_iter().find_map(|path| parse_mod_info(&path))
}

/// Read `id=` and `name=` from a `mod.info` file.
pub fn parse_mod_info(path: &Utf8Path) -> Option<(String, String)> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!("Failed to read {}: {}", path, e);
            return None;
        }
    };
    let text = String::from_utf8_lossy(&bytes);

    let mut mod_id = String::new();
    let mut name = String::new();
    for line in text.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("id=") {
            mod_id = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("name=") {
            name = value.trim().to_string();
        }
    }

    (!mod_id.is_empty()).then_some((mod_id, name))
}
