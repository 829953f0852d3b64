use serde::{Deserialize, Serialize};

/// Maximum number of entries kept in the recent files list.
pub const MAX_RECENT_FILES: usize = 10;

/// User preferences from `PZ Mod Manager.yaml`
///
/// Contains the Steam API key, the local workshop path used by the scanner,
/// and the recently opened server configuration files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Steam Web API key used for workshop name lookups.
    #[serde(rename = "Steam API Key", default)]
    pub steam_api_key: String,

    /// Steam workshop directory holding downloaded mods.
    #[serde(rename = "Workshop Path", default)]
    pub workshop_path: String,

    #[serde(rename = "Last INI Path", default)]
    pub last_ini_path: String,

    #[serde(rename = "Recent Files", default)]
    pub recent_files: Vec<String>,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,
}

impl AppSettings {
    pub fn has_api_key(&self) -> bool {
        !self.steam_api_key.trim().is_empty()
    }

    pub fn has_workshop_path(&self) -> bool {
        !self.workshop_path.trim().is_empty()
    }

    /// Move `path` to the front of the recent files list.
    pub fn add_recent_file(&mut self, path: &str) {
        self.recent_files.retain(|p| p != path);
        self.recent_files.insert(0, path.to_string());
        self.recent_files.truncate(MAX_RECENT_FILES);
        self.last_ini_path = path.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_settings_defaults() {
        let settings = AppSettings::default();
        assert!(!settings.has_api_key());
        assert!(!settings.has_workshop_path());
        assert!(settings.recent_files.is_empty());
        assert!(!settings.debug_mode);
    }

    #[test]
    fn test_add_recent_file_moves_to_front() {
        let mut settings = AppSettings::default();
        settings.add_recent_file("a.ini");
        settings.add_recent_file("b.ini");
        settings.add_recent_file("a.ini");

        assert_eq!(settings.recent_files, vec!["a.ini", "b.ini"]);
        assert_eq!(settings.last_ini_path, "a.ini");
    }

    #[test]
    fn test_recent_files_capped() {
        let mut settings = AppSettings::default();
        for i in 0..15 {
            settings.add_recent_file(&format!("{i}.ini"));
        }

        assert_eq!(settings.recent_files.len(), MAX_RECENT_FILES);
        assert_eq!(settings.recent_files[0], "14.ini");
    }

    #[test]
    fn test_yaml_keys() {
        let yaml = "Steam API Key: abc\nWorkshop Path: /srv/workshop\n";
        let settings: AppSettings = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(settings.steam_api_key, "abc");
        assert_eq!(settings.workshop_path, "/srv/workshop");
        assert!(settings.recent_files.is_empty());
    }
}
