use crate::models::AppSettings;
use crate::services::AtomicFile;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment};
use std::fs;

/// File name of the user settings file.
pub const SETTINGS_FILE_NAME: &str = "PZ Mod Manager.yaml";

/// Prefix of environment variables overriding settings (`PZMM_STEAM_API_KEY`).
pub const ENV_PREFIX: &str = "PZMM";

/// Configuration manager for loading and saving the user settings file.
///
/// Settings live in `PZ Mod Manager.yaml` inside the configuration directory.
/// `PZMM_STEAM_API_KEY`, `PZMM_WORKSHOP_PATH` and `PZMM_DEBUG_MODE` override the
/// file for the current process without being written back.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
    /// Explicit environment for overrides; the process environment when `None`
    environment: Option<Vec<(String, String)>>,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing the settings file (e.g., "PZ Mod Manager Data")
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE_NAME),
            config_dir,
            environment: None,
        })
    }

    /// Use `vars` instead of the process environment for overrides.
    pub fn with_environment<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environment = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Load the settings file, then apply environment overrides.
    ///
    /// # Returns
    /// The loaded AppSettings, or defaults if the file doesn't exist
    pub fn load_settings(&self) -> Result<AppSettings> {
        let mut settings = self.load_file_settings()?;
        self.apply_overrides(&mut settings)?;
        Ok(settings)
    }

    fn load_file_settings(&self) -> Result<AppSettings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
            return Ok(AppSettings::default());
        }

        let file_contents = fs::read_to_string(&self.settings_path)
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        // An empty file deserializes to null
        if file_contents.trim().is_empty() {
            return Ok(AppSettings::default());
        }

        let settings: AppSettings = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    fn apply_overrides(&self, settings: &mut AppSettings) -> Result<()> {
        let mut source = Environment::with_prefix(ENV_PREFIX).prefix_separator("_");
        if let Some(vars) = &self.environment {
            source = source.source(Some(vars.iter().cloned().collect()));
        }

        let overrides = Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read environment overrides")?;

        if let Ok(key) = overrides.get_string("steam_api_key") {
            tracing::debug!("Steam API key overridden from environment");
            settings.steam_api_key = key;
        }
        if let Ok(path) = overrides.get_string("workshop_path") {
            tracing::debug!("Workshop path overridden from environment: {}", path);
            settings.workshop_path = path;
        }
        if let Ok(debug) = overrides.get_bool("debug_mode") {
            settings.debug_mode = debug;
        }
        Ok(())
    }

    /// Save the settings file atomically.
    ///
    /// # Arguments
    /// * `settings` - The AppSettings to save
    pub fn save_settings(&self, settings: &AppSettings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        AtomicFile::write(&self.settings_path, yaml_string.as_bytes())
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Record `path` as the most recently opened configuration file.
    ///
    /// Works on the file contents only so that environment overrides are not
    /// persisted.
    pub fn add_recent_file(&self, path: &Utf8Path) -> Result<AppSettings> {
        let mut settings = self.load_file_settings()?;
        settings.add_recent_file(path.as_str());
        self.save_settings(&settings)?;
        Ok(settings)
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path)
            .unwrap()
            .with_environment(Vec::<(String, String)>::new());
        (manager, temp_dir)
    }

    #[test]
    fn test_create_config_manager() {
        let (manager, _temp_dir) = create_test_config_manager();
        assert!(manager.settings_path().as_str().ends_with(SETTINGS_FILE_NAME));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();
        assert_eq!(manager.load_settings().unwrap(), AppSettings::default());
    }

    #[test]
    fn test_load_save_settings() {
        let (manager, _temp_dir) = create_test_config_manager();

        let settings = AppSettings {
            steam_api_key: "ABC123".to_string(),
            workshop_path: "/steam/workshop".to_string(),
            ..AppSettings::default()
        };
        manager.save_settings(&settings).unwrap();

        let contents = fs::read_to_string(manager.settings_path()).unwrap();
        assert!(contents.contains("Steam API Key: ABC123"));

        let loaded = manager.load_settings().unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_environment_overrides_not_persisted() {
        let (manager, _temp_dir) = create_test_config_manager();
        manager
            .save_settings(&AppSettings {
                steam_api_key: "from-file".to_string(),
                ..AppSettings::default()
            })
            .unwrap();

        let manager = manager.with_environment([
            ("PZMM_STEAM_API_KEY", "from-env"),
            ("PZMM_DEBUG_MODE", "true"),
            ("UNRELATED", "x"),
        ]);

        let loaded = manager.load_settings().unwrap();
        assert_eq!(loaded.steam_api_key, "from-env");
        assert!(loaded.debug_mode);

        let saved = manager.add_recent_file(Utf8Path::new("/srv/servertest.ini")).unwrap();
        assert_eq!(saved.steam_api_key, "from-file");
        assert_eq!(saved.recent_files, vec!["/srv/servertest.ini"]);
    }
}
