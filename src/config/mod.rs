use crate::models::{ConfigSnapshot, Settings};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use ::config::{Config, Environment, File, FileFormat};
use std::fs;

/// Name of the settings file inside the configuration directory.
pub const SETTINGS_FILE: &str = "config_log.settings.yml";

/// Prefix of environment variables overriding the settings file.
///
/// Nested keys use `__`, e.g. `CONFIG_LOG_CONFIG_LOG__IGNORE_NO_CHANGES=true`.
pub const ENV_PREFIX: &str = "CONFIG_LOG";

/// Settings manager for loading and saving the YAML settings file.
///
/// Relative paths inside the settings (database, mail spool) are resolved
/// against the configuration directory.
#[derive(Debug, Clone)]
pub struct SettingsManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl SettingsManager {
    /// Create a new SettingsManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory holding the settings file and the database
    ///
    /// # Returns
    /// A new SettingsManager instance
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        // Create config directory if it doesn't exist
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
        })
    }

    /// Load the settings file, layered with `CONFIG_LOG_*` environment variables.
    ///
    /// # Returns
    /// The loaded Settings, or defaults (plus environment overrides) if the
    /// file doesn't exist
    pub fn load_settings(&self) -> Result<Settings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let settings: Settings = Config::builder()
            .add_source(File::new(self.settings_path.as_str(), FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    /// Save the settings file.
    ///
    /// # Arguments
    /// * `settings` - The Settings to save
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Resolve a settings path against the configuration directory.
    pub fn resolve(&self, path: &str) -> Utf8PathBuf {
        let path = Utf8Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    pub fn database_path(&self, settings: &Settings) -> Utf8PathBuf {
        self.resolve(&settings.database)
    }

    pub fn mail_spool_path(&self, settings: &Settings) -> Utf8PathBuf {
        self.resolve(&settings.mail_spool)
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Get the settings file path.
    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}

/// Read a configuration snapshot from a YAML file.
///
/// An empty file is an empty snapshot; a document that is not a mapping is
/// an error.
pub fn load_snapshot(path: &Utf8Path) -> Result<ConfigSnapshot> {
    let file_contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot: {}", path))?;

    ConfigSnapshot::from_yaml_str(&file_contents)
        .with_context(|| format!("Failed to parse snapshot: {}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Destination, Value};
    use tempfile::TempDir;

    fn create_test_settings_manager() -> (SettingsManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = SettingsManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_create_settings_manager() {
        let (manager, _temp_dir) = create_test_settings_manager();
        assert!(manager.settings_path().ends_with(SETTINGS_FILE));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let (manager, _temp_dir) = create_test_settings_manager();
        let settings = manager.load_settings().unwrap();
        assert_eq!(settings.site_name, "Drupal");
        assert_eq!(settings.config_log.enabled_destinations, None);
    }

    #[test]
    fn test_load_save_settings() {
        let (manager, _temp_dir) = create_test_settings_manager();

        let mut settings = Settings::default();
        settings.site_name = "Example".to_string();
        settings.config_log.enabled_destinations = Some(vec![Destination::Text]);
        settings.config_log.ignore_patterns = vec!["system.*".to_string()];
        settings.config_log.ignore_if_unchanged = true;
        manager.save_settings(&settings).unwrap();

        let loaded = manager.load_settings().unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_resolve_paths() {
        let (manager, _temp_dir) = create_test_settings_manager();
        let settings = Settings::default();

        assert_eq!(
            manager.database_path(&settings),
            manager.config_dir().join("config_log.sqlite")
        );
        assert_eq!(
            manager.resolve("/var/spool/mail"),
            Utf8PathBuf::from("/var/spool/mail")
        );
    }

    #[test]
    fn test_load_snapshot() {
        let (manager, _temp_dir) = create_test_settings_manager();
        let path = manager.config_dir().join("system.site.yml");
        fs::write(&path, "name: Drupal\npage:\n  404: /404\n").unwrap();

        let snapshot = load_snapshot(&path).unwrap();
        assert_eq!(snapshot.get("name"), Some(&Value::from("Drupal")));
        assert_eq!(snapshot.get_path("page.404"), Some(&Value::from("/404")));
    }

    #[test]
    fn test_load_snapshot_rejects_scalar_document() {
        let (manager, _temp_dir) = create_test_settings_manager();
        let path = manager.config_dir().join("broken.yml");
        fs::write(&path, "just a string\n").unwrap();

        assert!(load_snapshot(&path).is_err());
    }
}
