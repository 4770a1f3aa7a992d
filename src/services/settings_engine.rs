// Bookmarks Settings Engine
// Loads, saves and updates the bookmarks settings stored as a JSON file.
// Individual values are addressed with dot-notation keys such as "sync.debounce_ms".

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::types::errors::SettingsError;
use crate::types::settings::BookmarksSettings;

/// Trait defining the settings engine interface.
pub trait SettingsEngineTrait {
    fn load(&mut self) -> Result<BookmarksSettings, SettingsError>;
    fn save(&self) -> Result<(), SettingsError>;
    fn get_settings(&self) -> &BookmarksSettings;
    fn set_value(&mut self, key: &str, value: Value) -> Result<(), SettingsError>;
    fn reset(&mut self) -> Result<(), SettingsError>;
    fn get_config_path(&self) -> &Path;
}

/// Settings engine persisting [`BookmarksSettings`] as JSON on disk.
pub struct SettingsEngine {
    config_path: PathBuf,
    settings: BookmarksSettings,
}

impl SettingsEngine {
    /// Creates an engine over `config_path` holding default settings until
    /// [`load`](SettingsEngineTrait::load) is called.
    pub fn new<P: Into<PathBuf>>(config_path: P) -> Self {
        Self {
            config_path: config_path.into(),
            settings: BookmarksSettings::default(),
        }
    }

    fn invalid_key(key: &str) -> SettingsError {
        SettingsError::InvalidKey(format!("Key '{}' not found in settings", key))
    }

    // Slot addressed by a dot-separated path. Only existing keys are reachable.
    fn locate<'v>(root: &'v mut Value, key: &str) -> Result<&'v mut Value, SettingsError> {
        let mut current = root;
        for part in key.split('.') {
            if part.is_empty() {
                return Err(SettingsError::InvalidKey(format!("Malformed key '{}'", key)));
            }
            current = match current {
                Value::Object(map) => map.get_mut(part).ok_or_else(|| Self::invalid_key(key))?,
                _ => {
                    return Err(SettingsError::InvalidKey(format!(
                        "Cannot navigate to key '{}': intermediate value is not an object",
                        key
                    )))
                }
            };
        }
        Ok(current)
    }
}

impl SettingsEngineTrait for SettingsEngine {
    /// Loads settings from the config file.
    ///
    /// A missing file yields defaults; a malformed one a serialization error.
    fn load(&mut self) -> Result<BookmarksSettings, SettingsError> {
        if !self.config_path.exists() {
            self.settings = BookmarksSettings::default();
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| SettingsError::IoError(format!("Failed to read config file: {}", e)))?;
        self.settings = serde_json::from_str(&content).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to parse config file: {}", e))
        })?;
        Ok(self.settings.clone())
    }

    fn save(&self) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SettingsError::IoError(format!("Failed to create config directory: {}", e))
            })?;
        }
        let json = serde_json::to_string_pretty(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;
        fs::write(&self.config_path, json)
            .map_err(|e| SettingsError::IoError(format!("Failed to write config file: {}", e)))
    }

    fn get_settings(&self) -> &BookmarksSettings {
        &self.settings
    }

    /// Updates one value by dot-notation key and saves.
    ///
    /// The updated document must still deserialize into [`BookmarksSettings`],
    /// otherwise the settings are left untouched.
    fn set_value(&mut self, key: &str, value: Value) -> Result<(), SettingsError> {
        if key.is_empty() {
            return Err(SettingsError::InvalidKey("Key cannot be empty".to_string()));
        }

        let mut document = serde_json::to_value(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;
        *Self::locate(&mut document, key)? = value;

        self.settings = serde_json::from_value(document).map_err(|e| {
            SettingsError::InvalidValue(format!("Invalid value for key '{}': {}", key, e))
        })?;
        self.save()
    }

    fn reset(&mut self) -> Result<(), SettingsError> {
        self.settings = BookmarksSettings::default();
        self.save()
    }

    fn get_config_path(&self) -> &Path {
        &self.config_path
    }
}
