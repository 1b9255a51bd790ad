//! User preferences consumed, not owned, by the engine.
//!
//! The unit choice only affects presentation; the name prefix is handed to
//! the engine verbatim and reversed at the wire boundary.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::PreferencesError;

/// Stub prefix used when the user never configured one.
pub const DEFAULT_NAME_PREFIX: &str = "Scan";

/// Default BLE local-name prefix for spectrometer discovery.
pub const DEFAULT_DEVICE_PREFIX: &str = "NIR";

/// Persisted user preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Prefix for names of newly scanned measurements.
    pub name_prefix: String,
    /// Ask the peripheral to keep scan copies on removable media.
    pub save_to_sd: bool,
    /// Render temperatures in Fahrenheit (presentation only).
    pub temperature_fahrenheit: bool,
    /// Device address to reconnect to without discovery.
    pub preferred_device: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            save_to_sd: false,
            temperature_fahrenheit: false,
            preferred_device: None,
        }
    }
}

impl Preferences {
    /// Loads preferences from the platform config directory; absent files
    /// yield the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, PreferencesError> {
        Self::load_from(&Self::file_path()?)
    }

    /// Persists preferences to the platform config directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created or the file
    /// cannot be written.
    pub fn store(&self) -> Result<(), PreferencesError> {
        self.store_to(&Self::file_path()?)
    }

    pub(crate) fn load_from(path: &Path) -> Result<Self, PreferencesError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(error.into()),
        }
    }

    pub(crate) fn store_to(&self, path: &Path) -> Result<(), PreferencesError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = serde_json::to_string_pretty(self)?;
        std::fs::write(path, rendered)?;
        Ok(())
    }

    fn file_path() -> Result<PathBuf, PreferencesError> {
        let dirs =
            ProjectDirs::from("", "", "nirlink").ok_or(PreferencesError::MissingConfigDir)?;
        Ok(dirs.config_dir().join("preferences.json"))
    }

    /// Converts a Celsius reading for display per the unit preference.
    #[must_use]
    pub fn display_temperature(&self, celsius: f32) -> f32 {
        if self.temperature_fahrenheit {
            celsius * 9.0 / 5.0 + 32.0
        } else {
            celsius
        }
    }

    /// Unit suffix matching [`Preferences::display_temperature`].
    #[must_use]
    pub fn temperature_unit(&self) -> &'static str {
        if self.temperature_fahrenheit {
            "°F"
        } else {
            "°C"
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = std::env::temp_dir().join("nirlink-prefs-missing");
        let prefs = Preferences::load_from(&dir.join("preferences.json"))
            .expect("missing file should fall back to defaults");
        assert_eq!(Preferences::default(), prefs);
    }

    #[test]
    fn preferences_round_trip_through_disk() {
        let dir = std::env::temp_dir().join(format!("nirlink-prefs-{}", std::process::id()));
        let path = dir.join("preferences.json");
        let prefs = Preferences {
            name_prefix: "Field".to_string(),
            save_to_sd: true,
            temperature_fahrenheit: true,
            preferred_device: Some("AA:BB:CC:DD:EE:FF".to_string()),
        };

        prefs.store_to(&path).expect("preferences should persist");
        let loaded = Preferences::load_from(&path).expect("persisted preferences should load");
        assert_eq!(prefs, loaded);

        std::fs::remove_dir_all(&dir).expect("test directory should be removable");
    }

    #[test]
    fn display_temperature_honours_unit_preference() {
        let celsius = Preferences::default();
        assert_eq!(23.45, celsius.display_temperature(23.45));
        assert_eq!("°C", celsius.temperature_unit());

        let fahrenheit = Preferences {
            temperature_fahrenheit: true,
            ..Preferences::default()
        };
        assert!((fahrenheit.display_temperature(0.0) - 32.0).abs() < f32::EPSILON);
        assert_eq!("°F", fahrenheit.temperature_unit());
    }
}
