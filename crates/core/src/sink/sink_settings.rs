use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::shared::constants::{DEFAULT_BACKEND, SETTINGS_DIR_NAME, SETTINGS_FILE_NAME};
use crate::shared::error::SinkError;
use crate::shared::params::Params;

/// Persisted sink configuration.
///
/// Empty strings and maps mean "backend default".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    pub backend: String,
    pub location: String,
    pub output_format: String,
    pub format_options: Params,
    /// Codec option overrides per stream index, applied when a stream with
    /// that index is added.
    pub codec_options: BTreeMap<usize, Params>,
    pub formats_blacklist: Vec<String>,
    pub codecs_blacklist: Vec<String>,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            location: String::new(),
            output_format: String::new(),
            format_options: Params::new(),
            codec_options: BTreeMap::new(),
            formats_blacklist: Vec::new(),
            codecs_blacklist: Vec::new(),
        }
    }
}

impl SinkSettings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(SETTINGS_DIR_NAME).join(SETTINGS_FILE_NAME))
    }

    /// Loads the user's settings, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load() -> Self {
        Self::config_path()
            .and_then(|path| Self::load_from(&path).ok())
            .unwrap_or_default()
    }

    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            if let Err(e) = self.save_to(&path) {
                log::warn!("Could not save settings: {e}");
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SinkError> {
        let json = fs::read_to_string(path).map_err(|e| SinkError::io(path, e))?;
        serde_json::from_str(&json).map_err(|source| SinkError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SinkError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SinkError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| SinkError::Settings {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|e| SinkError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::params;
    use serde_json::json;

    #[test]
    fn test_default_uses_default_backend() {
        let settings = SinkSettings::default();
        assert_eq!(settings.backend, DEFAULT_BACKEND);
        assert!(settings.location.is_empty());
    }

    #[test]
    fn test_save_and_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = SinkSettings {
            backend: "native".into(),
            location: "/tmp/out.mfr".into(),
            output_format: "framed".into(),
            format_options: params::params([("header", json!(false))]),
            codec_options: BTreeMap::from([(2, params::params([("bitrate", json!(64_000))]))]),
            formats_blacklist: vec!["elementary".into()],
            codecs_blacklist: vec!["pcm_f32le".into()],
        };

        settings.save_to(&path).unwrap();
        let loaded = SinkSettings::load_from(&path).unwrap();

        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"location": "out.mkv"}"#).unwrap();

        let loaded = SinkSettings::load_from(&path).unwrap();

        assert_eq!(loaded.location, "out.mkv");
        assert_eq!(loaded.backend, DEFAULT_BACKEND);
        assert!(loaded.codec_options.is_empty());
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let result = SinkSettings::load_from(&path);

        assert!(matches!(result, Err(SinkError::Settings { .. })));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = SinkSettings::load_from(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(SinkError::Io { .. })));
    }
}
