//! Persisted user settings
//!
//! Settings live in a JSON file under the platform config directory and are
//! written atomically so a crash mid-write never leaves a corrupt file.
//! Missing or unparseable settings fall back to defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SETTINGS_FILE_NAME: &str = "settings.json";
const CONFIG_DIR_NAME: &str = "hypley";

/// Environment variable carrying the live endpoint API key
pub const API_KEY_ENV: &str = "HYPLEY_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    /// Voice the assistant speaks with; also selects the Jade/Luiza
    /// instruction personas.
    pub voice_name: String,

    /// Selected specialist agent preset.
    pub agent: String,

    /// Start forwarding screen frames as soon as a session opens.
    pub vision_enabled: bool,

    /// Preferred input device name; `None` uses the system default.
    pub input_device: Option<String>,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            voice_name: "Kore".to_string(),
            agent: "default".to_string(),
            vision_enabled: false,
            input_device: None,
        }
    }
}

/// Read the API key from the environment
pub fn api_key() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
}

fn settings_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir().ok_or("Could not determine config directory")?;
    Ok(dir.join(CONFIG_DIR_NAME).join(SETTINGS_FILE_NAME))
}

pub fn load_settings() -> LiveSettings {
    match settings_path() {
        Ok(path) => read_settings(&path),
        Err(e) => {
            log::warn!("Settings: {}", e);
            LiveSettings::default()
        }
    }
}

pub fn save_settings(settings: &LiveSettings) -> Result<(), String> {
    let path = settings_path()?;
    write_settings(&path, settings)
}

fn read_settings(path: &Path) -> LiveSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<LiveSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                LiveSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => LiveSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            LiveSettings::default()
        }
    }
}

fn write_settings(path: &Path, settings: &LiveSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write atomically: write to a temp file in the same directory, then rename.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // On Unix, rename will atomically replace the destination. On Windows,
    // rename fails if the destination exists, so we remove it first.
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing settings file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = LiveSettings::default();
        assert_eq!(settings.voice_name, "Kore");
        assert_eq!(settings.agent, "default");
        assert!(!settings.vision_enabled);
        assert!(settings.input_device.is_none());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);

        let settings = LiveSettings {
            voice_name: "Jade".to_string(),
            agent: "programmer".to_string(),
            vision_enabled: true,
            input_device: Some("USB Microphone".to_string()),
        };
        write_settings(&path, &settings).unwrap();

        let loaded = read_settings(&path);
        assert_eq!(loaded.voice_name, "Jade");
        assert_eq!(loaded.agent, "programmer");
        assert!(loaded.vision_enabled);
        assert_eq!(loaded.input_device.as_deref(), Some("USB Microphone"));
    }

    #[test]
    fn test_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = read_settings(&dir.path().join("nope.json"));
        assert_eq!(loaded.voice_name, "Kore");
    }

    #[test]
    fn test_corrupt_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "{not json").unwrap();

        let loaded = read_settings(&path);
        assert_eq!(loaded.voice_name, "Kore");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, r#"{"voice_name": "Puck"}"#).unwrap();

        let loaded = read_settings(&path);
        assert_eq!(loaded.voice_name, "Puck");
        assert_eq!(loaded.agent, "default");
    }
}
