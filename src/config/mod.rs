//! Persistent user settings.
//!
//! Settings live in a single JSON document under the per-user config
//! directory. Every mutation rewrites the whole file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{Bitrate, UpdateChannel};

const APP_DIR_NAME: &str = "yt2d";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to write config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown setting: {0}")]
    UnknownKey(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    #[default]
    Dark,
    Light,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub mp3_bitrate: Bitrate,
    pub output_directory: PathBuf,
    pub window_geometry: String,
    pub theme: ThemePreference,
    pub ytdlp_auto_update: bool,
    pub ytdlp_update_channel: UpdateChannel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mp3_bitrate: Bitrate::default(),
            output_directory: default_download_dir(),
            window_geometry: "800x600".to_string(),
            theme: ThemePreference::default(),
            ytdlp_auto_update: true,
            ytdlp_update_channel: UpdateChannel::default(),
        }
    }
}

impl Settings {
    /// Parses `window_geometry` ("800x600", optionally followed by "+x+y").
    pub fn window_size(&self) -> Option<(f32, f32)> {
        let size = self.window_geometry.split('+').next()?;
        let (w, h) = size.split_once('x')?;
        let w: f32 = w.trim().parse().ok()?;
        let h: f32 = h.trim().parse().ok()?;
        (w > 0.0 && h > 0.0).then_some((w, h))
    }
}

/// Write-through settings store backed by a JSON file.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    settings: Settings,
}

impl ConfigStore {
    /// Opens the store in the platform config directory.
    pub fn open_default() -> Self {
        Self::load(config_dir().join(CONFIG_FILE_NAME))
    }

    /// Loads settings from `path`, merging persisted keys over the defaults.
    ///
    /// A missing file yields defaults. An unreadable or invalid document is
    /// logged and also yields defaults.
    pub fn load(path: PathBuf) -> Self {
        let settings = match read_document(&path) {
            Ok(Some(persisted)) => merge_over_defaults(persisted).unwrap_or_else(|e| {
                log::warn!("Ignoring invalid config at {:?}: {}", path, e);
                Settings::default()
            }),
            Ok(None) => Settings::default(),
            Err(e) => {
                log::warn!("Error loading config from {:?}: {}", path, e);
                Settings::default()
            }
        };

        Self { path, settings }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Reads a single setting by its persisted key.
    pub fn get(&self, key: &str) -> Option<Value> {
        match serde_json::to_value(&self.settings) {
            Ok(Value::Object(map)) => map.get(key).cloned(),
            _ => None,
        }
    }

    /// Sets a single setting by its persisted key and saves immediately.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut map = match serde_json::to_value(&self.settings)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if !map.contains_key(key) {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }
        map.insert(key.to_string(), value);
        self.settings = serde_json::from_value(Value::Object(map))?;
        self.save()
    }

    /// Applies `f` to the settings and saves immediately.
    pub fn update<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Settings),
    {
        f(&mut self.settings);
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

fn read_document(path: &Path) -> Result<Option<Map<String, Value>>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    match serde_json::from_str(&raw)? {
        Value::Object(map) => Ok(Some(map)),
        _ => Ok(Some(Map::new())),
    }
}

fn merge_over_defaults(persisted: Map<String, Value>) -> Result<Settings> {
    let mut merged = match serde_json::to_value(Settings::default())? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    // Each key is validated on its own so one bad value only resets itself.
    for (key, value) in persisted {
        if !merged.contains_key(&key) {
            log::debug!("Ignoring unknown setting {:?}", key);
            continue;
        }
        let mut candidate = merged.clone();
        candidate.insert(key.clone(), value);
        match serde_json::from_value::<Settings>(Value::Object(candidate.clone())) {
            Ok(_) => merged = candidate,
            Err(e) => log::warn!("Ignoring invalid value for {:?}: {}", key, e),
        }
    }
    Ok(serde_json::from_value(Value::Object(merged))?)
}

/// Per-user application config directory.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Directory holding the app-managed yt-dlp binary.
pub fn managed_bin_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join("bin")
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}
