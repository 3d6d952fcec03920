// Config module
// Persists display settings, image selection and bindings as JSON

use crate::error::ConfigLoadError;
use crate::input::{key_name, parse_hotkey, parse_key, Action, Bindings, DragButton, Hotkey};
use crate::library::ImageLibrary;
use crate::settings::{self, DisplaySettings};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "overtrace";
const CONFIG_FILE: &str = "config.json";

/// A binding as stored on disk. Either a combo string such as
/// `"Ctrl+Shift+F5"` or a key name plus modifier bitmask (1=Ctrl 2=Shift 4=Alt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HotkeyConfig {
    Combo(String),
    Parts {
        key: String,
        #[serde(default)]
        modifiers: u8,
    },
}

impl HotkeyConfig {
    fn from_hotkey(hotkey: &Hotkey) -> Option<Self> {
        Some(Self::Parts {
            key: key_name(hotkey.key)?.to_string(),
            modifiers: hotkey.modifiers(),
        })
    }

    fn to_hotkey(&self) -> Option<Hotkey> {
        match self {
            Self::Combo(combo) => parse_hotkey(combo),
            Self::Parts { key, modifiers } => Hotkey::from_parts(key, *modifiers),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory scanned for images and used for screenshots
    pub directory: PathBuf,
    /// Last displayed image
    pub image_path: Option<PathBuf>,
    /// Opacity in percent
    pub opacity: u32,
    /// Scale in percent
    pub scale: u32,
    pub grayscale: bool,
    pub remove_white: bool,
    pub auto_load: bool,
    pub rotation: i32,
    pub offset_x: i32,
    pub offset_y: i32,
    /// Action name -> binding. Missing actions keep their default binding.
    pub hotkeys: BTreeMap<String, HotkeyConfig>,
    pub drag_modifier: String,
    pub drag_button: DragButton,
}

impl Default for Config {
    fn default() -> Self {
        let display = DisplaySettings::default();
        let bindings = Bindings::default();
        let hotkeys = bindings
            .hotkeys
            .iter()
            .filter_map(|(action, hk)| {
                HotkeyConfig::from_hotkey(hk).map(|c| (action.name().to_string(), c))
            })
            .collect();

        Self {
            directory: default_image_dir(),
            image_path: None,
            opacity: to_percent(display.opacity),
            scale: to_percent(display.scale),
            grayscale: false,
            remove_white: false,
            auto_load: true,
            rotation: 0,
            offset_x: 0,
            offset_y: 0,
            hotkeys,
            drag_modifier: key_name(bindings.drag_modifier)
                .unwrap_or("CONTROLLEFT")
                .to_string(),
            drag_button: bindings.drag_button,
        }
    }
}

/// `round(value * 100)`
pub fn to_percent(value: f32) -> u32 {
    (value * 100.0).round().max(0.0) as u32
}

pub fn from_percent(percent: u32) -> f32 {
    percent as f32 / 100.0
}

/// `<config_dir>/overtrace/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

/// `<pictures>/overtrace`, falling back to the home directory
pub fn default_image_dir() -> PathBuf {
    dirs_next::picture_dir()
        .or_else(dirs_next::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl Config {
    /// Read the config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No config file at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigLoadError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content).map_err(|source| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`Config::load`] but never fails: errors are logged and defaults used
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, json).with_context(|| format!("Failed to write config {:?}", path))?;
        info!("Config saved to {:?}", path);
        Ok(())
    }

    /// Settings for the first redraw
    pub fn display_settings(&self) -> DisplaySettings {
        DisplaySettings {
            scale: from_percent(self.scale),
            opacity: from_percent(self.opacity),
            grayscale: self.grayscale,
            remove_white_background: self.remove_white,
            rotation_degrees: self.rotation,
            offset_x: self.offset_x,
            offset_y: self.offset_y,
        }
        .clamped()
    }

    /// Default bindings overlaid with the configured ones. Invalid entries
    /// are logged and skipped.
    pub fn bindings(&self) -> Bindings {
        let mut bindings = Bindings::default();
        for (name, entry) in &self.hotkeys {
            let Some(action) = Action::from_name(name) else {
                warn!("Unknown hotkey action '{}' in config", name);
                continue;
            };
            match entry.to_hotkey() {
                Some(hotkey) => bindings.bind(action, hotkey),
                None => warn!("Invalid binding {:?} for {}; keeping default", entry, name),
            }
        }
        match parse_key(&self.drag_modifier.to_ascii_uppercase()) {
            Some(key) => bindings.drag_modifier = key,
            None => warn!(
                "Invalid drag modifier '{}'; keeping default",
                self.drag_modifier
            ),
        }
        bindings.drag_button = self.drag_button;
        bindings
    }

    /// Capture the session state that should survive a restart
    pub fn update_from(&mut self, display: &DisplaySettings, library: &ImageLibrary) {
        self.scale = to_percent(display.scale);
        self.opacity = to_percent(display.opacity);
        self.grayscale = display.grayscale;
        self.remove_white = display.remove_white_background;
        self.rotation = settings::normalize_rotation(display.rotation_degrees);
        self.offset_x = display.offset_x;
        self.offset_y = display.offset_y;
        self.auto_load = library.auto_load_latest();
        self.directory = library.directory().to_path_buf();
        self.image_path = library.current().map(Path::to_path_buf);
    }

    /// Copy into `self` every session field that differs between `start` and
    /// `end`. Fields left alone keep the value `self` already had.
    pub fn merge_session_changes(&mut self, start: &Config, end: &Config) {
        macro_rules! take_changed {
            ($($field:ident),* $(,)?) => {
                $(
                    if start.$field != end.$field {
                        self.$field = end.$field.clone();
                    }
                )*
            };
        }
        take_changed!(
            directory,
            image_path,
            opacity,
            scale,
            grayscale,
            remove_white,
            auto_load,
            rotation,
            offset_x,
            offset_y,
        );
    }
}
