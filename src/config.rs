//! Session options: validation, defaults and persistence
//!
//! User settings arrive as a TOML table. Every key is checked against the
//! known option schema, required keys must be present, and the remainder is
//! merged over the defaults before deserializing into [`Options`].
//!
//! ## Config File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/stimulus-monitor/config.toml` |
//! | macOS | `~/Library/Application Support/stimulus-monitor/config.toml` |
//! | Windows | `%APPDATA%\stimulus-monitor\config.toml` |
//!
//! ## Example
//!
//! ```
//! use stimulus_monitor::Options;
//!
//! let options = Options::from_toml_str(r#"
//! [display]
//! screen_width_cm = 53.0
//! view_distance_cm = 57.0
//! secondary_screen = 1
//! "#).unwrap();
//! assert_eq!(options.display.secondary_screen, Some(1));
//! assert_eq!(options.overlay.status_band_px, 120);
//! ```

use crate::geometry::Color;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml::{Table, Value};

/// Keys the user must always supply, as `section.key` paths
pub const REQUIRED_KEYS: &[&str] = &["display.screen_width_cm", "display.view_distance_cm"];

/// Error type for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Unknown option `{0}`")]
    UnknownKey(String),
    #[error("Missing required option `{0}`")]
    MissingKey(String),
    #[error("Invalid option: {0}")]
    Invalid(String),
}

/// Returns the path to the config file.
///
/// Creates the config directory if it doesn't exist.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    let app_dir = config_dir.join("stimulus-monitor");

    if !app_dir.exists() {
        fs::create_dir_all(&app_dir)?;
    }

    Ok(app_dir.join("config.toml"))
}

/// Complete set of session options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Options {
    pub display: DisplayOptions,
    pub overlay: OverlayOptions,
    pub select: SelectOptions,
}

/// Physical setup and screen assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisplayOptions {
    /// Physical width of the primary screen (required)
    pub screen_width_cm: f64,
    /// Eye-to-screen distance (required)
    pub view_distance_cm: f64,
    /// Screen index of the subject display
    pub primary_screen: usize,
    /// Screen index of the operator display; no status overlay when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_screen: Option<usize>,
    /// Clear color of the primary surface after each mirrored flip
    pub background: [u8; 3],
}

/// Status overlay layout and colors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlayOptions {
    /// Height of the text band at the bottom of the secondary display
    pub status_band_px: u32,
    pub line_height_px: u32,
    pub padding_px: u32,
    pub text_color: [u8; 3],
    pub target_color: [u8; 3],
    pub target_pen_px: f64,
    /// Gradient endpoints of the gaze trail (older point, newer point)
    pub trail_from: [u8; 3],
    pub trail_to: [u8; 3],
    pub trail_width_px: f64,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            status_band_px: 120,
            line_height_px: 20,
            padding_px: 8,
            text_color: [255, 255, 255],
            target_color: [255, 255, 0],
            target_pen_px: 2.0,
            trail_from: [0, 200, 0],
            trail_to: [255, 60, 60],
            trail_width_px: 3.0,
        }
    }
}

/// Event multiplexer settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectOptions {
    /// Record per-probe timing while `select` runs
    pub instrument: bool,
}

impl Options {
    /// Default options for the given physical geometry
    pub fn with_geometry(screen_width_cm: f64, view_distance_cm: f64) -> Self {
        Self {
            display: DisplayOptions {
                screen_width_cm,
                view_distance_cm,
                primary_screen: 0,
                secondary_screen: None,
                background: [128, 128, 128],
            },
            overlay: OverlayOptions::default(),
            select: SelectOptions::default(),
        }
    }

    /// Validate user settings and merge them over the defaults.
    ///
    /// Fails with [`ConfigError::UnknownKey`] for keys outside the schema and
    /// [`ConfigError::MissingKey`] when a [`REQUIRED_KEYS`] entry is absent.
    pub fn from_table(user: Table) -> Result<Self, ConfigError> {
        let mut schema = Self::with_geometry(1.0, 1.0);
        schema.display.secondary_screen = Some(1);
        check_known(&user, &to_table(&schema)?, "")?;

        for path in REQUIRED_KEYS {
            if lookup(&user, path).is_none() {
                return Err(ConfigError::MissingKey((*path).to_string()));
            }
        }

        let mut merged = to_table(&Self::with_geometry(0.0, 0.0))?;
        merge(&mut merged, user);
        let options: Options = Value::Table(merged).try_into()?;
        options.validate()?;
        Ok(options)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let table: Table = toml::from_str(contents)?;
        Self::from_table(table)
    }

    /// Load options from the default config file
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path()?;
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        Self::load_from(&path)
    }

    /// Load options from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Save options to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Check values that deserialize fine but make no physical sense
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("display.screen_width_cm", self.display.screen_width_cm),
            ("display.view_distance_cm", self.display.view_distance_cm),
            ("overlay.line_height_px", self.overlay.line_height_px as f64),
        ];
        for (path, value) in positive {
            if !(value > 0.0) {
                return Err(ConfigError::Invalid(format!("`{}` must be positive", path)));
            }
        }
        Ok(())
    }

    pub fn background(&self) -> Color {
        self.display.background.into()
    }
}

fn to_table(options: &Options) -> Result<Table, ConfigError> {
    match Value::try_from(options)? {
        Value::Table(table) => Ok(table),
        _ => Err(ConfigError::Invalid("options must serialize to a table".into())),
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn check_known(user: &Table, schema: &Table, prefix: &str) -> Result<(), ConfigError> {
    for (key, value) in user {
        let path = join(prefix, key);
        match (schema.get(key), value) {
            (None, _) => return Err(ConfigError::UnknownKey(path)),
            (Some(Value::Table(known)), Value::Table(given)) => check_known(given, known, &path)?,
            (Some(Value::Table(_)), _) => {
                return Err(ConfigError::Invalid(format!("`{}` must be a table", path)))
            }
            _ => {}
        }
    }
    Ok(())
}

fn lookup<'a>(table: &'a Table, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = table.get(parts.next()?)?;
    for part in parts {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

fn merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(nested)) => merge(existing, nested),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
