// Console settings
// Loaded from ~/.config/matchlens/settings.json

use matchlens_evidence::ComparatorThresholds;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Terminal palette selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    /// For dark terminal backgrounds (default)
    #[default]
    Dark,
    /// For light terminal backgrounds
    Light,
}

impl fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorScheme::Dark => write!(f, "dark"),
            ColorScheme::Light => write!(f, "light"),
        }
    }
}

impl FromStr for ColorScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(ColorScheme::Dark),
            "light" => Ok(ColorScheme::Light),
            other => Err(format!("unknown color scheme '{}', expected dark or light", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Display
    #[serde(rename = "display.colorScheme")]
    pub color_scheme: ColorScheme,

    #[serde(rename = "display.pageSize")]
    pub page_size: usize,

    // Files
    #[serde(rename = "files.lastSnapshot")]
    pub last_snapshot: Option<PathBuf>,

    #[serde(rename = "files.lastAudit")]
    pub last_audit: Option<PathBuf>,

    // Engine connection (command line and environment take precedence)
    #[serde(rename = "engine.url")]
    pub engine_url: Option<String>,

    #[serde(rename = "engine.database")]
    pub database: Option<PathBuf>,

    #[serde(rename = "engine.config")]
    pub engine_config: Option<PathBuf>,

    // Comparison
    #[serde(rename = "compare", default)]
    pub compare: ComparatorThresholds,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            color_scheme: ColorScheme::default(),
            page_size: 25,
            last_snapshot: None,
            last_audit: None,
            engine_url: None,
            database: None,
            engine_config: None,
            compare: ComparatorThresholds::default(),
        }
    }
}

const DEFAULT_FILE: &str = r#"{
    // Display ("dark" or "light")
    "display.colorScheme": "dark",
    "display.pageSize": 25,

    // Files loaded by the last session
    "files.lastSnapshot": null,
    "files.lastAudit": null,

    // Engine connection
    // --engine-url, --database and --config override these
    "engine.url": null,
    "engine.database": null,
    "engine.config": null,

    // Minimum scores (0-100) for two feature values to count as the same
    "compare": {
        "tokenSet": 80,
        "dateOfBirth": 90,
        "ssn": 90,
        "identifier": 90
    }
}
"#;

/// Drop `//` comment lines before parsing
fn strip_comments(contents: &str) -> String {
    contents
        .lines()
        .filter(|line| !line.trim().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("matchlens");
        config_dir.join("settings.json")
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load settings from `path`, writing a commented default file when it
    /// does not exist yet
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            let settings = Self::default();
            Self::create_default_file(path);
            return settings;
        }

        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&strip_comments(&contents)) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("error parsing {}: {}; using default settings", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("error reading {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save current settings to the default location
    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;

        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Create default settings file with comments
    pub fn create_default_file(path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("error creating config directory: {}", e);
                return;
            }
        }

        if let Err(e) = fs::write(path, DEFAULT_FILE) {
            log::warn!("error writing default {}: {}", path.display(), e);
        }
    }

    /// Remember a loaded snapshot or audit file for the next session
    pub fn remember_snapshot(&mut self, path: &Path) {
        self.last_snapshot = Some(path.to_path_buf());
    }

    pub fn remember_audit(&mut self, path: &Path) {
        self.last_audit = Some(path.to_path_buf());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_commented_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = Settings::load_from(&path);
        assert_eq!(settings, Settings::default());

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("// Display"));
        // The commented file must read back as the defaults.
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{
    // light terminal
    "display.colorScheme": "light",
    "compare": { "tokenSet": 70 }
}"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.color_scheme, ColorScheme::Light);
        assert_eq!(settings.compare.token_set, 70);
        assert_eq!(settings.compare.ssn, 90);
        assert_eq!(settings.page_size, 25);
    }

    #[test]
    fn compare_block_reads_comparator_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "compare": { "dateOfBirth": 95, "identifier": 85 } }"#).unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(
            settings.compare,
            ComparatorThresholds { token_set: 80, date_of_birth: 95, ssn: 90, identifier: 85 }
        );
    }

    #[test]
    fn unparseable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("settings.json");

        let mut settings = Settings::default();
        settings.color_scheme = ColorScheme::Light;
        settings.remember_snapshot(Path::new("/data/snapshot.json"));
        settings.engine_url = Some("http://localhost:8250".to_string());
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path);
        assert_eq!(loaded.last_snapshot, Some(PathBuf::from("/data/snapshot.json")));
        assert_eq!(loaded.engine_url.as_deref(), Some("http://localhost:8250"));
        assert_eq!(loaded.color_scheme, ColorScheme::Light);
    }

    #[test]
    fn color_scheme_parses_case_insensitively() {
        assert_eq!("LIGHT".parse::<ColorScheme>(), Ok(ColorScheme::Light));
        assert_eq!(" dark ".parse::<ColorScheme>(), Ok(ColorScheme::Dark));
        assert!("blue".parse::<ColorScheme>().is_err());
    }
}
