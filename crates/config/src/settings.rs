// Application settings
// Loaded from ~/.config/formwork/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Which values formula references resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    /// Values stored alongside the formula win over the catalog (default)
    #[default]
    Snapshot,
    /// Always resolve against the current catalog
    Live,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Suggestions
    #[serde(rename = "suggest.minCreateLength")]
    pub min_create_length: usize,

    #[serde(rename = "suggest.limit")]
    pub suggestion_limit: Option<usize>,  // None = unlimited

    #[serde(rename = "suggest.includeProducts")]
    pub include_products: bool,

    // Evaluation
    #[serde(rename = "eval.resolution")]
    pub resolution: ResolutionMode,

    #[serde(rename = "eval.precision")]
    pub precision: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            // Suggestions
            min_create_length: 2,
            suggestion_limit: None,
            include_products: true,
            // Evaluation
            resolution: ResolutionMode::Snapshot,
            precision: 2,
        }
    }
}

const DEFAULT_CONFIG: &str = r#"{
    // Suggestions
    // Minimum typed length before "Add ... as variable" is offered
    "suggest.minCreateLength": 2,
    // Maximum number of suggestions (null = unlimited)
    "suggest.limit": null,
    "suggest.includeProducts": true,

    // Evaluation
    // "snapshot" = values stored with the formula win, "live" = current catalog only
    "eval.resolution": "snapshot",
    // Decimal places when printing values
    "eval.precision": 2
}
"#;

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("formwork");
        config_dir.join("settings.json")
    }

    /// Load settings from the default location, falling back to defaults.
    /// A missing file is created with commented defaults.
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            Self::create_default_file(&path);
            return Self::default();
        }

        Self::load_from(&path)
    }

    /// Load settings from a specific file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("Error parsing {}: {}", path.display(), e);
                    log::warn!("Using default settings");
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Error reading {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse settings JSON. Lines starting with `//` are comments.
    pub fn parse(contents: &str) -> Result<Self, String> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        serde_json::from_str(&cleaned).map_err(|e| e.to_string())
    }

    /// Save current settings to the default location
    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::config_path())
    }

    /// Save current settings to a specific file
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| e.to_string())?;

        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Create default settings file with comments
    fn create_default_file(path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Error creating config directory: {}", e);
                return;
            }
        }

        if let Err(e) = fs::write(path, DEFAULT_CONFIG) {
            log::warn!("Error writing default settings.json: {}", e);
        }
    }

    /// Get the config file path for display/opening
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}
