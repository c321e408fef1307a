//! Configuration for where the labeling core keeps its files
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! is a valid configuration.

use crate::error::{LabelerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Application directory name under the user's data/config directories
const APP_DIR: &str = "radiograph-labeler";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Directory holding one persisted annotation unit per image
    #[serde(default = "default_annotations_dir")]
    pub annotations_dir: PathBuf,
    /// Root of the generated reference images
    #[serde(default = "default_reference_images_dir")]
    pub reference_images_dir: PathBuf,
    /// Bundled per-pathology example files (`<Pathology>.json`)
    #[serde(default = "default_reference_examples_dir")]
    pub reference_examples_dir: PathBuf,
    /// Font used for label text on reference images
    #[serde(default)]
    pub label_font: Option<PathBuf>,
    /// Author recorded on annotations created without an explicit author
    #[serde(default = "default_author")]
    pub default_author: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            annotations_dir: default_annotations_dir(),
            reference_images_dir: default_reference_images_dir(),
            reference_examples_dir: default_reference_examples_dir(),
            label_font: None,
            default_author: default_author(),
        }
    }
}

impl Config {
    /// Configuration rooted in a single working directory
    ///
    /// Handy for tests and portable setups: annotations and reference
    /// images land in `<root>/annotations` and `<root>/annotations_visualized`.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            annotations_dir: root.join("annotations"),
            reference_images_dir: root.join("annotations_visualized"),
            reference_examples_dir: root.join("reference_examples"),
            ..Self::default()
        }
    }

    /// Read a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| LabelerError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| LabelerError::json(path, e))
    }

    /// Read the given file, else the default config file, else built-in defaults
    ///
    /// An explicitly requested file must exist; the default location is optional.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                log::info!("Using configuration at {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Check the values make sense before any directory is created
    pub fn validate(&self) -> Result<()> {
        if self.annotations_dir.as_os_str().is_empty() {
            return Err(LabelerError::Config("annotations_dir is empty".into()));
        }
        if self.reference_images_dir.as_os_str().is_empty() {
            return Err(LabelerError::Config("reference_images_dir is empty".into()));
        }
        if self.annotations_dir == self.reference_images_dir {
            return Err(LabelerError::Config(
                "annotations_dir and reference_images_dir must differ".into(),
            ));
        }
        Ok(())
    }
}

/// Where the configuration file lives by default
///
/// - Linux: ~/.config/radiograph-labeler/config.json
/// - macOS: ~/Library/Application Support/radiograph-labeler/config.json
/// - Windows: %APPDATA%\radiograph-labeler\config.json
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.json"))
}

/// User data directory for the application, falling back to home then cwd
fn data_root() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_annotations_dir() -> PathBuf {
    data_root().join("annotations")
}

fn default_reference_images_dir() -> PathBuf {
    data_root().join("annotations_visualized")
}

fn default_reference_examples_dir() -> PathBuf {
    PathBuf::from("assets").join("reference_examples")
}

fn default_author() -> String {
    "annotator".to_string()
}
