//! Shared data structures for the labeling state
//!
//! These structs represent the data model that flows between the
//! dataset loaders, the annotation store, the exporters and the UI layer.

use crate::color::{pathology_color, Rgba};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Author recorded on annotations seeded from an NIH bounding-box CSV
pub const SEED_AUTHOR: &str = "auto_bbox";

/// Confidence of seeded annotations
pub const SEED_CONFIDENCE: f64 = 0.5;

/// Confidence of annotations drawn by a user
pub const USER_CONFIDENCE: f64 = 1.0;

/// Represents a single discovered image in the dataset
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageRecord {
    /// Canonical absolute path, the key into every per-image map
    pub path: String,
}

impl ImageRecord {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Filename only (e.g., "00000001_000.png")
    pub fn filename(&self) -> String {
        file_name_of(&self.path)
    }

    /// Filename without extension, used to name persisted units
    pub fn stem(&self) -> String {
        stem_of(&self.path)
    }
}

/// Filename component of a path string
pub fn file_name_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

/// Filename stem of a path string
pub fn stem_of(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

/// Per-image patient/study metadata
///
/// Either parsed from a dataset CSV or synthesized when no CSV covers the image.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Metadata {
    #[serde(default)]
    pub patient_id: String,
    /// Free text, may carry a unit suffix (e.g. "045Y")
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub sex: String,
    #[serde(default)]
    pub view: String,
    /// ISO `YYYY-MM-DD`
    #[serde(default)]
    pub date: String,
    /// Canonical finding labels; empty for "No Finding"
    #[serde(default)]
    pub pathologies: Vec<String>,
    #[serde(default)]
    pub filename: String,
}

impl Metadata {
    /// Numeric age with any trailing unit letter stripped ("045Y" -> 45)
    pub fn age_years(&self) -> Option<f64> {
        let trimmed = self.age.trim();
        let numeric = trimmed.trim_end_matches(|c: char| c.is_ascii_alphabetic());
        numeric.trim().parse::<f64>().ok()
    }

    pub fn has_pathology(&self, pathology: &str) -> bool {
        self.pathologies.iter().any(|p| p == pathology)
    }
}

/// Shape of an annotation; only boxes exist today
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    #[default]
    Box,
}

/// A single pathology annotation on an image
///
/// Coordinates are in source-image pixels. Keys this struct doesn't know
/// about are kept in `extra` so they survive a load/save cycle.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Annotation {
    #[serde(rename = "type", default)]
    pub kind: AnnotationKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub pathology: String,
    #[serde(default)]
    pub author: String,
    /// ISO-8601 timestamp
    #[serde(default)]
    pub date: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Presentation color override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgba>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_confidence() -> f64 {
    USER_CONFIDENCE
}

/// Current local time in ISO-8601 form
pub fn now_iso() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

impl Annotation {
    /// A user-drawn box, stamped with the current time
    pub fn new_box(
        pathology: impl Into<String>,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        author: impl Into<String>,
    ) -> Self {
        Self {
            kind: AnnotationKind::Box,
            x,
            y,
            width,
            height,
            pathology: pathology.into(),
            author: author.into(),
            date: now_iso(),
            confidence: USER_CONFIDENCE,
            color: None,
            extra: BTreeMap::new(),
        }
    }

    /// A box seeded from the NIH bounding-box list
    pub fn seed(pathology: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            confidence: SEED_CONFIDENCE,
            ..Self::new_box(pathology, x, y, width, height, SEED_AUTHOR)
        }
    }

    pub fn with_color(mut self, color: Rgba) -> Self {
        self.color = Some(color);
        self
    }

    /// Positive area, i.e. the user finished drawing it
    pub fn is_finalized(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn is_seed(&self) -> bool {
        self.author == SEED_AUTHOR
    }

    /// Explicit color if set, else the pathology's table color
    pub fn display_color(&self) -> Rgba {
        self.color.unwrap_or_else(|| pathology_color(&self.pathology))
    }

    /// Text shown above the box: pathology, plus author in parentheses
    pub fn label(&self) -> String {
        if self.author.is_empty() {
            self.pathology.clone()
        } else {
            format!("{} ({})", self.pathology, self.author)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_names() {
        let record = ImageRecord::new("/data/images/00000001_000.png");
        assert_eq!(record.filename(), "00000001_000.png");
        assert_eq!(record.stem(), "00000001_000");
    }

    #[test]
    fn test_age_years() {
        let mut meta = Metadata::default();
        meta.age = "045Y".into();
        assert_eq!(meta.age_years(), Some(45.0));
        meta.age = " 60 ".into();
        assert_eq!(meta.age_years(), Some(60.0));
        meta.age = "unknown".into();
        assert_eq!(meta.age_years(), None);
        meta.age = String::new();
        assert_eq!(meta.age_years(), None);
    }

    #[test]
    fn test_minimal_annotation_json() {
        let json = r#"{"type":"box","x":10,"y":20,"width":30,"height":40,"pathology":"Atelectasis"}"#;
        let ann: Annotation = serde_json::from_str(json).unwrap();
        assert_eq!(ann.kind, AnnotationKind::Box);
        assert_eq!(ann.x, 10.0);
        assert_eq!(ann.author, "");
        assert_eq!(ann.confidence, 1.0);
        assert!(ann.color.is_none());
        assert!(ann.extra.is_empty());
    }

    #[test]
    fn test_unknown_keys_survive() {
        let json = r#"{"x":1,"y":2,"width":3,"height":4,"pathology":"Mass","note":"check"}"#;
        let ann: Annotation = serde_json::from_str(json).unwrap();
        assert_eq!(ann.extra.get("note"), Some(&serde_json::json!("check")));

        let out = serde_json::to_value(&ann).unwrap();
        assert_eq!(out["note"], "check");
        assert_eq!(out["type"], "box");
    }

    #[test]
    fn test_color_is_flattened_to_channels() {
        let ann = Annotation::new_box("Nodule", 0.0, 0.0, 5.0, 5.0, "alice")
            .with_color(Rgba::rgb(1, 2, 3));
        let out = serde_json::to_value(&ann).unwrap();
        assert_eq!(out["color"], serde_json::json!({"r": 1, "g": 2, "b": 3, "a": 255}));
    }

    #[test]
    fn test_seed_annotation() {
        let ann = Annotation::seed("Effusion", 1.0, 2.0, 3.0, 4.0);
        assert!(ann.is_seed());
        assert_eq!(ann.confidence, 0.5);
        assert_eq!(ann.label(), "Effusion (auto_bbox)");
        assert_eq!(ann.display_color(), Rgba::rgb(0, 0, 255));
    }

    #[test]
    fn test_is_finalized() {
        assert!(Annotation::new_box("Mass", 0.0, 0.0, 1.0, 1.0, "a").is_finalized());
        assert!(!Annotation::new_box("Mass", 0.0, 0.0, 0.0, 1.0, "a").is_finalized());
    }
}
