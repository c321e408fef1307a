//! Pathology vocabulary and the pathology → color lookup table
//!
//! This module owns the only copy of:
//! - The ordered list of the 14 NIH ChestX-ray14 pathology labels
//! - The fixed color assigned to every label (plus "No Finding")
//!
//! Renderers read these tables; they never define their own.

use serde::{Deserialize, Serialize};

/// Sentinel finding used by the UI and filters, never part of the vocabulary
pub const NO_FINDING: &str = "No Finding";

/// The 14 NIH pathology labels, in matrix row/column order
pub const PATHOLOGY_ORDER: [&str; 14] = [
    "Atelectasis",
    "Cardiomegaly",
    "Effusion",
    "Infiltration",
    "Mass",
    "Nodule",
    "Pneumonia",
    "Pneumothorax",
    "Consolidation",
    "Edema",
    "Emphysema",
    "Fibrosis",
    "Pleural_Thickening",
    "Hernia",
];

/// A plain 8-bit RGBA color
///
/// Serialized as `{"r": .., "g": .., "b": .., "a": ..}` wherever an
/// annotation is persisted or exported.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "opaque")]
    pub a: u8,
}

fn opaque() -> u8 {
    255
}

impl Rgba {
    /// Create an opaque color
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Relative luminance in [0, 255] (Rec. 601 weights)
    pub fn luminance(&self) -> f32 {
        0.299 * self.r as f32 + 0.587 * self.g as f32 + 0.114 * self.b as f32
    }

    /// Black or white, whichever reads better on top of this color
    pub fn contrasting(&self) -> Rgba {
        if self.luminance() > 140.0 {
            Rgba::rgb(0, 0, 0)
        } else {
            Rgba::rgb(255, 255, 255)
        }
    }

    /// Channels as an array, for `image::Rgba`
    pub fn channels(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Color used for labels missing from the table
pub const DEFAULT_COLOR: Rgba = Rgba::rgb(255, 0, 0);

/// Fixed pathology → color table (15 entries)
pub const PATHOLOGY_COLORS: [(&str, Rgba); 15] = [
    ("Atelectasis", Rgba::rgb(255, 0, 0)),
    ("Cardiomegaly", Rgba::rgb(0, 255, 0)),
    ("Effusion", Rgba::rgb(0, 0, 255)),
    ("Infiltration", Rgba::rgb(255, 255, 0)),
    ("Mass", Rgba::rgb(255, 0, 255)),
    ("Nodule", Rgba::rgb(0, 255, 255)),
    ("Pneumonia", Rgba::rgb(255, 165, 0)),
    ("Pneumothorax", Rgba::rgb(255, 20, 147)),
    ("Consolidation", Rgba::rgb(128, 0, 128)),
    ("Edema", Rgba::rgb(0, 128, 255)),
    ("Emphysema", Rgba::rgb(128, 255, 0)),
    ("Fibrosis", Rgba::rgb(255, 128, 0)),
    ("Pleural_Thickening", Rgba::rgb(128, 128, 255)),
    ("Hernia", Rgba::rgb(255, 128, 128)),
    (NO_FINDING, Rgba::rgb(128, 128, 128)),
];

/// Look up the display color of a pathology (red when unmapped)
pub fn pathology_color(pathology: &str) -> Rgba {
    PATHOLOGY_COLORS
        .iter()
        .find(|(name, _)| *name == pathology)
        .map(|(_, color)| *color)
        .unwrap_or(DEFAULT_COLOR)
}

/// Position of a label in [`PATHOLOGY_ORDER`], if it is part of the vocabulary
pub fn pathology_index(pathology: &str) -> Option<usize> {
    PATHOLOGY_ORDER.iter().position(|p| *p == pathology)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary() {
        assert_eq!(PATHOLOGY_ORDER.len(), 14);
        assert!(!PATHOLOGY_ORDER.contains(&NO_FINDING));
        assert_eq!(pathology_index("Atelectasis"), Some(0));
        assert_eq!(pathology_index("Hernia"), Some(13));
        assert_eq!(pathology_index(NO_FINDING), None);
    }

    #[test]
    fn test_color_table_covers_vocabulary() {
        for label in PATHOLOGY_ORDER {
            assert!(PATHOLOGY_COLORS.iter().any(|(name, _)| *name == label));
        }
        assert_eq!(pathology_color("Effusion"), Rgba::rgb(0, 0, 255));
        assert_eq!(pathology_color(NO_FINDING), Rgba::rgb(128, 128, 128));
        assert_eq!(pathology_color("Unknown"), DEFAULT_COLOR);
    }

    #[test]
    fn test_contrasting() {
        assert_eq!(Rgba::rgb(255, 255, 0).contrasting(), Rgba::rgb(0, 0, 0));
        assert_eq!(Rgba::rgb(128, 0, 128).contrasting(), Rgba::rgb(255, 255, 255));
    }

    #[test]
    fn test_alpha_defaults_to_opaque() {
        let color: Rgba = serde_json::from_str(r#"{"r":1,"g":2,"b":3}"#).unwrap();
        assert_eq!(color, Rgba::rgb(1, 2, 3));
    }
}
