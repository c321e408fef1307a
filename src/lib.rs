//! Dataset, annotation and analytics core for labeling chest radiographs
//!
//! The [`Library`] loads a folder of radiographs (with optional NIH
//! ChestX-ray14 metadata and bounding-box CSVs), keeps per-image pathology
//! boxes, persists them one JSON file per image and produces exports,
//! statistics, filters and co-occurrence matrices. Presentation layers
//! drive everything through it.

pub mod analytics;
pub mod color;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod persist;
pub mod render;
pub mod report;
pub mod state;

pub use analytics::cooccurrence::{CooccurrenceMatrix, HeatmapRenderer, NoHeatmap};
pub use analytics::filter::FilterCriteria;
pub use analytics::stats::Statistics;
pub use color::{pathology_color, Rgba, NO_FINDING, PATHOLOGY_ORDER};
pub use config::Config;
pub use error::{LabelerError, Result};
pub use export::{ExportFormat, ExportSummary};
pub use state::data::{Annotation, ImageRecord, Metadata};
pub use state::library::Library;
