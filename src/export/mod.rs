/// Export of the whole annotation set to interchange formats, and import back
///
/// Every exporter includes only images with at least one annotation and walks
/// them in path order, so two exports of the same store are identical.
pub mod coco;
pub mod csv;
pub mod import;
pub mod json;
pub mod yolo;

use crate::error::{LabelerError, Result};
use crate::state::data::{Annotation, Metadata};
use crate::state::store::AnnotationStore;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Coco,
    Yolo,
}

impl ExportFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Csv => "CSV",
            ExportFormat::Coco => "COCO",
            ExportFormat::Yolo => "YOLO",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExportFormat {
    type Err = LabelerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "coco" => Ok(ExportFormat::Coco),
            "yolo" => Ok(ExportFormat::Yolo),
            _ => Err(LabelerError::UnknownFormat(s.to_string())),
        }
    }
}

/// Export result with statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportSummary {
    pub images_exported: usize,
    pub annotations_exported: usize,
}

/// Write every annotated image of `store` to `path` in `format`
///
/// For YOLO, `path` is the output directory.
pub fn export(
    path: &Path,
    format: ExportFormat,
    store: &AnnotationStore,
    metadata: &HashMap<String, Metadata>,
) -> Result<ExportSummary> {
    let summary = match format {
        ExportFormat::Json => json::write(path, store, metadata)?,
        ExportFormat::Csv => csv::write(path, store)?,
        ExportFormat::Coco => coco::write(path, store)?,
        ExportFormat::Yolo => yolo::write(path, store)?,
    };
    log::info!(
        "Exported {} annotations on {} images as {} to {}",
        summary.annotations_exported,
        summary.images_exported,
        format,
        path.display()
    );
    Ok(summary)
}

/// Images with a non-empty sequence, sorted by path
pub fn annotated_entries(store: &AnnotationStore) -> Vec<(&str, &[Annotation])> {
    let mut entries: Vec<(&str, &[Annotation])> = store
        .iter()
        .filter(|(_, seq)| !seq.is_empty())
        .map(|(path, seq)| (path.as_str(), seq.as_slice()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

/// Sorted distinct pathologies over the given entries
pub fn distinct_pathologies(entries: &[(&str, &[Annotation])]) -> Vec<String> {
    let mut names: Vec<String> = entries
        .iter()
        .flat_map(|(_, seq)| seq.iter().map(|a| a.pathology.clone()))
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Pixel size of an image, 1024×1024 when it can't be read
pub fn image_size(path: &str) -> (u32, u32) {
    match image::image_dimensions(path) {
        Ok(size) => size,
        Err(e) => {
            log::warn!("Cannot read dimensions of {}: {}; assuming 1024x1024", path, e);
            (FALLBACK_SIZE, FALLBACK_SIZE)
        }
    }
}

pub const FALLBACK_SIZE: u32 = 1024;

fn summarize(entries: &[(&str, &[Annotation])]) -> ExportSummary {
    ExportSummary {
        images_exported: entries.len(),
        annotations_exported: entries.iter().map(|(_, seq)| seq.len()).sum(),
    }
}
