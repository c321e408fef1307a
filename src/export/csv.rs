//! Flat CSV export, one row per annotation

use super::{annotated_entries, summarize, ExportSummary};
use crate::error::{LabelerError, Result};
use crate::persist;
use crate::state::store::AnnotationStore;
use std::path::Path;

/// Fixed column layout shared by export and import
pub const CSV_HEADER: [&str; 9] = [
    "Image",
    "Pathology",
    "X",
    "Y",
    "Width",
    "Height",
    "Author",
    "Date",
    "Confidence",
];

pub fn to_bytes(store: &AnnotationStore) -> Result<Vec<u8>> {
    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for (path, annotations) in annotated_entries(store) {
        for a in annotations {
            writer.write_record([
                path.to_string(),
                a.pathology.clone(),
                a.x.to_string(),
                a.y.to_string(),
                a.width.to_string(),
                a.height.to_string(),
                a.author.clone(),
                a.date.clone(),
                a.confidence.to_string(),
            ])?;
        }
    }

    writer
        .into_inner()
        .map_err(|e| LabelerError::io("<csv buffer>", e.into_error()))
}

pub fn write(path: &Path, store: &AnnotationStore) -> Result<ExportSummary> {
    let bytes = to_bytes(store)?;
    persist::write_atomic(path, &bytes)?;
    Ok(summarize(&annotated_entries(store)))
}
