//! YOLO export: `classes.txt` plus one label file per annotated image
//!
//! Each label row is `class_id center_x center_y width height`, normalized
//! by the image's pixel size.

use super::{annotated_entries, distinct_pathologies, image_size, summarize, ExportSummary};
use crate::error::{LabelerError, Result};
use crate::persist;
use crate::state::data::{stem_of, Annotation};
use crate::state::store::AnnotationStore;
use std::fs;
use std::path::Path;

pub const CLASSES_FILE: &str = "classes.txt";

/// One label row in normalized center form
pub fn label_line(class_id: usize, annotation: &Annotation, width: u32, height: u32) -> String {
    let w = width.max(1) as f64;
    let h = height.max(1) as f64;
    let cx = (annotation.x + annotation.width / 2.0) / w;
    let cy = (annotation.y + annotation.height / 2.0) / h;
    format!(
        "{} {:.6} {:.6} {:.6} {:.6}",
        class_id,
        cx,
        cy,
        annotation.width / w,
        annotation.height / h
    )
}

pub fn write(output_dir: &Path, store: &AnnotationStore) -> Result<ExportSummary> {
    fs::create_dir_all(output_dir).map_err(|e| LabelerError::io(output_dir, e))?;

    let entries = annotated_entries(store);
    let classes = distinct_pathologies(&entries);

    let class_list: String = classes.iter().map(|c| format!("{}\n", c)).collect();
    persist::write_atomic(&output_dir.join(CLASSES_FILE), class_list.as_bytes())?;

    for (path, annotations) in &entries {
        let (width, height) = image_size(path);
        let mut body = String::new();
        for a in annotations.iter() {
            // Every pathology of an exported image is in `classes`
            let class_id = classes.binary_search(&a.pathology).unwrap_or(0);
            body.push_str(&label_line(class_id, a, width, height));
            body.push('\n');
        }
        let label_path = output_dir.join(format!("{}.txt", stem_of(path)));
        persist::write_atomic(&label_path, body.as_bytes())?;
    }

    Ok(summarize(&entries))
}
