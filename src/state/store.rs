use super::data::{stem_of, Annotation, Metadata};
use crate::error::{LabelerError, Result};
use crate::persist;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk form of one image's annotations
///
/// Stored as `<annotations_dir>/<image stem>.json`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnnotationFile {
    pub image_path: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub last_modified: String,
}

/// The AnnotationStore owns every image's annotation sequence.
///
/// Sequences are kept in creation order; positions are the handles used by
/// update and delete. Files in `annotations_dir` are a durable projection
/// written by [`AnnotationStore::save`], never a second source of truth.
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    annotations: HashMap<String, Vec<Annotation>>,
    annotations_dir: PathBuf,
}

impl AnnotationStore {
    /// Create an empty store persisting into `annotations_dir`
    pub fn new(annotations_dir: impl Into<PathBuf>) -> Self {
        Self {
            annotations: HashMap::new(),
            annotations_dir: annotations_dir.into(),
        }
    }

    /// Directory the per-image files are written to
    pub fn annotations_dir(&self) -> &Path {
        &self.annotations_dir
    }

    /// Forget every sequence (dataset reload)
    pub fn clear(&mut self) {
        self.annotations.clear();
    }

    /// Append an annotation to an image's sequence
    pub fn add(&mut self, image_path: &str, annotation: Annotation) {
        self.annotations
            .entry(image_path.to_string())
            .or_default()
            .push(annotation);
    }

    /// Replace the annotation at `index`
    pub fn update(&mut self, image_path: &str, index: usize, annotation: Annotation) -> Result<()> {
        let len = self.get(image_path).len();
        match self
            .annotations
            .get_mut(image_path)
            .and_then(|seq| seq.get_mut(index))
        {
            Some(existing) => {
                *existing = annotation;
                Ok(())
            }
            None => Err(out_of_range(image_path, index, len)),
        }
    }

    /// Remove and return the annotation at `index`
    pub fn delete(&mut self, image_path: &str, index: usize) -> Result<Annotation> {
        let len = self.get(image_path).len();
        if index >= len {
            return Err(out_of_range(image_path, index, len));
        }
        let seq = self
            .annotations
            .get_mut(image_path)
            .ok_or_else(|| out_of_range(image_path, index, len))?;
        Ok(seq.remove(index))
    }

    /// Annotations of an image; empty for unknown paths
    pub fn get(&self, image_path: &str) -> &[Annotation] {
        self.annotations
            .get(image_path)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replace an image's whole sequence
    pub fn set(&mut self, image_path: &str, annotations: Vec<Annotation>) {
        self.annotations.insert(image_path.to_string(), annotations);
    }

    /// Every image key with its sequence (including empty ones)
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Annotation>)> {
        self.annotations.iter()
    }

    /// Number of images with at least one annotation
    pub fn annotated_images(&self) -> usize {
        self.annotations.values().filter(|seq| !seq.is_empty()).count()
    }

    /// Number of annotations across all images
    pub fn total_annotations(&self) -> usize {
        self.annotations.values().map(Vec::len).sum()
    }

    /// Path of the persisted unit for an image
    pub fn unit_path(&self, image_path: &str) -> PathBuf {
        self.annotations_dir
            .join(format!("{}.json", stem_of(image_path)))
    }

    /// Write an image's current sequence to its persisted unit
    ///
    /// Saving the same sequence twice yields the same annotation content;
    /// only `last_modified` changes.
    pub fn save(&self, image_path: &str, metadata: Option<&Metadata>) -> Result<PathBuf> {
        let unit = AnnotationFile {
            image_path: image_path.to_string(),
            metadata: metadata.cloned(),
            annotations: self.get(image_path).to_vec(),
            last_modified: super::data::now_iso(),
        };

        let path = self.unit_path(image_path);
        persist::write_json(&path, &unit)?;
        log::debug!(
            "Saved {} annotations for {} to {}",
            unit.annotations.len(),
            image_path,
            path.display()
        );
        Ok(path)
    }

    /// Replace an image's sequence with its persisted unit, if one exists
    ///
    /// Returns `Ok(false)` when the image has never been saved, or when the
    /// unit under its stem was written for a different image.
    pub fn load_saved(&mut self, image_path: &str) -> Result<bool> {
        let path = self.unit_path(image_path);
        if !path.exists() {
            return Ok(false);
        }

        let unit = read_unit(&path)?;
        if !unit.image_path.is_empty() && unit.image_path != image_path {
            log::warn!(
                "Ignoring {}: it belongs to {}, not {}",
                path.display(),
                unit.image_path,
                image_path
            );
            return Ok(false);
        }
        self.set(image_path, unit.annotations);
        Ok(true)
    }
}

fn out_of_range(image_path: &str, index: usize, len: usize) -> LabelerError {
    LabelerError::IndexOutOfRange {
        path: image_path.to_string(),
        index,
        len,
    }
}

/// Read one persisted unit
pub fn read_unit(path: &Path) -> Result<AnnotationFile> {
    let text = fs::read_to_string(path).map_err(|e| LabelerError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| LabelerError::json(path, e))
}
