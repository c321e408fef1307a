//! Image filtering on metadata and annotation presence
//!
//! Every criterion is optional; `None` (or a blank string) leaves that
//! dimension unconstrained. All set criteria must hold.

use crate::color::NO_FINDING;
use crate::state::data::{ImageRecord, Metadata};
use crate::state::store::AnnotationStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct FilterCriteria {
    /// Finding the image must carry; "No Finding" selects images without any
    pub pathology: Option<String>,
    /// Case-insensitive exact match
    pub sex: Option<String>,
    /// Case- and whitespace-insensitive match
    pub view: Option<String>,
    /// Inclusive ISO date bounds
    pub date_min: Option<String>,
    pub date_max: Option<String>,
    /// Inclusive age bounds in years
    pub age_min: Option<f64>,
    pub age_max: Option<f64>,
    /// Require (true) or forbid (false) at least one annotation
    pub has_annotations: Option<bool>,
}

/// Treat blank strings like an absent criterion
fn active(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl FilterCriteria {
    /// Whether an image with this metadata and annotation count passes
    pub fn matches(&self, meta: &Metadata, annotation_count: usize) -> bool {
        if let Some(pathology) = active(&self.pathology) {
            let ok = if pathology == NO_FINDING {
                meta.pathologies.is_empty()
            } else {
                meta.has_pathology(pathology)
            };
            if !ok {
                return false;
            }
        }

        if let Some(sex) = active(&self.sex) {
            if !meta.sex.trim().eq_ignore_ascii_case(sex) {
                return false;
            }
        }

        if let Some(view) = active(&self.view) {
            if !meta.view.trim().eq_ignore_ascii_case(view) {
                return false;
            }
        }

        // Zero-padded ISO dates compare correctly as strings
        if let Some(min) = active(&self.date_min) {
            if meta.date.as_str() < min {
                return false;
            }
        }
        if let Some(max) = active(&self.date_max) {
            if meta.date.as_str() > max {
                return false;
            }
        }

        // Unparsable ages pass
        if let Some(age) = meta.age_years() {
            if self.age_min.is_some_and(|min| age < min) {
                return false;
            }
            if self.age_max.is_some_and(|max| age > max) {
                return false;
            }
        }

        if let Some(wanted) = self.has_annotations {
            if (annotation_count > 0) != wanted {
                return false;
            }
        }

        true
    }

    /// No criterion set at all
    pub fn is_empty(&self) -> bool {
        active(&self.pathology).is_none()
            && active(&self.sex).is_none()
            && active(&self.view).is_none()
            && active(&self.date_min).is_none()
            && active(&self.date_max).is_none()
            && self.age_min.is_none()
            && self.age_max.is_none()
            && self.has_annotations.is_none()
    }
}

/// Paths of the images passing `criteria`, in discovery order
pub fn filter_images(
    images: &[ImageRecord],
    metadata: &HashMap<String, Metadata>,
    store: &AnnotationStore,
    criteria: &FilterCriteria,
) -> Vec<String> {
    let fallback = Metadata::default();
    images
        .iter()
        .filter(|record| {
            let meta = metadata.get(&record.path).unwrap_or(&fallback);
            criteria.matches(meta, store.get(&record.path).len())
        })
        .map(|record| record.path.clone())
        .collect()
}
