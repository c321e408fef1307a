//! Aggregate annotation statistics

use crate::state::store::AnnotationStore;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Statistics {
    pub total_images: usize,
    /// Images with a non-empty annotation sequence
    pub annotated_images: usize,
    pub total_annotations: usize,
    pub annotations_by_pathology: BTreeMap<String, usize>,
    pub annotations_by_author: BTreeMap<String, usize>,
}

impl Statistics {
    /// Count everything in `store` for a dataset of `total_images` images
    pub fn compute(total_images: usize, store: &AnnotationStore) -> Self {
        let mut stats = Statistics {
            total_images,
            annotated_images: store.annotated_images(),
            total_annotations: store.total_annotations(),
            ..Default::default()
        };

        for (_, annotations) in store.iter() {
            for annotation in annotations {
                *stats
                    .annotations_by_pathology
                    .entry(annotation.pathology.clone())
                    .or_insert(0) += 1;
                *stats
                    .annotations_by_author
                    .entry(annotation.author.clone())
                    .or_insert(0) += 1;
            }
        }

        stats
    }
}
