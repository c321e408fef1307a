// COCO JSON format export
// http://cocodataset.org/#format-data

use super::{annotated_entries, distinct_pathologies, image_size, summarize, ExportSummary};
use crate::error::Result;
use crate::persist;
use crate::state::data::file_name_of;
use crate::state::store::AnnotationStore;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
pub struct CocoInfo {
    pub year: i32,
    pub version: String,
    pub description: String,
    pub contributor: String,
    pub date_created: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CocoImage {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub file_name: String,
    /// Full source path, so the export can be traced back to the dataset
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CocoAnnotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    pub bbox: [f64; 4], // [x, y, width, height]
    pub area: f64,
    pub iscrowd: u8,
    pub author: String,
    pub confidence: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CocoCategory {
    pub id: u64,
    pub name: String,
    pub supercategory: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CocoDataset {
    pub info: CocoInfo,
    pub images: Vec<CocoImage>,
    pub annotations: Vec<CocoAnnotation>,
    pub categories: Vec<CocoCategory>,
}

impl CocoDataset {
    pub fn new() -> Self {
        let now = chrono::Local::now();
        CocoDataset {
            info: CocoInfo {
                year: now.year(),
                version: "1.0".to_string(),
                description: "Chest radiograph pathology annotations".to_string(),
                contributor: "radiograph-labeler".to_string(),
                date_created: now.format("%Y-%m-%d").to_string(),
            },
            images: Vec::new(),
            annotations: Vec::new(),
            categories: Vec::new(),
        }
    }

    pub fn add_category(&mut self, id: u64, name: String) {
        self.categories.push(CocoCategory {
            id,
            name,
            supercategory: "pathology".to_string(),
        });
    }

    /// Build the dataset from every annotated image of the store
    ///
    /// Categories get 1-based ids in sorted name order; image and annotation
    /// ids are sequential from 1 in path order.
    pub fn from_store(store: &AnnotationStore) -> Self {
        let entries = annotated_entries(store);
        let mut dataset = CocoDataset::new();

        let mut category_ids = HashMap::new();
        for (i, name) in distinct_pathologies(&entries).into_iter().enumerate() {
            let id = i as u64 + 1;
            category_ids.insert(name.clone(), id);
            dataset.add_category(id, name);
        }

        let mut annotation_id = 1;
        for (i, (path, annotations)) in entries.iter().enumerate() {
            let image_id = i as u64 + 1;
            let (width, height) = image_size(path);
            dataset.images.push(CocoImage {
                id: image_id,
                width,
                height,
                file_name: file_name_of(path),
                path: path.to_string(),
            });

            for a in annotations.iter() {
                dataset.annotations.push(CocoAnnotation {
                    id: annotation_id,
                    image_id,
                    category_id: category_ids.get(&a.pathology).copied().unwrap_or(0),
                    bbox: [a.x, a.y, a.width, a.height],
                    area: a.width * a.height,
                    iscrowd: 0,
                    author: a.author.clone(),
                    confidence: a.confidence,
                });
                annotation_id += 1;
            }
        }

        dataset
    }
}

impl Default for CocoDataset {
    fn default() -> Self {
        Self::new()
    }
}

pub fn write(path: &Path, store: &AnnotationStore) -> Result<ExportSummary> {
    let dataset = CocoDataset::from_store(store);
    persist::write_json(path, &dataset)?;
    Ok(summarize(&annotated_entries(store)))
}
