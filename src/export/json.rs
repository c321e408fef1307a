//! JSON export: image path → {metadata, annotations}

use super::{annotated_entries, summarize, ExportSummary};
use crate::error::{LabelerError, Result};
use crate::persist;
use crate::state::data::{Annotation, Metadata};
use crate::state::store::AnnotationStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JsonEntry {
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

pub type JsonExport = BTreeMap<String, JsonEntry>;

pub fn build(store: &AnnotationStore, metadata: &HashMap<String, Metadata>) -> JsonExport {
    annotated_entries(store)
        .into_iter()
        .map(|(path, seq)| {
            let entry = JsonEntry {
                metadata: metadata.get(path).cloned().unwrap_or_default(),
                annotations: seq.to_vec(),
            };
            (path.to_string(), entry)
        })
        .collect()
}

pub fn write(
    path: &Path,
    store: &AnnotationStore,
    metadata: &HashMap<String, Metadata>,
) -> Result<ExportSummary> {
    let entries = annotated_entries(store);
    persist::write_json(path, &build(store, metadata))?;
    Ok(summarize(&entries))
}

pub fn read(path: &Path) -> Result<JsonExport> {
    let text = fs::read_to_string(path).map_err(|e| LabelerError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| LabelerError::json(path, e))
}
