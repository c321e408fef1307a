/// Dataset ingestion module
///
/// This module handles:
/// - Discovering image files under a dataset folder (discover.rs)
/// - Parsing per-image metadata from Data_Entry-style CSVs (metadata.rs)
/// - Seeding annotations from the NIH bounding-box list (bbox_seed.rs)
pub mod discover;
pub mod metadata;
pub mod bbox_seed;

use std::path::{Path, PathBuf};

/// Resolve an image name from a CSV row against the dataset root
///
/// The name is looked up directly under `root`, then under `root/images/`.
/// Returns the canonical path string, or `None` when neither exists.
pub fn resolve_image(root: &Path, name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let candidates: [PathBuf; 2] = [root.join(name), root.join("images").join(name)];
    candidates
        .iter()
        .find(|candidate| candidate.is_file())
        .map(|found| discover::canonical_string(found))
}
