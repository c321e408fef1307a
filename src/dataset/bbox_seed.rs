//! Seed annotations from the NIH `BBox_List_2017.csv`
//!
//! Each row names an image, a finding label and a `[x, y, w, h]` box. Rows
//! that can't be used are logged and skipped; they never fail the load.

use super::resolve_image;
use crate::error::Result;
use crate::state::data::Annotation;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File name of the NIH bounding-box list
pub const BBOX_LIST_NAME: &str = "BBox_List_2017.csv";

const IMAGE_COLUMN: &str = "Image Index";
const LABEL_COLUMN: &str = "Finding Label";
/// Header when the quad is quoted into one field
const BBOX_COLUMN: &str = "Bbox [x,y,w,h]";
/// Header of the first field when the quad spans four columns (`Bbox [x`, `y`, `w`, `h]`)
const BBOX_SPLIT_COLUMN: &str = "Bbox [x";

/// Locate the bounding-box list anywhere under `metadata_root`
pub fn find_bbox_csv(metadata_root: &Path) -> Option<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(metadata_root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == BBOX_LIST_NAME)
        .map(|e| e.into_path())
        .collect();
    found.sort();
    found.into_iter().next()
}

/// Where the box lives in a row
#[derive(Debug, Clone, Copy)]
enum BboxLayout {
    /// One field holding "x,y,w,h"
    Joined(usize),
    /// Four consecutive fields starting here
    Split(usize),
}

/// Read every usable row of the bbox list as `(image_path, annotation)`
///
/// Annotations are authored `auto_bbox` with confidence 0.5.
pub fn load_seed_annotations(csv_path: &Path, dataset_root: &Path) -> Vec<(String, Annotation)> {
    match parse_bbox_csv(csv_path, dataset_root) {
        Ok(seeds) => {
            log::info!(
                "Seeded {} annotations from {}",
                seeds.len(),
                csv_path.display()
            );
            seeds
        }
        Err(e) => {
            log::warn!("Could not read {}: {}", csv_path.display(), e);
            Vec::new()
        }
    }
}

fn parse_bbox_csv(csv_path: &Path, dataset_root: &Path) -> Result<Vec<(String, Annotation)>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(csv_path)?;

    let headers = reader.headers()?.clone();
    let position = |name: &str| headers.iter().position(|h| h == name);

    let image_col = position(IMAGE_COLUMN);
    let label_col = position(LABEL_COLUMN);
    let layout = position(BBOX_COLUMN)
        .map(BboxLayout::Joined)
        .or_else(|| position(BBOX_SPLIT_COLUMN).map(BboxLayout::Split));

    let (Some(image_col), Some(label_col), Some(layout)) = (image_col, label_col, layout) else {
        log::warn!(
            "{} is missing one of the '{}', '{}', '{}' columns",
            csv_path.display(),
            IMAGE_COLUMN,
            LABEL_COLUMN,
            BBOX_COLUMN
        );
        return Ok(Vec::new());
    };

    let mut seeds = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let line = row + 2;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                log::warn!("{}:{}: unreadable row: {}", csv_path.display(), line, e);
                continue;
            }
        };

        let name = record.get(image_col).unwrap_or_default();
        if name.is_empty() {
            log::warn!("{}:{}: missing image name", csv_path.display(), line);
            continue;
        }

        let Some(path) = resolve_image(dataset_root, name) else {
            log::warn!("{}:{}: image {} not found", csv_path.display(), line, name);
            continue;
        };

        let quad = match layout {
            BboxLayout::Joined(col) => record.get(col).unwrap_or_default().to_string(),
            BboxLayout::Split(col) => (col..col + 4)
                .filter_map(|i| record.get(i))
                .collect::<Vec<_>>()
                .join(","),
        };

        let Some([x, y, w, h]) = parse_quad(&quad) else {
            log::warn!("{}:{}: malformed bbox {:?}", csv_path.display(), line, quad);
            continue;
        };

        let label = record.get(label_col).unwrap_or_default();
        seeds.push((path, Annotation::seed(label, x, y, w, h)));
    }

    Ok(seeds)
}

/// Parse "x,y,w,h" (brackets tolerated); extra components are ignored
pub fn parse_quad(text: &str) -> Option<[f64; 4]> {
    let cleaned = text.trim().trim_start_matches('[').trim_end_matches(']');
    let values: Vec<f64> = cleaned
        .split(',')
        .map(|part| {
            part.trim()
                .trim_matches(|c: char| c == '[' || c == ']')
                .parse::<f64>()
        })
        .collect::<std::result::Result<Vec<f64>, _>>()
        .ok()?;

    match values.as_slice() {
        [x, y, w, h, ..] => Some([*x, *y, *w, *h]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_quad() {
        assert_eq!(parse_quad("1,2,3,4"), Some([1.0, 2.0, 3.0, 4.0]));
        assert_eq!(parse_quad("[1.5, 2, 3, 4]"), Some([1.5, 2.0, 3.0, 4.0]));
        assert_eq!(parse_quad("1,2,3"), None);
        assert_eq!(parse_quad("1,two,3,4"), None);
        assert_eq!(parse_quad(""), None);
    }

    #[test]
    fn test_split_columns_and_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::write(root.join("a.png"), b"").unwrap();
        fs::write(
            root.join(BBOX_LIST_NAME),
            "Image Index,Finding Label,Bbox [x,y,w,h],,,\n\
             a.png,Nodule,10,20,30,40\n\
             a.png,Mass,bad,20,30,40\n\
             ghost.png,Mass,1,2,3,4\n\
             ,Mass,1,2,3,4\n",
        )
        .unwrap();

        let csv_path = find_bbox_csv(&root).unwrap();
        let seeds = load_seed_annotations(&csv_path, &root);
        assert_eq!(seeds.len(), 1);
        let (path, ann) = &seeds[0];
        assert!(path.ends_with("a.png"));
        assert_eq!(ann.pathology, "Nodule");
        assert_eq!((ann.x, ann.y, ann.width, ann.height), (10.0, 20.0, 30.0, 40.0));
        assert_eq!(ann.author, "auto_bbox");
        assert_eq!(ann.confidence, 0.5);
    }

    #[test]
    fn test_joined_column() {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir_all(root.join("images")).unwrap();
        fs::write(root.join("images/b.png"), b"").unwrap();
        fs::write(
            root.join(BBOX_LIST_NAME),
            "Image Index,Finding Label,\"Bbox [x,y,w,h]\"\nb.png,Effusion,\"5,6,7,8\"\n",
        )
        .unwrap();

        let seeds = load_seed_annotations(&root.join(BBOX_LIST_NAME), &root);
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].1.pathology, "Effusion");
        assert_eq!(seeds[0].1.height, 8.0);
    }
}
