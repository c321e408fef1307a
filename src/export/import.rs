//! Import of previously exported JSON or CSV files back into the store
//!
//! Both formats are parsed completely before the store is touched, so a
//! malformed file never leaves a partial import behind.

use super::csv::CSV_HEADER;
use super::json;
use crate::error::{LabelerError, Result};
use crate::state::data::Annotation;
use crate::state::store::AnnotationStore;
use std::collections::HashMap;
use std::path::Path;

/// Import result with statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub images: usize,
    pub annotations: usize,
    /// Image keys that are not part of the loaded dataset
    pub unknown_images: usize,
}

/// Import `path` into `store`, choosing the format by extension
///
/// JSON replaces each listed image's sequence; CSV appends rows.
/// `is_known` tells whether an image key belongs to the loaded dataset.
pub fn import(
    path: &Path,
    store: &mut AnnotationStore,
    is_known: impl Fn(&str) -> bool,
) -> Result<ImportSummary> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let summary = match extension.as_str() {
        "json" => import_json(path, store, &is_known)?,
        "csv" => import_csv(path, store, &is_known)?,
        _ => return Err(LabelerError::UnsupportedImport(path.to_path_buf())),
    };

    log::info!(
        "Imported {} annotations for {} images from {}",
        summary.annotations,
        summary.images,
        path.display()
    );
    Ok(summary)
}

fn import_json(
    path: &Path,
    store: &mut AnnotationStore,
    is_known: &impl Fn(&str) -> bool,
) -> Result<ImportSummary> {
    let parsed = json::read(path)?;
    let mut summary = ImportSummary::default();

    for (image_path, entry) in parsed {
        if !is_known(&image_path) {
            log::warn!("Imported image {} is not part of the dataset", image_path);
            summary.unknown_images += 1;
        }
        summary.images += 1;
        summary.annotations += entry.annotations.len();
        store.set(&image_path, entry.annotations);
    }

    Ok(summary)
}

/// Column positions of the fixed layout, looked up by header name
struct Columns {
    image: usize,
    pathology: usize,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    author: Option<usize>,
    date: Option<usize>,
    confidence: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &::csv::StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let require = |name: &'static str| {
            find(name).ok_or(LabelerError::InvalidRecord {
                line: 1,
                field: name,
                value: "<missing column>".to_string(),
            })
        };

        Ok(Columns {
            image: require(CSV_HEADER[0])?,
            pathology: require(CSV_HEADER[1])?,
            x: require(CSV_HEADER[2])?,
            y: require(CSV_HEADER[3])?,
            width: require(CSV_HEADER[4])?,
            height: require(CSV_HEADER[5])?,
            author: find(CSV_HEADER[6]),
            date: find(CSV_HEADER[7]),
            confidence: find(CSV_HEADER[8]),
        })
    }
}

fn parse_number(record: &::csv::StringRecord, index: usize, field: &'static str, line: u64) -> Result<f64> {
    let raw = record.get(index).unwrap_or("").trim();
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        // NaN and infinities parse fine but cannot be written back as JSON
        _ => Err(LabelerError::InvalidRecord {
            line,
            field,
            value: raw.to_string(),
        }),
    }
}

/// Parse every row of an annotation CSV without touching any store
pub fn read_csv(path: &Path) -> Result<Vec<(String, Annotation)>> {
    let mut reader = ::csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;
    let columns = Columns::from_headers(reader.headers()?)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let image = record.get(columns.image).unwrap_or("").trim().to_string();
        if image.is_empty() {
            return Err(LabelerError::InvalidRecord {
                line,
                field: "Image",
                value: String::new(),
            });
        }

        let x = parse_number(&record, columns.x, "X", line)?;
        let y = parse_number(&record, columns.y, "Y", line)?;
        let width = parse_number(&record, columns.width, "Width", line)?;
        let height = parse_number(&record, columns.height, "Height", line)?;

        let text = |column: Option<usize>| {
            column
                .and_then(|i| record.get(i))
                .unwrap_or("")
                .to_string()
        };
        let pathology = record.get(columns.pathology).unwrap_or("").trim().to_string();

        let mut annotation = Annotation::new_box(pathology, x, y, width, height, text(columns.author));
        let date = text(columns.date);
        if !date.is_empty() {
            annotation.date = date;
        }
        if let Some(index) = columns.confidence {
            if record.get(index).is_some_and(|c| !c.trim().is_empty()) {
                annotation.confidence = parse_number(&record, index, "Confidence", line)?;
            }
        }

        rows.push((image, annotation));
    }

    Ok(rows)
}

fn import_csv(
    path: &Path,
    store: &mut AnnotationStore,
    is_known: &impl Fn(&str) -> bool,
) -> Result<ImportSummary> {
    let rows = read_csv(path)?;
    let mut per_image: HashMap<String, usize> = HashMap::new();

    for (image_path, annotation) in rows {
        *per_image.entry(image_path.clone()).or_insert(0) += 1;
        store.add(&image_path, annotation);
    }

    let unknown_images = per_image.keys().filter(|p| !is_known(p)).count();
    for image_path in per_image.keys().filter(|p| !is_known(p)) {
        log::warn!("Imported image {} is not part of the dataset", image_path);
    }

    Ok(ImportSummary {
        images: per_image.len(),
        annotations: per_image.values().sum(),
        unknown_images,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn known(_: &str) -> bool {
        true
    }

    #[test]
    fn test_unsupported_extension() {
        let mut store = AnnotationStore::new("/tmp/unused");
        let result = import(Path::new("/tmp/annotations.xml"), &mut store, known);
        assert!(matches!(result, Err(LabelerError::UnsupportedImport(_))));
    }

    #[test]
    fn test_csv_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("in.csv");
        fs::write(
            &csv_path,
            "Image,Pathology,X,Y,Width,Height,Author,Date,Confidence\n\
             /a.png,Mass,1,2,3,4,bob,2024-05-01T10:00:00,0.5\n\
             /a.png,Edema,5,6,7,8,bob,,\n",
        )
        .unwrap();

        let mut store = AnnotationStore::new(dir.path().join("ann"));
        store.add("/a.png", Annotation::new_box("Nodule", 0.0, 0.0, 1.0, 1.0, "me"));

        let summary = import(&csv_path, &mut store, known).unwrap();
        assert_eq!(summary.annotations, 2);
        assert_eq!(summary.images, 1);

        let seq = store.get("/a.png");
        assert_eq!(seq.len(), 3);
        assert_eq!(seq[1].pathology, "Mass");
        assert_eq!(seq[1].confidence, 0.5);
        assert_eq!(seq[1].date, "2024-05-01T10:00:00");
        assert_eq!(seq[2].confidence, 1.0);
    }

    #[test]
    fn test_csv_bad_number_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("bad.csv");
        fs::write(
            &csv_path,
            "Image,Pathology,X,Y,Width,Height,Author,Date,Confidence\n\
             /a.png,Mass,1,2,3,4,bob,,1\n\
             /b.png,Mass,abc,2,3,4,bob,,1\n",
        )
        .unwrap();

        let mut store = AnnotationStore::new(dir.path().join("ann"));
        let result = import(&csv_path, &mut store, known);
        match result {
            Err(LabelerError::InvalidRecord { line, field, value }) => {
                assert_eq!(line, 3);
                assert_eq!(field, "X");
                assert_eq!(value, "abc");
            }
            other => panic!("expected InvalidRecord, got {:?}", other),
        }
        assert_eq!(store.total_annotations(), 0);
    }

    #[test]
    fn test_csv_non_finite_number_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("nan.csv");
        fs::write(
            &csv_path,
            "Image,Pathology,X,Y,Width,Height,Author,Date,Confidence\n\
             /a.png,Nodule,NaN,0,1,1,bob,,1\n",
        )
        .unwrap();

        let mut store = AnnotationStore::new(dir.path().join("ann"));
        store.add("/a.png", Annotation::new_box("Mass", 1.0, 1.0, 2.0, 2.0, "alice"));
        let result = import(&csv_path, &mut store, known);
        assert!(matches!(
            result,
            Err(LabelerError::InvalidRecord { line: 2, field: "X", ref value }) if value == "NaN"
        ));
        assert_eq!(store.total_annotations(), 1);

        fs::write(
            &csv_path,
            "Image,Pathology,X,Y,Width,Height,Author,Date,Confidence\n\
             /a.png,Nodule,0,0,inf,1,bob,,1\n\
             /a.png,Nodule,0,0,1,1,bob,,-inf\n",
        )
        .unwrap();
        let result = import(&csv_path, &mut store, known);
        assert!(matches!(
            result,
            Err(LabelerError::InvalidRecord { field: "Width", .. })
        ));
        assert_eq!(store.get("/a.png").len(), 1);
    }

    #[test]
    fn test_json_replaces_sequence_and_counts_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("in.json");
        fs::write(
            &json_path,
            r#"{
                "/a.png": {"metadata": {}, "annotations": [
                    {"type": "box", "x": 0, "y": 0, "width": 10, "height": 10,
                     "pathology": "Nodule", "author": "alice", "date": "", "confidence": 1.0}
                ]},
                "/elsewhere.png": {"annotations": []}
            }"#,
        )
        .unwrap();

        let mut store = AnnotationStore::new(dir.path().join("ann"));
        store.add("/a.png", Annotation::new_box("Mass", 0.0, 0.0, 1.0, 1.0, "me"));
        store.add("/a.png", Annotation::new_box("Mass", 0.0, 0.0, 1.0, 1.0, "me"));

        let summary = import(&json_path, &mut store, |p: &str| p == "/a.png").unwrap();
        assert_eq!(summary.unknown_images, 1);
        assert_eq!(store.get("/a.png").len(), 1);
        assert_eq!(store.get("/a.png")[0].pathology, "Nodule");
    }

    #[test]
    fn test_malformed_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("broken.json");
        fs::write(&json_path, "{ not json").unwrap();

        let mut store = AnnotationStore::new(dir.path().join("ann"));
        let result = import(&json_path, &mut store, known);
        assert!(matches!(result, Err(LabelerError::Json { .. })));
    }
}
