//! Pathology co-occurrence matrices
//!
//! Rows and columns follow [`PATHOLOGY_ORDER`]. For every image, each
//! ordered pair of distinct vocabulary labels it carries (a label paired
//! with itself included) bumps one cell, so the matrix is symmetric and its
//! diagonal counts the images showing each label.

use crate::color::{pathology_index, PATHOLOGY_ORDER};
use crate::dataset::metadata::parse_pathologies;
use crate::error::Result;
use crate::persist;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Square count matrix over the 14 vocabulary labels
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CooccurrenceMatrix {
    pub labels: Vec<String>,
    pub counts: Vec<Vec<u32>>,
}

impl Default for CooccurrenceMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl CooccurrenceMatrix {
    /// All-zero matrix
    pub fn new() -> Self {
        let n = PATHOLOGY_ORDER.len();
        Self {
            labels: PATHOLOGY_ORDER.iter().map(|p| p.to_string()).collect(),
            counts: vec![vec![0; n]; n],
        }
    }

    /// Count one image's labels; labels outside the vocabulary are ignored
    pub fn add_image<'a>(&mut self, pathologies: impl IntoIterator<Item = &'a str>) {
        let present: BTreeSet<usize> = pathologies
            .into_iter()
            .filter_map(pathology_index)
            .collect();

        for &i in &present {
            for &j in &present {
                self.counts[i][j] += 1;
            }
        }
    }

    /// Count for a pair of labels, `None` if either isn't in the vocabulary
    pub fn get(&self, a: &str, b: &str) -> Option<u32> {
        Some(self.counts[pathology_index(a)?][pathology_index(b)?])
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.counts.len();
        (0..n).all(|i| (0..n).all(|j| self.counts[i][j] == self.counts[j][i]))
    }

    /// Header `"", label_1..label_14`, then one `label_i, counts..` row per label
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec![String::new()];
        header.extend(self.labels.iter().cloned());
        writer.write_record(&header)?;

        for (label, row) in self.labels.iter().zip(&self.counts) {
            let mut record = vec![label.clone()];
            record.extend(row.iter().map(|c| c.to_string()));
            writer.write_record(&record)?;
        }

        writer
            .into_inner()
            .map_err(|e| crate::error::LabelerError::Csv(e.into_error().into()))
    }

    /// Write the matrix as CSV
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        persist::write_atomic(path, &self.to_csv_bytes()?)
    }
}

/// Compute a matrix straight from any CSV file, without a loaded dataset
///
/// Understands a `*Finding*Label*` column (pipe-delimited labels per row)
/// or, failing that, a `Pathology`/`pathology` column with one label per
/// row. Rows are grouped by `Image Index`, `Image`, or the first column.
pub fn cooccurrence_from_csv(csv_path: &Path) -> Result<CooccurrenceMatrix> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(csv_path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut matrix = CooccurrenceMatrix::new();
    if headers.iter().all(String::is_empty) {
        return Ok(matrix);
    }

    let position = |name: &str| headers.iter().position(|h| h == name);
    let image_col = position("Image Index")
        .or_else(|| position("Image"))
        .unwrap_or(0);
    let finding_col = headers.iter().position(|h| {
        let lower = h.to_lowercase();
        lower.contains("finding") && lower.contains("label")
    });
    let pathology_col = position("Pathology").or_else(|| position("pathology"));

    let mut per_image: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for result in reader.records() {
        let record = result?;
        let image = record.get(image_col).unwrap_or_default();
        if image.is_empty() {
            continue;
        }

        let labels: Vec<String> = match (finding_col, pathology_col) {
            (Some(col), _) => parse_pathologies(record.get(col).unwrap_or_default()),
            (None, Some(col)) => vec![record.get(col).unwrap_or_default().to_string()],
            (None, None) => Vec::new(),
        };

        let entry = per_image.entry(image.to_string()).or_default();
        entry.extend(labels.into_iter().filter(|l| pathology_index(l).is_some()));
    }

    for labels in per_image.values() {
        matrix.add_image(labels.iter().map(String::as_str));
    }
    log::info!(
        "Computed co-occurrence over {} images from {}",
        per_image.len(),
        csv_path.display()
    );
    Ok(matrix)
}

/// Optional plugin that draws a matrix as a heatmap image
///
/// Returns `Ok(false)` when it can't produce an image; that means
/// "unavailable", not failure.
pub trait HeatmapRenderer {
    fn render(&self, matrix: &CooccurrenceMatrix, title: &str, output: &Path) -> Result<bool>;
}

/// Heatmap plugin used when none is installed
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHeatmap;

impl HeatmapRenderer for NoHeatmap {
    fn render(&self, _matrix: &CooccurrenceMatrix, _title: &str, output: &Path) -> Result<bool> {
        log::info!("No heatmap renderer available, skipping {}", output.display());
        Ok(false)
    }
}

/// File name of the matrix written by [`export_from_csv_file`]
pub const COOCCURRENCE_CSV_NAME: &str = "cooccurrence_pathologies.csv";

/// File name of the heatmap requested by [`export_from_csv_file`]
pub const HEATMAP_NAME: &str = "cooccurrence_heatmap.png";

/// Compute the matrix of an arbitrary CSV and write it into `output_dir`
///
/// Returns the CSV path and, when `heatmap` could draw one, the image path.
pub fn export_from_csv_file(
    csv_path: &Path,
    output_dir: &Path,
    heatmap: &dyn HeatmapRenderer,
) -> Result<(PathBuf, Option<PathBuf>)> {
    let matrix = cooccurrence_from_csv(csv_path)?;

    let csv_out = output_dir.join(COOCCURRENCE_CSV_NAME);
    matrix.write_csv(&csv_out)?;

    let png_out = output_dir.join(HEATMAP_NAME);
    let drawn = heatmap.render(&matrix, "Co-occurrence matrix (from CSV)", &png_out)?;
    Ok((csv_out, drawn.then_some(png_out)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_add_image_counts_pairs_and_diagonal() {
        let mut matrix = CooccurrenceMatrix::new();
        matrix.add_image(["Atelectasis", "Effusion"]);
        matrix.add_image(["Atelectasis", "Atelectasis", "Hernia", "No Finding"]);

        assert_eq!(matrix.get("Atelectasis", "Atelectasis"), Some(2));
        assert_eq!(matrix.get("Atelectasis", "Effusion"), Some(1));
        assert_eq!(matrix.get("Effusion", "Atelectasis"), Some(1));
        assert_eq!(matrix.get("Hernia", "Hernia"), Some(1));
        assert_eq!(matrix.get("Effusion", "Hernia"), Some(0));
        assert_eq!(matrix.get("No Finding", "Hernia"), None);
        assert!(matrix.is_symmetric());
        assert_eq!(matrix.counts.len(), 14);
        assert!(matrix.counts.iter().all(|row| row.len() == 14));
    }

    #[test]
    fn test_csv_layout() {
        let mut matrix = CooccurrenceMatrix::new();
        matrix.add_image(["Mass"]);
        let text = String::from_utf8(matrix.to_csv_bytes().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 15);
        assert!(lines[0].starts_with(",Atelectasis,Cardiomegaly"));
        assert!(lines[5].starts_with("Mass,0,0,0,0,1,"));
    }

    #[test]
    fn test_from_csv_with_finding_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.csv");
        fs::write(
            &path,
            "Image Index,Finding Labels\n\
             a.png,Atelectasis|Effusion\n\
             b.png,No Finding\n\
             c.png,Effusion|Unknown\n",
        )
        .unwrap();

        let matrix = cooccurrence_from_csv(&path).unwrap();
        assert_eq!(matrix.get("Atelectasis", "Effusion"), Some(1));
        assert_eq!(matrix.get("Effusion", "Effusion"), Some(2));
    }

    #[test]
    fn test_from_csv_with_pathology_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        fs::write(
            &path,
            "Image,Pathology,X,Y,Width,Height,Author,Date,Confidence\n\
             /d/a.png,Mass,0,0,1,1,u,2025-01-01,1.0\n\
             /d/a.png,Nodule,0,0,1,1,u,2025-01-01,1.0\n\
             /d/a.png,Mass,5,5,1,1,u,2025-01-01,1.0\n",
        )
        .unwrap();

        let matrix = cooccurrence_from_csv(&path).unwrap();
        assert_eq!(matrix.get("Mass", "Nodule"), Some(1));
        assert_eq!(matrix.get("Mass", "Mass"), Some(1));
    }

    #[test]
    fn test_no_heatmap_is_unavailable() {
        let matrix = CooccurrenceMatrix::new();
        assert!(!NoHeatmap.render(&matrix, "t", Path::new("/tmp/x.png")).unwrap());
    }

    #[test]
    fn test_export_from_csv_file_without_heatmap() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("entries.csv");
        fs::write(&input, "Image Index,Finding Labels\na.png,Mass|Nodule\n").unwrap();

        let out_dir = dir.path().join("out");
        let (csv_out, png_out) = export_from_csv_file(&input, &out_dir, &NoHeatmap).unwrap();
        assert_eq!(csv_out, out_dir.join(COOCCURRENCE_CSV_NAME));
        assert!(csv_out.exists());
        assert_eq!(png_out, None);
    }
}
