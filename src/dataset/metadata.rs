//! Per-image metadata from Data_Entry-style CSVs
//!
//! Datasets are messy: the CSV may be missing, unreadable, cover a superset
//! of the images on disk, or use a generic schema. None of that aborts a
//! load. Images the CSV doesn't describe get synthesized metadata.

use super::resolve_image;
use crate::color::NO_FINDING;
use crate::error::Result;
use crate::state::data::{file_name_of, ImageRecord, Metadata};
use chrono::{Duration, Local, NaiveDate};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Column names accepted for each metadata field, in order of preference
const IMAGE_COLUMNS: [&str; 2] = ["Image Index", "filename"];
const FINDING_COLUMNS: [&str; 2] = ["Finding Labels", "Finding Label"];
const PATIENT_ID_COLUMN: &str = "Patient ID";
const AGE_COLUMN: &str = "Patient Age";
const SEX_COLUMN: &str = "Patient Gender";
const VIEW_COLUMN: &str = "View Position";
const FOLLOW_UP_COLUMN: &str = "Follow-up #";

/// Preferred metadata CSV name fragment
const DATA_ENTRY_MARKER: &str = "Data_Entry";

/// Synthetic study dates count follow-up days from this date
pub fn follow_up_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default()
}

/// Build the metadata map for every discovered image
///
/// Always returns exactly one entry per image in `images`.
pub fn load_metadata(
    dataset_root: &Path,
    metadata_root: &Path,
    images: &[ImageRecord],
) -> HashMap<String, Metadata> {
    let mut metadata = match find_metadata_csv(metadata_root) {
        Some(csv_path) => {
            log::info!("Loading metadata from {}", csv_path.display());
            match parse_metadata_csv(&csv_path, dataset_root) {
                Ok(parsed) => parsed,
                Err(e) => {
                    log::warn!(
                        "Could not read metadata CSV {}: {}; using defaults",
                        csv_path.display(),
                        e
                    );
                    HashMap::new()
                }
            }
        }
        None => {
            log::info!("No metadata CSV under {}; using defaults", metadata_root.display());
            HashMap::new()
        }
    };

    // Drop rows for files outside the discovered set, fill the gaps
    let known: HashSet<&str> = images.iter().map(|r| r.path.as_str()).collect();
    metadata.retain(|path, _| known.contains(path.as_str()));

    let mut synthesized = 0;
    for record in images {
        metadata.entry(record.path.clone()).or_insert_with(|| {
            synthesized += 1;
            synthesize_metadata(&record.path)
        });
    }
    if synthesized > 0 {
        log::info!("Synthesized default metadata for {} images", synthesized);
    }

    metadata
}

/// Pick the metadata CSV under `metadata_root`
///
/// Candidates are sorted by path so the choice is deterministic: the first
/// file whose name contains "Data_Entry", otherwise the first CSV.
pub fn find_metadata_csv(metadata_root: &Path) -> Option<PathBuf> {
    let candidates = find_csv_files(metadata_root);

    candidates
        .iter()
        .find(|path| file_name_of(&path.to_string_lossy()).contains(DATA_ENTRY_MARKER))
        .or_else(|| candidates.first())
        .cloned()
}

/// All `.csv` files under `root`, sorted by path
pub fn find_csv_files(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    found.sort();
    found
}

/// Header positions of the columns we understand
#[derive(Debug, Default)]
struct MetadataColumns {
    image: Option<usize>,
    findings: Option<usize>,
    patient_id: Option<usize>,
    age: Option<usize>,
    sex: Option<usize>,
    view: Option<usize>,
    follow_up: Option<usize>,
}

impl MetadataColumns {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let find = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| headers.iter().position(|h| h.trim() == *name))
        };

        Self {
            image: find(&IMAGE_COLUMNS),
            findings: find(&FINDING_COLUMNS),
            patient_id: find(&[PATIENT_ID_COLUMN]),
            age: find(&[AGE_COLUMN]),
            sex: find(&[SEX_COLUMN]),
            view: find(&[VIEW_COLUMN]),
            follow_up: find(&[FOLLOW_UP_COLUMN]),
        }
    }
}

/// Parse a metadata CSV into a map keyed by canonical image path
///
/// Rows naming images that exist neither under `dataset_root` nor under
/// `dataset_root/images` are skipped.
pub fn parse_metadata_csv(csv_path: &Path, dataset_root: &Path) -> Result<HashMap<String, Metadata>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(csv_path)?;

    let columns = MetadataColumns::from_headers(reader.headers()?);
    let Some(image_col) = columns.image else {
        log::warn!(
            "{} has no 'Image Index' or 'filename' column",
            csv_path.display()
        );
        return Ok(HashMap::new());
    };

    let field = |record: &csv::StringRecord, col: Option<usize>| -> String {
        col.and_then(|i| record.get(i)).unwrap_or_default().to_string()
    };

    let mut metadata = HashMap::new();
    let mut skipped = 0usize;

    for result in reader.records() {
        let record = result?;
        let name = record.get(image_col).unwrap_or_default();

        let Some(path) = resolve_image(dataset_root, name) else {
            skipped += 1;
            continue;
        };

        let entry = Metadata {
            patient_id: field(&record, columns.patient_id),
            age: field(&record, columns.age),
            sex: field(&record, columns.sex),
            view: field(&record, columns.view),
            date: follow_up_date(&field(&record, columns.follow_up)),
            pathologies: parse_pathologies(&field(&record, columns.findings)),
            filename: name.to_string(),
        };
        metadata.insert(path, entry);
    }

    if skipped > 0 {
        log::debug!(
            "{}: {} rows did not match an image on disk",
            csv_path.display(),
            skipped
        );
    }

    Ok(metadata)
}

/// Split a pipe-delimited finding field into canonical labels
///
/// "No Finding" and empty fields give an empty list.
pub fn parse_pathologies(field: &str) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for token in field.split('|').map(str::trim) {
        if token.is_empty() || token == NO_FINDING {
            continue;
        }
        if !labels.iter().any(|l| l == token) {
            labels.push(token.to_string());
        }
    }
    labels
}

/// Turn a follow-up number into an ISO date counted from 2000-01-01
///
/// Anything that isn't a non-negative integer falls back to today.
pub fn follow_up_date(field: &str) -> String {
    let date = field
        .trim()
        .parse::<u32>()
        .ok()
        .and_then(|days| follow_up_epoch().checked_add_signed(Duration::days(i64::from(days))))
        .unwrap_or_else(|| Local::now().date_naive());
    date.format("%Y-%m-%d").to_string()
}

/// Default metadata for an image no CSV describes
pub fn synthesize_metadata(path: &str) -> Metadata {
    Metadata {
        patient_id: pseudo_patient_id(path),
        age: String::new(),
        sex: String::new(),
        view: String::new(),
        date: file_date(Path::new(path)),
        pathologies: Vec::new(),
        filename: file_name_of(path),
    }
}

/// Deterministic patient id for synthesized metadata
///
/// NIH patient ids are purely numeric, so the `SYN-` prefix can't collide.
pub fn pseudo_patient_id(path: &str) -> String {
    // FNV-1a, stable across runs and platforms
    let mut hash: u32 = 0x811c_9dc5;
    for byte in path.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    format!("SYN-{:08x}", hash)
}

/// Modification date of a file, or the follow-up epoch when unavailable
fn file_date(path: &Path) -> String {
    let date = fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|time| chrono::DateTime::<Local>::from(time).date_naive())
        .unwrap_or_else(|_| follow_up_epoch());
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pathologies() {
        assert_eq!(
            parse_pathologies("Atelectasis|Effusion"),
            vec!["Atelectasis".to_string(), "Effusion".to_string()]
        );
        assert_eq!(parse_pathologies(" Mass | |Mass|Nodule "), vec!["Mass", "Nodule"]);
        assert!(parse_pathologies("No Finding").is_empty());
        assert!(parse_pathologies("").is_empty());
    }

    #[test]
    fn test_follow_up_date() {
        assert_eq!(follow_up_date("0"), "2000-01-01");
        assert_eq!(follow_up_date("1"), "2000-01-02");
        assert_eq!(follow_up_date("366"), "2001-01-01");

        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        assert_eq!(follow_up_date("n/a"), today);
    }

    #[test]
    fn test_pseudo_patient_id_is_deterministic() {
        let a = pseudo_patient_id("/data/a.png");
        assert_eq!(a, pseudo_patient_id("/data/a.png"));
        assert_ne!(a, pseudo_patient_id("/data/b.png"));
        assert!(a.starts_with("SYN-"));
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn test_prefers_data_entry_csv() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("aaa.csv"), "x\n").unwrap();
        fs::create_dir_all(dir.path().join("meta")).unwrap();
        fs::write(dir.path().join("meta/Data_Entry_2017.csv"), "x\n").unwrap();

        let chosen = find_metadata_csv(dir.path()).unwrap();
        assert!(chosen.ends_with("meta/Data_Entry_2017.csv"));
    }

    #[test]
    fn test_falls_back_to_first_csv_by_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("zeta.csv"), "x\n").unwrap();
        fs::write(dir.path().join("alpha.csv"), "x\n").unwrap();

        let chosen = find_metadata_csv(dir.path()).unwrap();
        assert!(chosen.ends_with("alpha.csv"));
        assert!(find_metadata_csv(&dir.path().join("missing")).is_none());
    }

    #[test]
    fn test_generic_schema_and_images_subfolder() {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir_all(root.join("images")).unwrap();
        fs::write(root.join("images/x.png"), b"").unwrap();
        fs::write(
            root.join("list.csv"),
            "filename,Finding Label,Patient ID\nx.png,Nodule,42\nghost.png,Mass,43\n",
        )
        .unwrap();

        let parsed = parse_metadata_csv(&root.join("list.csv"), &root).unwrap();
        assert_eq!(parsed.len(), 1);
        let meta = parsed.values().next().unwrap();
        assert_eq!(meta.pathologies, vec!["Nodule"]);
        assert_eq!(meta.patient_id, "42");
        assert_eq!(meta.filename, "x.png");
    }

    #[test]
    fn test_unreadable_csv_degrades_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::write(root.join("a.png"), b"").unwrap();
        // Invalid UTF-8 makes the csv reader fail on the header row
        fs::write(root.join("Data_Entry_broken.csv"), [0xff, 0xfe, 0x00, 0x81]).unwrap();

        let images = vec![ImageRecord::new(root.join("a.png").to_string_lossy())];
        let metadata = load_metadata(&root, &root, &images);
        assert_eq!(metadata.len(), 1);
        assert!(metadata[&images[0].path].patient_id.starts_with("SYN-"));
    }
}
