//! Whole-file writes that never leave a half-written file behind
//!
//! Content goes to a sibling `.tmp` file first and is renamed over the
//! destination once fully flushed.

use crate::error::{LabelerError, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write `bytes` to `path`, creating parent directories as needed
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| LabelerError::io(parent, e))?;
        }
    }

    let tmp = temp_path_for(path);
    let mut file = File::create(&tmp).map_err(|e| LabelerError::io(&tmp, e))?;
    file.write_all(bytes).map_err(|e| LabelerError::io(&tmp, e))?;
    file.sync_all().map_err(|e| LabelerError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        LabelerError::io(path, e)
    })
}

/// Pretty-print `value` as JSON into `path`
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| LabelerError::json(path, e))?;
    write_atomic(path, json.as_bytes())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
