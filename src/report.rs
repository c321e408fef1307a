//! Standalone HTML page of reference images, grouped by pathology

use crate::color::PATHOLOGY_ORDER;
use crate::error::{LabelerError, Result};
use crate::persist;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Images shown per pathology
pub const IMAGES_PER_PATHOLOGY: usize = 8;

const STYLE: &str = "body{font-family:sans-serif;margin:20px;} h1{color:#333;} \
h2{margin-top:24px;color:#555;} .grid{display:flex;flex-wrap:wrap;gap:12px;} \
.cell{text-align:center;} .cell img{max-width:200px;height:auto;border:1px solid #ccc;} \
.cell p{margin:4px 0;font-size:12px;}";

/// One pathology's section of the report
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSection {
    pub pathology: String,
    pub images: Vec<PathBuf>,
}

/// Reference images per vocabulary pathology, in vocabulary order
///
/// Pathologies without a sub-directory or without `*_annotated.png` files
/// are left out.
pub fn collect_sections(reference_root: &Path) -> Vec<ReportSection> {
    PATHOLOGY_ORDER
        .iter()
        .filter_map(|pathology| {
            let dir = reference_root.join(pathology);
            let entries = fs::read_dir(&dir).ok()?;

            let mut images: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    path.is_file()
                        && path
                            .file_name()
                            .is_some_and(|name| name.to_string_lossy().ends_with("_annotated.png"))
                })
                .collect();
            images.sort();
            images.truncate(IMAGES_PER_PATHOLOGY);

            if images.is_empty() {
                None
            } else {
                Some(ReportSection {
                    pathology: pathology.to_string(),
                    images,
                })
            }
        })
        .collect()
}

/// Render the sections as HTML with image sources relative to `report_dir`
pub fn render_html(sections: &[ReportSection], report_dir: &Path) -> String {
    let mut lines = vec![
        "<!DOCTYPE html><html><head><meta charset='utf-8'><title>Localization examples</title>"
            .to_string(),
        format!("<style>{}</style></head><body>", STYLE),
        "<h1>Localization examples by pathology</h1>".to_string(),
        "<p>Reference images with bounding boxes.</p>".to_string(),
    ];

    for section in sections {
        lines.push(format!(
            "<h2>{}</h2><div class='grid'>",
            escape_html(&section.pathology)
        ));
        for image in &section.images {
            let name = image
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let src = relative_path(image, report_dir);
            lines.push(format!(
                "<div class='cell'><img src='{}' alt='{}'/><p>{}</p></div>",
                escape_html(&src.to_string_lossy().replace('\\', "/")),
                escape_html(&name),
                escape_html(&name)
            ));
        }
        lines.push("</div>".to_string());
    }

    lines.push("</body></html>".to_string());
    lines.join("\n")
}

/// Write the report for `reference_root` to `path`
///
/// Returns the number of images referenced.
pub fn write_report(reference_root: &Path, path: &Path) -> Result<usize> {
    let report_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&report_dir).map_err(|e| LabelerError::io(&report_dir, e))?;
    let report_dir = fs::canonicalize(&report_dir).map_err(|e| LabelerError::io(&report_dir, e))?;
    let reference_root =
        fs::canonicalize(reference_root).unwrap_or_else(|_| reference_root.to_path_buf());

    let sections = collect_sections(&reference_root);
    let html = render_html(&sections, &report_dir);
    persist::write_atomic(path, html.as_bytes())?;

    let count = sections.iter().map(|s| s.images.len()).sum();
    log::info!(
        "Wrote localization report with {} images to {}",
        count,
        path.display()
    );
    Ok(count)
}

/// `target` expressed relative to the directory `base`
///
/// Both should be absolute. Falls back to `target` itself when they share
/// no root (e.g. different drives).
pub fn relative_path(target: &Path, base: &Path) -> PathBuf {
    let target_parts: Vec<Component> = target.components().collect();
    let base_parts: Vec<Component> = base.components().collect();

    if target_parts.first() != base_parts.first() {
        return target.to_path_buf();
    }

    let common = target_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &target_parts[common..] {
        relative.push(part.as_os_str());
    }
    relative
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&#39;")
        .replace('"', "&quot;")
}
