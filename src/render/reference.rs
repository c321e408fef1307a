use crate::dataset::discover::DatasetIndex;
use crate::error::{LabelerError, Result};
use crate::persist;
use crate::state::data::{stem_of, Annotation};
use crate::state::store::AnnotationStore;
use ab_glyph::{FontVec, PxScale};
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Suffix of every generated reference image
const ANNOTATED_SUFFIX: &str = "_annotated.png";

/// Box outline thickness in pixels
const BOX_THICKNESS: i32 = 2;

/// Smallest label height in pixels
const MIN_LABEL_SCALE: f32 = 14.0;

/// Padding between the label text and its backplate edge
const LABEL_PADDING: u32 = 3;

/// Renders annotated copies of source images into a reference folder.
///
/// Output is grouped per pathology:
/// `<root>/<Pathology>/<stem>_annotated.png`. Images whose annotations name
/// no pathology land directly in `<root>`.
pub struct ReferenceRenderer {
    root: PathBuf,
    font: Option<FontVec>,
}

impl ReferenceRenderer {
    /// Create a renderer writing under `root`
    ///
    /// Without a usable font the label backplates are still drawn, only
    /// the text is left out.
    pub fn new(root: impl Into<PathBuf>, font_path: Option<&Path>) -> Self {
        let font = font_path.and_then(|path| match fs::read(path) {
            Ok(bytes) => match FontVec::try_from_vec(bytes) {
                Ok(font) => Some(font),
                Err(e) => {
                    log::warn!("Unusable label font {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Could not read label font {}: {}", path.display(), e);
                None
            }
        });

        Self {
            root: root.into(),
            font,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the reference copies of an image go, one per distinct pathology
    pub fn output_paths(&self, image_path: &str, annotations: &[Annotation]) -> Vec<PathBuf> {
        let file_name = format!("{}{}", stem_of(image_path), ANNOTATED_SUFFIX);
        let groups = pathology_groups(annotations);

        if groups.is_empty() {
            return vec![self.root.join(file_name)];
        }
        groups
            .iter()
            .map(|group| self.root.join(group).join(&file_name))
            .collect()
    }

    /// Draw every annotation onto a copy of the image and write it out
    ///
    /// Earlier output for the same image is removed first, even when the
    /// source then fails to decode, so no stale copy is left behind.
    pub fn render(&self, image_path: &str, annotations: &[Annotation]) -> Result<Vec<PathBuf>> {
        self.remove_previous(image_path)?;

        let mut canvas = image::open(image_path)?.to_rgba8();
        draw_annotations(&mut canvas, annotations, self.font.as_ref());

        let mut png = Vec::new();
        canvas.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let outputs = self.output_paths(image_path, annotations);
        for output in &outputs {
            persist::write_atomic(output, &png)?;
        }

        log::debug!(
            "Rendered {} reference image(s) for {}",
            outputs.len(),
            image_path
        );
        Ok(outputs)
    }

    /// Delete `<stem>_annotated.png` from the root and every pathology folder
    pub fn remove_previous(&self, image_path: &str) -> Result<()> {
        let file_name = format!("{}{}", stem_of(image_path), ANNOTATED_SUFFIX);
        if !self.root.exists() {
            return Ok(());
        }

        let mut candidates = vec![self.root.join(&file_name)];
        let entries = fs::read_dir(&self.root).map_err(|e| LabelerError::io(&self.root, e))?;
        for entry in entries.filter_map(|e| e.ok()) {
            if entry.path().is_dir() {
                candidates.push(entry.path().join(&file_name));
            }
        }

        for candidate in candidates.into_iter().filter(|c| c.exists()) {
            fs::remove_file(&candidate).map_err(|e| LabelerError::io(&candidate, e))?;
        }
        Ok(())
    }
}

/// Distinct, non-empty pathology folder names in first-seen order
fn pathology_groups(annotations: &[Annotation]) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    for annotation in annotations {
        let name = folder_name(&annotation.pathology);
        if !name.is_empty() && !groups.contains(&name) {
            groups.push(name);
        }
    }
    groups
}

/// Pathology label made safe to use as a single path component
fn folder_name(pathology: &str) -> String {
    pathology
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

/// Box corners clamped to the canvas as `(x, y, w, h)`
///
/// `None` for boxes with non-finite coordinates or lying wholly off-canvas.
fn clip_to_canvas(annotation: &Annotation, img_w: u32, img_h: u32) -> Option<(i32, i32, u32, u32)> {
    let (x0, x1) = ordered(annotation.x, annotation.x + annotation.width);
    let (y0, y1) = ordered(annotation.y, annotation.y + annotation.height);
    if ![x0, x1, y0, y1].iter().all(|v| v.is_finite()) {
        return None;
    }

    let (max_x, max_y) = (f64::from(img_w), f64::from(img_h));
    if x1 < 0.0 || y1 < 0.0 || x0 >= max_x || y0 >= max_y {
        return None;
    }

    let left = x0.max(0.0).round();
    let top = y0.max(0.0).round();
    let right = x1.min(max_x).round();
    let bottom = y1.min(max_y).round();
    Some((
        left as i32,
        top as i32,
        (right - left).max(1.0) as u32,
        (bottom - top).max(1.0) as u32,
    ))
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Burn boxes and labels into `canvas`
pub fn draw_annotations(canvas: &mut RgbaImage, annotations: &[Annotation], font: Option<&FontVec>) {
    let (img_w, img_h) = canvas.dimensions();
    if img_w == 0 || img_h == 0 {
        return;
    }
    let scale = PxScale::from((img_h as f32 / 60.0).max(MIN_LABEL_SCALE));

    for annotation in annotations {
        let color = annotation.display_color();
        let pixel = Rgba(color.channels());

        let Some((x, y, w, h)) = clip_to_canvas(annotation, img_w, img_h) else {
            log::debug!("Skipping box outside the image: {}", annotation.label());
            continue;
        };

        for inset in 0..BOX_THICKNESS {
            let inner_w = w.saturating_sub(2 * inset as u32).max(1);
            let inner_h = h.saturating_sub(2 * inset as u32).max(1);
            draw_hollow_rect_mut(
                canvas,
                Rect::at(x + inset, y + inset).of_size(inner_w, inner_h),
                pixel,
            );
        }

        // Label backplate sits above the box, or just inside it at the top edge
        let text = annotation.label();
        let (text_w, text_h) = match font {
            Some(font) => text_size(scale, font, &text),
            None => (
                (text.chars().count() as f32 * scale.x * 0.55) as u32,
                scale.y as u32,
            ),
        };
        let plate_w = text_w + 2 * LABEL_PADDING;
        let plate_h = text_h + 2 * LABEL_PADDING;
        let plate_y = if y >= plate_h as i32 { y - plate_h as i32 } else { y.max(0) };

        draw_filled_rect_mut(
            canvas,
            Rect::at(x, plate_y).of_size(plate_w.max(1), plate_h.max(1)),
            pixel,
        );

        if let Some(font) = font {
            let text_color = Rgba(color.contrasting().channels());
            draw_text_mut(
                canvas,
                text_color,
                x + LABEL_PADDING as i32,
                plate_y + LABEL_PADDING as i32,
                scale,
                font,
                &text,
            );
        }
    }
}

/// One entry of a bundled `<Pathology>.json` example file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BundledExample {
    pub image_stem: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// An image shown as a reference for a pathology, with its matching boxes
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReferenceExample {
    pub image_path: String,
    pub annotations: Vec<Annotation>,
}

/// Find up to `limit` example images for `pathology`
///
/// Search order:
/// 1. other images in the live store with an annotation of that pathology
/// 2. the bundled `<examples_dir>/<pathology>.json`, matched by image stem
/// 3. the excluded image itself, when nothing else turned up
///
/// The last step means an image can be its own reference when it is the
/// only example of the pathology.
pub fn find_reference_examples(
    pathology: &str,
    limit: usize,
    exclude: Option<&str>,
    index: &DatasetIndex,
    store: &AnnotationStore,
    examples_dir: &Path,
) -> Vec<ReferenceExample> {
    let mut found: Vec<ReferenceExample> = Vec::new();
    if limit == 0 {
        return found;
    }

    let matching = |annotations: &[Annotation]| -> Vec<Annotation> {
        annotations
            .iter()
            .filter(|a| a.pathology == pathology)
            .cloned()
            .collect()
    };

    for record in index.images() {
        if found.len() >= limit {
            return found;
        }
        if Some(record.path.as_str()) == exclude {
            continue;
        }
        let annotations = matching(store.get(&record.path));
        if !annotations.is_empty() {
            found.push(ReferenceExample {
                image_path: record.path.clone(),
                annotations,
            });
        }
    }

    for example in load_bundled_examples(examples_dir, pathology) {
        if found.len() >= limit {
            return found;
        }
        let Some(record) = index.find_by_stem(&example.image_stem) else {
            continue;
        };
        if Some(record.path.as_str()) == exclude
            || found.iter().any(|f| f.image_path == record.path)
        {
            continue;
        }
        let annotations = matching(&example.annotations);
        found.push(ReferenceExample {
            image_path: record.path.clone(),
            annotations: if annotations.is_empty() {
                example.annotations
            } else {
                annotations
            },
        });
    }

    if found.is_empty() {
        if let Some(own_path) = exclude {
            let annotations = matching(store.get(own_path));
            if !annotations.is_empty() {
                found.push(ReferenceExample {
                    image_path: own_path.to_string(),
                    annotations,
                });
            }
        }
    }

    found
}

/// Read `<examples_dir>/<pathology>.json`; missing or broken files give nothing
pub fn load_bundled_examples(examples_dir: &Path, pathology: &str) -> Vec<BundledExample> {
    let path = examples_dir.join(format!("{}.json", folder_name(pathology)));
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(_) => return Vec::new(),
    };

    match serde_json::from_str(&text) {
        Ok(examples) => examples,
        Err(e) => {
            log::warn!("Ignoring malformed example file {}: {}", path.display(), e);
            Vec::new()
        }
    }
}
