use super::data::{Annotation, ImageRecord, Metadata};
use super::edit::EditHistory;
use super::store::AnnotationStore;
use crate::analytics::cooccurrence::{CooccurrenceMatrix, HeatmapRenderer};
use crate::analytics::filter::{filter_images, FilterCriteria};
use crate::analytics::stats::Statistics;
use crate::config::Config;
use crate::dataset::discover::{canonical_string, DatasetIndex};
use crate::dataset::{bbox_seed, metadata};
use crate::error::{LabelerError, Result};
use crate::export::import::{self, ImportSummary};
use crate::export::{self, ExportFormat, ExportSummary};
use crate::render::reference::{find_reference_examples, ReferenceExample, ReferenceRenderer};
use crate::report;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// The Library is the data manager behind the labeling tool.
///
/// It owns the loaded dataset (discovered images and their metadata), the
/// annotation store, the edit history and the reference-image renderer.
/// Presentation code calls into it and never touches those pieces directly.
pub struct Library {
    config: Config,
    index: DatasetIndex,
    metadata: HashMap<String, Metadata>,
    store: AnnotationStore,
    history: EditHistory,
    current: usize,
    renderer: ReferenceRenderer,
}

impl Library {
    /// Create an empty Library and make sure its working directories exist.
    ///
    /// With the default configuration the directories live in the user's
    /// data directory:
    /// - Linux: ~/.local/share/radiograph-labeler/
    /// - macOS: ~/Library/Application Support/radiograph-labeler/
    /// - Windows: %APPDATA%\radiograph-labeler\
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        for dir in [&config.annotations_dir, &config.reference_images_dir] {
            fs::create_dir_all(dir).map_err(|e| LabelerError::io(dir, e))?;
        }
        log::info!(
            "Annotations stored in {}, reference images in {}",
            config.annotations_dir.display(),
            config.reference_images_dir.display()
        );

        let renderer = ReferenceRenderer::new(
            config.reference_images_dir.clone(),
            config.label_font.as_deref(),
        );
        let store = AnnotationStore::new(config.annotations_dir.clone());

        Ok(Library {
            config,
            index: DatasetIndex::default(),
            metadata: HashMap::new(),
            store,
            history: EditHistory::new(),
            current: 0,
            renderer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load a dataset folder, replacing whatever was loaded before.
    ///
    /// Order matters: images are discovered, metadata is attached, NIH
    /// bounding boxes are seeded, and finally every saved annotation file is
    /// read back, overriding the seeds of the images it covers. A missing
    /// folder simply gives an empty dataset.
    ///
    /// Returns the number of images found.
    pub fn load_dataset(&mut self, root: &Path) -> usize {
        self.store.clear();
        self.history.clear();
        self.current = 0;

        self.index = DatasetIndex::load(root);
        self.metadata = metadata::load_metadata(
            self.index.root(),
            self.index.metadata_root(),
            self.index.images(),
        );

        if let Some(bbox_csv) = bbox_seed::find_bbox_csv(self.index.metadata_root()) {
            for (path, annotation) in bbox_seed::load_seed_annotations(&bbox_csv, self.index.root()) {
                if self.index.contains(&path) {
                    self.store.add(&path, annotation);
                } else {
                    log::debug!("Seed box for {} is outside the dataset", path);
                }
            }
        }

        let mut restored = 0;
        for record in self.index.images() {
            match self.store.load_saved(&record.path) {
                Ok(true) => restored += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Skipping saved annotations for {}: {}", record.path, e),
            }
        }
        if restored > 0 {
            log::info!("Restored saved annotations for {} images", restored);
        }

        self.index.len()
    }

    pub fn index(&self) -> &DatasetIndex {
        &self.index
    }

    /// Discovered images in path order
    pub fn images(&self) -> &[ImageRecord] {
        self.index.images()
    }

    pub fn metadata(&self) -> &HashMap<String, Metadata> {
        &self.metadata
    }

    pub fn metadata_for(&self, image_path: &str) -> Option<&Metadata> {
        self.metadata.get(image_path)
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    /// Annotations of an image, empty when it has none
    pub fn annotations(&self, image_path: &str) -> &[Annotation] {
        self.store.get(image_path)
    }

    // ---- navigation ----

    /// Image the user is looking at, `None` when nothing is loaded
    pub fn current_image(&self) -> Option<&str> {
        self.index
            .images()
            .get(self.current)
            .map(|record| record.path.as_str())
    }

    /// Move to the next image, staying on the last one
    pub fn next_image(&mut self) -> Option<&str> {
        if self.current + 1 < self.index.len() {
            self.current += 1;
        }
        self.current_image()
    }

    /// Move to the previous image, staying on the first one
    pub fn previous_image(&mut self) -> Option<&str> {
        self.current = self.current.saturating_sub(1);
        self.current_image()
    }

    /// Jump to an image of the dataset; false if it isn't part of it
    pub fn go_to(&mut self, image_path: &str) -> bool {
        match self.index.position(image_path) {
            Some(position) => {
                self.current = position;
                true
            }
            None => false,
        }
    }

    // ---- editing ----

    /// Append an annotation and record the change for undo
    pub fn add_annotation(&mut self, image_path: &str, annotation: Annotation) {
        let before = self.store.get(image_path).to_vec();
        self.store.add(image_path, annotation);
        self.record_edit(image_path, &before);
    }

    /// Append a freshly drawn box authored by the configured default author
    pub fn add_box(
        &mut self,
        image_path: &str,
        pathology: &str,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) {
        let annotation = Annotation::new_box(
            pathology,
            x,
            y,
            width,
            height,
            self.config.default_author.as_str(),
        );
        self.add_annotation(image_path, annotation);
    }

    /// Replace the annotation at `index`; an invalid index changes nothing
    pub fn update_annotation(
        &mut self,
        image_path: &str,
        index: usize,
        annotation: Annotation,
    ) -> Result<()> {
        let before = self.store.get(image_path).to_vec();
        self.store.update(image_path, index, annotation)?;
        self.record_edit(image_path, &before);
        Ok(())
    }

    /// Remove the annotation at `index`; an invalid index changes nothing
    pub fn delete_annotation(&mut self, image_path: &str, index: usize) -> Result<Annotation> {
        let before = self.store.get(image_path).to_vec();
        let removed = self.store.delete(image_path, index)?;
        self.record_edit(image_path, &before);
        Ok(removed)
    }

    fn record_edit(&mut self, image_path: &str, before: &[Annotation]) {
        self.history.record(image_path, before);
        self.history.record(image_path, self.store.get(image_path));
    }

    /// Restore the previous snapshot; returns the image it applied to
    ///
    /// Snapshots that match the store already (the "before" state recorded
    /// when editing switches to another image) are stepped over.
    pub fn undo(&mut self) -> Option<String> {
        while let Some(snapshot) = self.history.undo() {
            if self.store.get(&snapshot.image_path) != snapshot.annotations.as_slice() {
                let snapshot = snapshot.clone();
                self.store.set(&snapshot.image_path, snapshot.annotations);
                return Some(snapshot.image_path);
            }
        }
        None
    }

    /// Re-apply an undone snapshot; returns the image it applied to
    pub fn redo(&mut self) -> Option<String> {
        while let Some(snapshot) = self.history.redo() {
            if self.store.get(&snapshot.image_path) != snapshot.annotations.as_slice() {
                let snapshot = snapshot.clone();
                self.store.set(&snapshot.image_path, snapshot.annotations);
                return Some(snapshot.image_path);
            }
        }
        None
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ---- persistence ----

    /// Save an image's annotations and refresh its reference images.
    ///
    /// A failed render is only logged; the annotation file is what counts.
    pub fn save_annotations(&self, image_path: &str) -> Result<PathBuf> {
        let unit = self.store.save(image_path, self.metadata.get(image_path))?;

        let annotations = self.store.get(image_path);
        let rendered = if annotations.is_empty() {
            self.renderer.remove_previous(image_path).map(|_| Vec::new())
        } else {
            self.renderer.render(image_path, annotations)
        };
        if let Err(e) = rendered {
            log::warn!("Could not render reference images for {}: {}", image_path, e);
        }

        Ok(unit)
    }

    /// Save every dataset image the store holds a sequence for
    ///
    /// Imported keys outside the dataset stay in memory only: units are
    /// named by stem, so saving them could overwrite a dataset image's unit.
    /// Returns how many files were written.
    pub fn save_all(&self) -> Result<usize> {
        let mut paths: Vec<&String> = self
            .store
            .iter()
            .map(|(path, _)| path)
            .filter(|path| {
                let known = self.index.contains(path);
                if !known {
                    log::warn!("Not saving {}: image is not part of the dataset", path);
                }
                known
            })
            .collect();
        paths.sort();
        for path in &paths {
            self.save_annotations(path)?;
        }
        Ok(paths.len())
    }

    // ---- lookup & analytics ----

    /// Example images showing `pathology`, see [`find_reference_examples`]
    pub fn reference_examples(
        &self,
        pathology: &str,
        limit: usize,
        exclude: Option<&str>,
    ) -> Vec<ReferenceExample> {
        let exclude = exclude.map(|path| canonical_string(Path::new(path)));
        find_reference_examples(
            pathology,
            limit,
            exclude.as_deref(),
            &self.index,
            &self.store,
            &self.config.reference_examples_dir,
        )
    }

    pub fn statistics(&self) -> Statistics {
        Statistics::compute(self.index.len(), &self.store)
    }

    /// Paths of the images matching `criteria`, in discovery order
    pub fn filter_images(&self, criteria: &FilterCriteria) -> Vec<String> {
        filter_images(self.index.images(), &self.metadata, &self.store, criteria)
    }

    /// Pathology co-occurrence over the dataset.
    ///
    /// Each image contributes its metadata findings. Unless `from_csv_only`
    /// is set, an image without metadata findings contributes the
    /// pathologies of its annotations instead.
    pub fn cooccurrence(&self, from_csv_only: bool) -> CooccurrenceMatrix {
        let mut matrix = CooccurrenceMatrix::new();

        for record in self.index.images() {
            let findings: Vec<&str> = self
                .metadata
                .get(&record.path)
                .map(|m| m.pathologies.iter().map(String::as_str).collect())
                .unwrap_or_default();

            if findings.is_empty() && !from_csv_only {
                matrix.add_image(
                    self.store
                        .get(&record.path)
                        .iter()
                        .map(|a| a.pathology.as_str()),
                );
            } else {
                matrix.add_image(findings);
            }
        }

        matrix
    }

    pub fn export_cooccurrence_csv(&self, path: &Path, from_csv_only: bool) -> Result<()> {
        self.cooccurrence(from_csv_only).write_csv(path)?;
        log::info!("Wrote co-occurrence matrix to {}", path.display());
        Ok(())
    }

    /// Ask `heatmap` to draw the matrix; false when it is unavailable
    pub fn export_cooccurrence_heatmap(
        &self,
        path: &Path,
        from_csv_only: bool,
        heatmap: &dyn HeatmapRenderer,
    ) -> Result<bool> {
        let title = if from_csv_only {
            "Pathology co-occurrence (dataset metadata)"
        } else {
            "Pathology co-occurrence (metadata and annotations)"
        };
        heatmap.render(&self.cooccurrence(from_csv_only), title, path)
    }

    // ---- export / import ----

    pub fn export(&self, path: &Path, format: ExportFormat) -> Result<ExportSummary> {
        export::export(path, format, &self.store, &self.metadata)
    }

    /// Import a JSON or CSV export into the store.
    ///
    /// Nothing is saved to disk; call [`Library::save_all`] to persist.
    pub fn import(&mut self, path: &Path) -> Result<ImportSummary> {
        let index = &self.index;
        let summary = import::import(path, &mut self.store, |p| index.contains(p))?;
        self.history.clear();
        Ok(summary)
    }

    /// HTML page of the reference images, see [`report::write_report`]
    pub fn export_localization_report(&self, path: &Path) -> Result<usize> {
        report::write_report(&self.config.reference_images_dir, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// A dataset folder with three tiny PNGs and a Library rooted beside it
    fn setup() -> (TempDir, Library, Vec<String>) {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("dataset");
        fs::create_dir_all(&images).unwrap();
        for name in ["a.png", "b.png", "c.png"] {
            image::GrayImage::new(32, 32).save(images.join(name)).unwrap();
        }

        let mut library = Library::new(Config::rooted_at(dir.path().join("work"))).unwrap();
        assert_eq!(library.load_dataset(&images), 3);
        let paths = library.images().iter().map(|r| r.path.clone()).collect();
        (dir, library, paths)
    }

    #[test]
    fn test_empty_library() {
        let dir = tempfile::tempdir().unwrap();
        let library = Library::new(Config::rooted_at(dir.path())).unwrap();
        assert_eq!(library.current_image(), None);
        assert_eq!(library.statistics(), Statistics::default());
        assert!(library.filter_images(&FilterCriteria::default()).is_empty());
    }

    #[test]
    fn test_navigation_clamps() {
        let (_dir, mut library, paths) = setup();
        assert_eq!(library.current_image(), Some(paths[0].as_str()));
        assert_eq!(library.previous_image(), Some(paths[0].as_str()));
        library.next_image();
        library.next_image();
        assert_eq!(library.next_image(), Some(paths[2].as_str()));

        assert!(library.go_to(&paths[1]));
        assert_eq!(library.current_image(), Some(paths[1].as_str()));
        assert!(!library.go_to("/not/in/dataset.png"));
    }

    #[test]
    fn test_metadata_for_every_image() {
        let (_dir, library, paths) = setup();
        assert_eq!(library.metadata().len(), paths.len());
        assert!(library.metadata_for(&paths[0]).unwrap().patient_id.starts_with("SYN-"));
    }

    #[test]
    fn test_out_of_range_edit_leaves_store_unchanged() {
        let (_dir, mut library, paths) = setup();
        library.add_box(&paths[0], "Mass", 1.0, 1.0, 5.0, 5.0);

        let replacement = Annotation::new_box("Edema", 0.0, 0.0, 1.0, 1.0, "x");
        assert!(matches!(
            library.update_annotation(&paths[0], 3, replacement),
            Err(LabelerError::IndexOutOfRange { index: 3, len: 1, .. })
        ));
        assert!(library.delete_annotation(&paths[0], 1).is_err());
        assert_eq!(library.annotations(&paths[0]).len(), 1);
        assert_eq!(library.annotations(&paths[0])[0].pathology, "Mass");
        assert_eq!(library.annotations(&paths[0])[0].author, "annotator");
    }

    #[test]
    fn test_undo_redo() {
        let (_dir, mut library, paths) = setup();
        library.add_box(&paths[0], "Mass", 1.0, 1.0, 5.0, 5.0);
        library.add_box(&paths[0], "Nodule", 2.0, 2.0, 5.0, 5.0);
        library.delete_annotation(&paths[0], 0).unwrap();
        assert_eq!(library.annotations(&paths[0]).len(), 1);

        assert_eq!(library.undo().as_deref(), Some(paths[0].as_str()));
        assert_eq!(library.annotations(&paths[0]).len(), 2);
        library.undo();
        library.undo();
        assert!(library.annotations(&paths[0]).is_empty());
        assert!(!library.can_undo());

        library.redo();
        assert_eq!(library.annotations(&paths[0]).len(), 1);
        assert!(library.can_redo());
    }

    #[test]
    fn test_undo_steps_over_other_image_state() {
        let (_dir, mut library, paths) = setup();
        library.add_box(&paths[0], "Mass", 1.0, 1.0, 5.0, 5.0);
        library.add_box(&paths[1], "Nodule", 2.0, 2.0, 5.0, 5.0);

        assert_eq!(library.undo().as_deref(), Some(paths[1].as_str()));
        assert!(library.annotations(&paths[1]).is_empty());
        assert_eq!(library.annotations(&paths[0]).len(), 1);

        assert_eq!(library.undo().as_deref(), Some(paths[0].as_str()));
        assert!(library.annotations(&paths[0]).is_empty());
        assert_eq!(library.undo(), None);

        assert_eq!(library.redo().as_deref(), Some(paths[0].as_str()));
        assert_eq!(library.annotations(&paths[0]).len(), 1);
        assert_eq!(library.redo().as_deref(), Some(paths[1].as_str()));
        assert_eq!(library.annotations(&paths[1]).len(), 1);
        assert_eq!(library.redo(), None);
    }

    #[test]
    fn test_save_all_skips_images_outside_dataset() {
        let (dir, mut library, paths) = setup();
        library.add_box(&paths[0], "Mass", 1.0, 1.0, 5.0, 5.0);

        let foreign = dir.path().join("foreign.json");
        fs::write(
            &foreign,
            r#"{"/zzz/elsewhere/a.png": {"annotations": [{"type": "box", "x": 1.0, "y": 1.0, "width": 3.0, "height": 3.0, "pathology": "Hernia"}]}}"#,
        )
        .unwrap();
        let summary = library.import(&foreign).unwrap();
        assert_eq!(summary.unknown_images, 1);

        assert_eq!(library.save_all().unwrap(), 1);
        library.load_dataset(&dir.path().join("dataset"));
        let restored = library.annotations(&paths[0]);
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].pathology, "Mass");
    }

    #[test]
    fn test_reference_exclude_accepts_non_canonical_path() {
        let (dir, mut library, paths) = setup();
        library.add_box(&paths[0], "Mass", 1.0, 1.0, 5.0, 5.0);
        library.add_box(&paths[1], "Mass", 1.0, 1.0, 5.0, 5.0);
        library.save_all().unwrap();

        let roundabout = dir.path().join("dataset").join("..").join("dataset").join("a.png");
        let examples = library.reference_examples("Mass", 3, Some(&roundabout.to_string_lossy()));
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].image_path, paths[1]);
    }

    #[test]
    fn test_save_writes_unit_and_reference_images() {
        let (dir, mut library, paths) = setup();
        library.add_box(&paths[1], "Mass", 1.0, 1.0, 10.0, 10.0);
        library.add_box(&paths[1], "Nodule", 5.0, 5.0, 10.0, 10.0);

        let unit = library.save_annotations(&paths[1]).unwrap();
        assert!(unit.ends_with("b.json"));

        let refs = dir.path().join("work").join("annotations_visualized");
        assert!(refs.join("Mass").join("b_annotated.png").exists());
        assert!(refs.join("Nodule").join("b_annotated.png").exists());

        library.delete_annotation(&paths[1], 1).unwrap();
        library.save_annotations(&paths[1]).unwrap();
        assert!(!refs.join("Nodule").join("b_annotated.png").exists());
    }

    #[test]
    fn test_saved_annotations_survive_reload() {
        let (dir, mut library, paths) = setup();
        library.add_box(&paths[2], "Edema", 1.0, 1.0, 4.0, 4.0);
        library.save_annotations(&paths[2]).unwrap();

        library.load_dataset(&dir.path().join("dataset"));
        assert_eq!(library.annotations(&paths[2]).len(), 1);
        assert_eq!(library.annotations(&paths[2])[0].pathology, "Edema");
        assert!(!library.can_undo());
    }

    #[test]
    fn test_cooccurrence_falls_back_to_annotations() {
        let (_dir, mut library, paths) = setup();
        library.add_box(&paths[0], "Mass", 1.0, 1.0, 5.0, 5.0);
        library.add_box(&paths[0], "Nodule", 1.0, 1.0, 5.0, 5.0);

        assert_eq!(library.cooccurrence(true).get("Mass", "Nodule"), Some(0));
        let matrix = library.cooccurrence(false);
        assert_eq!(matrix.get("Mass", "Nodule"), Some(1));
        assert_eq!(matrix.get("Mass", "Mass"), Some(1));
    }
}
