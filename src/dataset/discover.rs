//! Image discovery under a dataset folder

use crate::state::data::ImageRecord;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Supported image extensions (matched case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// The images of one dataset folder, in canonical path order
#[derive(Debug, Clone, Default)]
pub struct DatasetIndex {
    root: PathBuf,
    metadata_root: PathBuf,
    images: Vec<ImageRecord>,
}

impl DatasetIndex {
    /// Scan `root` recursively for images
    ///
    /// A missing root yields an empty index rather than an error.
    pub fn load(root: &Path) -> Self {
        let root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let images = discover_images(&root);
        let metadata_root = metadata_root_for(&root);

        log::info!(
            "Discovered {} images under {} (metadata root: {})",
            images.len(),
            root.display(),
            metadata_root.display()
        );

        Self {
            root,
            metadata_root,
            images,
        }
    }

    /// Folder the dataset was loaded from
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder searched for metadata and bbox CSVs
    pub fn metadata_root(&self) -> &Path {
        &self.metadata_root
    }

    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Discovery position of an image path
    pub fn position(&self, path: &str) -> Option<usize> {
        self.images
            .binary_search_by(|record| record.path.as_str().cmp(path))
            .ok()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.position(path).is_some()
    }

    /// First image whose filename stem equals `stem`
    pub fn find_by_stem(&self, stem: &str) -> Option<&ImageRecord> {
        self.images.iter().find(|record| record.stem() == stem)
    }
}

/// Recursively collect unique `.png/.jpg/.jpeg` files, sorted by canonical path
pub fn discover_images(root: &Path) -> Vec<ImageRecord> {
    if !root.exists() {
        log::warn!("Dataset folder does not exist: {}", root.display());
        return Vec::new();
    }

    let mut unique = BTreeSet::new();

    // Walk the directory tree recursively
    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        // Only process files (not directories)
        if !path.is_file() || !has_image_extension(path) {
            continue;
        }

        unique.insert(canonical_string(path));
    }

    unique.into_iter().map(ImageRecord::new).collect()
}

/// Whether the path ends in one of [`IMAGE_EXTENSIONS`], ignoring case
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// `dataset/images` keeps its CSVs in `dataset/`; any other folder keeps them itself
pub fn metadata_root_for(root: &Path) -> PathBuf {
    let is_images_dir = root
        .file_name()
        .is_some_and(|name| name.to_string_lossy().eq_ignore_ascii_case("images"));

    match root.parent() {
        Some(parent) if is_images_dir => parent.to_path_buf(),
        _ => root.to_path_buf(),
    }
}

/// Canonical absolute path as a string, falling back to the path as given
pub fn canonical_string(path: &Path) -> String {
    fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_discovers_extensions_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.PNG"));
        touch(&dir.path().join("a.jpg"));
        touch(&dir.path().join("nested/c.JpEg"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("scan.bmp"));

        let images = discover_images(&fs::canonicalize(dir.path()).unwrap());
        let names: Vec<String> = images.iter().map(|r| r.filename()).collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"a.jpg".to_string()));
        assert!(names.contains(&"b.PNG".to_string()));
        assert!(names.contains(&"c.JpEg".to_string()));

        let mut sorted = images.clone();
        sorted.sort();
        assert_eq!(images, sorted);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let index = DatasetIndex::load(Path::new("/no/such/dataset/folder"));
        assert!(index.is_empty());
    }

    #[test]
    fn test_metadata_root() {
        assert_eq!(
            metadata_root_for(Path::new("/data/nih/Images")),
            PathBuf::from("/data/nih")
        );
        assert_eq!(
            metadata_root_for(Path::new("/data/nih")),
            PathBuf::from("/data/nih")
        );
    }

    #[test]
    fn test_position_and_stem_lookup() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("x.png"));
        touch(&dir.path().join("y.png"));

        let index = DatasetIndex::load(dir.path());
        let second = index.images()[1].path.clone();
        assert_eq!(index.position(&second), Some(1));
        assert!(index.find_by_stem("x").is_some());
        assert!(index.find_by_stem("z").is_none());
    }
}
