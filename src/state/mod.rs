/// State management module
///
/// This module handles all application state, including:
/// - Shared data structures: images, metadata, annotations (data.rs)
/// - The in-memory annotation store and its per-image files (store.rs)
/// - Undo/redo history of annotation edits (edit.rs)
/// - The Library that ties a loaded dataset together (library.rs)
pub mod library;
pub mod data;
pub mod edit;
pub mod store;
