/// Derived image output
///
/// This module handles:
/// - Burning annotation boxes and labels into copies of source images
/// - Grouping those reference images per pathology on disk
/// - Looking up reference examples for a pathology
pub mod reference;
