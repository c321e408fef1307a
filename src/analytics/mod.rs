/// Aggregate analyses over a loaded dataset
///
/// This module handles:
/// - Pathology co-occurrence matrices (cooccurrence.rs)
/// - Annotation statistics (stats.rs)
/// - Image filtering on metadata and annotation presence (filter.rs)
pub mod cooccurrence;
pub mod stats;
pub mod filter;
