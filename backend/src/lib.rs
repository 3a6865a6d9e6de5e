//! SQL view result pipeline.
//!
//! Executes DHIS2 SQL views across pages and response layouts, caches the
//! merged tables, and annotates metadata records with quality scores and
//! canonical API endpoints.

pub mod domain;
pub mod outbound;
pub mod settings;
pub mod telemetry;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use settings::PipelineSettings;
