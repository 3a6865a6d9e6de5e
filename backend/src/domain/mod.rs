//! Domain primitives and services of the SQL view result pipeline.
//!
//! Purpose: turn paged, inconsistently shaped SQL view responses into one
//! canonical table, and annotate metadata records with quality scores and
//! API endpoints. Everything here is transport-agnostic; adapters plug in
//! through [`ports`].
//!
//! Public surface:
//! - CanonicalTable / CellValue / Row: the normalised result table.
//! - normalize / detect_shape: the response normaliser.
//! - extract_placeholders / build_parameters: parameter substitution.
//! - ExecutionFingerprint: cache and single-flight key.
//! - SqlViewExecutor: the multi-page fetch orchestrator.
//! - score_record / QualityScorer: quality scoring.
//! - Uid / build_endpoints: the API URL builder.
//! - RowAnnotator: per-row quality and endpoint annotation.
//! - Error / ErrorCode: display payload for every failure above.

pub mod annotation;
pub mod api_endpoints;
pub mod canonical_table;
pub mod error;
pub mod fingerprint;
pub mod metadata_kind;
pub mod ports;
pub mod quality;
pub mod response_shape;
pub mod sql_view_executor;
pub mod sql_view_parameters;
pub mod uid;

pub use self::annotation::{AnnotatedRow, RowAnnotator};
pub use self::api_endpoints::{
    ApiEndpointSet, DEFAULT_ORG_UNIT, DEFAULT_PERIOD, EndpointOptions, build_endpoints,
};
pub use self::canonical_table::{CanonicalTable, CellValue, Row};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::fingerprint::ExecutionFingerprint;
pub use self::metadata_kind::{MetadataKind, UnknownMetadataKind};
pub use self::quality::{
    DEFAULT_RECENCY_WINDOW_DAYS, QualityAssessment, QualityCheck, QualityLabel, QualityScorer,
    score_record,
};
pub use self::response_shape::{ResponseShape, UnrecognizedResponseShape, detect_shape, normalize};
pub use self::sql_view_executor::{
    AttemptJitter, BackoffJitter, CancellationFlag, DEFAULT_CACHE_EXPIRY_MINUTES, ExecutionHooks,
    ExecutionOrigin, ExecutionRequest, ExecutionWarning, HeaderDrift, PAGE_LIMIT, RetrySleeper,
    SqlViewExecution, SqlViewExecutionError, SqlViewExecutor, SqlViewExecutorConfig,
    SqlViewExecutorPorts, SqlViewExecutorRuntime, TokioSleeper,
};
pub use self::sql_view_parameters::{
    MissingParameter, Placeholders, SqlViewParameters, build_parameters, extract_placeholders,
};
pub use self::uid::{InvalidUid, UID_LENGTH, Uid};
