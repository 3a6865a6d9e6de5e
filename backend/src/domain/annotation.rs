//! Per-row quality and endpoint annotation of a result table.
//!
//! Each row is read as one metadata record: the row is scored with the
//! [`QualityScorer`] and, when its `uid` column (or `id`, for tables without
//! one) holds a valid identifier, linked to its API endpoints.

use serde::Serialize;
use serde_json::{Map, Value};

use super::api_endpoints::{ApiEndpointSet, EndpointOptions, build_endpoints};
use super::canonical_table::{CanonicalTable, CellValue, Row};
use super::metadata_kind::MetadataKind;
use super::quality::{QualityLabel, QualityScorer};

const UID_COLUMNS: [&str; 2] = ["uid", "id"];

/// One result row with its display annotations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedRow {
    /// The row as fetched.
    pub row: Row,
    /// Quality score in `0..=4`.
    pub score: u8,
    /// Label for `score`.
    pub label: QualityLabel,
    /// Names of the checks the record failed, in reporting order.
    pub failed_checks: Vec<&'static str>,
    /// Endpoint links; absent when the row has no valid identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<ApiEndpointSet>,
    /// Why the row's identifier was rejected, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_uid: Option<String>,
}

/// Annotates tables of one metadata kind against one server.
///
/// # Examples
/// ```
/// use std::sync::Arc;
///
/// use mockable::DefaultClock;
/// use sqlview_backend::domain::{
///     CanonicalTable, CellValue, MetadataKind, QualityScorer, Row, RowAnnotator,
/// };
///
/// let mut table = CanonicalTable::new(vec!["uid".to_owned(), "code".to_owned()]);
/// table.push_row(Row::from([
///     ("uid".to_owned(), CellValue::from("OwvmJaiVIBU")),
///     ("code".to_owned(), CellValue::from("DE_ANC1")),
/// ]));
///
/// let annotator = RowAnnotator::new(
///     MetadataKind::DataElement,
///     QualityScorer::new(Arc::new(DefaultClock)),
///     "https://x/api",
/// );
/// let annotated = annotator.annotate(&table);
/// assert_eq!(annotated.len(), 1);
/// assert!(annotated[0].endpoints.is_some());
/// ```
#[derive(Clone)]
pub struct RowAnnotator {
    kind: MetadataKind,
    scorer: QualityScorer,
    base_url: String,
    options: EndpointOptions,
}

impl RowAnnotator {
    /// Annotator with default endpoint options.
    pub fn new(kind: MetadataKind, scorer: QualityScorer, base_url: impl Into<String>) -> Self {
        Self {
            kind,
            scorer,
            base_url: base_url.into(),
            options: EndpointOptions::default(),
        }
    }

    /// Use `options` for every endpoint set.
    #[must_use]
    pub fn with_options(mut self, options: EndpointOptions) -> Self {
        self.options = options;
        self
    }

    /// Annotate every row of `table`, in table order.
    pub fn annotate(&self, table: &CanonicalTable) -> Vec<AnnotatedRow> {
        let uid_column = UID_COLUMNS
            .into_iter()
            .find(|column| table.has_header(column));
        table
            .rows()
            .iter()
            .map(|row| self.annotate_row(row, uid_column))
            .collect()
    }

    fn annotate_row(&self, row: &Row, uid_column: Option<&str>) -> AnnotatedRow {
        let assessment = self.scorer.score(&record(row), self.kind);
        let failed_checks = assessment
            .contributing_checks()
            .iter()
            .filter(|(_, passed)| !**passed)
            .map(|(check, _)| check.name())
            .collect();

        let uid = uid_column
            .and_then(|column| row.get(column))
            .and_then(CellValue::as_text);
        let (endpoints, invalid_uid) =
            match uid.map(|uid| build_endpoints(self.kind, uid, &self.base_url, &self.options)) {
                Some(Ok(endpoints)) => (Some(endpoints), None),
                Some(Err(error)) => (None, Some(error.to_string())),
                None => (None, None),
            };

        AnnotatedRow {
            row: row.clone(),
            score: assessment.score(),
            label: assessment.label(),
            failed_checks,
            endpoints,
            invalid_uid,
        }
    }
}

fn record(row: &Row) -> Value {
    let fields: Map<String, Value> = row
        .iter()
        .map(|(name, cell)| (name.clone(), Value::from(cell.clone())))
        .collect();
    Value::Object(fields)
}
