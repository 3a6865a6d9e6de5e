//! Completeness and freshness scoring of metadata records.
//!
//! A record earns one point per passing check. The score is an integer in
//! `0..=4` and [`QualityLabel`] is the single mapping from score to label.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::metadata_kind::MetadataKind;

/// Default recency window for the `isRecent` check.
pub const DEFAULT_RECENCY_WINDOW_DAYS: i64 = 365;

const MAX_SCORE: u8 = 4;
const INACTIVE_STATUSES: [&str; 3] = ["DISABLED", "DEPRECATED", "INACTIVE"];
const INACTIVE_FLAGS: [&str; 3] = ["disabled", "deprecated", "archived"];

/// Individual checks contributing to a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QualityCheck {
    /// Non-blank `description`.
    HasDescription,
    /// Non-blank `code`.
    HasCode,
    /// No disabled/deprecated marker.
    IsActive,
    /// `lastUpdated` falls inside the recency window.
    IsRecent,
}

impl QualityCheck {
    /// Every check, in reporting order.
    pub const ALL: [Self; 4] = [
        Self::HasDescription,
        Self::HasCode,
        Self::IsActive,
        Self::IsRecent,
    ];

    /// Camel-case check name used in payloads.
    pub fn name(self) -> &'static str {
        match self {
            Self::HasDescription => "hasDescription",
            Self::HasCode => "hasCode",
            Self::IsActive => "isActive",
            Self::IsRecent => "isRecent",
        }
    }
}

/// Human label for a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityLabel {
    /// Score 0.
    Poor,
    /// Score 1.
    Fair,
    /// Score 2.
    Good,
    /// Score 3.
    #[serde(rename = "Very Good")]
    VeryGood,
    /// Score 4.
    Excellent,
}

impl From<u8> for QualityLabel {
    /// Scores above four clamp to [`QualityLabel::Excellent`].
    fn from(score: u8) -> Self {
        match score {
            0 => Self::Poor,
            1 => Self::Fair,
            2 => Self::Good,
            3 => Self::VeryGood,
            _ => Self::Excellent,
        }
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Poor => "Poor",
            Self::Fair => "Fair",
            Self::Good => "Good",
            Self::VeryGood => "Very Good",
            Self::Excellent => "Excellent",
        })
    }
}

/// Derived quality of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityAssessment {
    score: u8,
    contributing_checks: BTreeMap<QualityCheck, bool>,
}

impl QualityAssessment {
    fn from_checks(contributing_checks: BTreeMap<QualityCheck, bool>) -> Self {
        let passed = contributing_checks.values().filter(|passed| **passed).count();
        let score = u8::try_from(passed).unwrap_or(MAX_SCORE).min(MAX_SCORE);
        Self {
            score,
            contributing_checks,
        }
    }

    /// Integer score in `0..=4`.
    pub fn score(&self) -> u8 {
        self.score
    }

    /// Label for [`Self::score`].
    pub fn label(&self) -> QualityLabel {
        QualityLabel::from(self.score)
    }

    /// Outcome of every check.
    pub fn contributing_checks(&self) -> &BTreeMap<QualityCheck, bool> {
        &self.contributing_checks
    }

    /// Outcome of one check.
    pub fn passed(&self, check: QualityCheck) -> bool {
        self.contributing_checks.get(&check).copied().unwrap_or(false)
    }
}

/// Score `record` as of `now`, counting `lastUpdated` as recent within
/// `recency_window`.
///
/// Total over any JSON value: non-object records simply fail every check
/// except `isActive`.
///
/// # Examples
/// ```
/// use chrono::{TimeDelta, TimeZone, Utc};
/// use serde_json::json;
/// use sqlview_backend::domain::{MetadataKind, QualityLabel, score_record};
///
/// let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().expect("valid time");
/// let record = json!({ "description": "ANC visits", "code": "DE_ANC1", "lastUpdated": "2026-01-10T09:00:00.000" });
/// let assessment = score_record(&record, MetadataKind::DataElement, now, TimeDelta::days(365));
/// assert_eq!(assessment.score(), 4);
/// assert_eq!(assessment.label(), QualityLabel::Excellent);
/// ```
pub fn score_record(
    record: &Value,
    kind: MetadataKind,
    now: DateTime<Utc>,
    recency_window: TimeDelta,
) -> QualityAssessment {
    let checks = QualityCheck::ALL
        .into_iter()
        .map(|check| {
            let passed = match check {
                QualityCheck::HasDescription => has_text(record, "description"),
                QualityCheck::HasCode => has_text(record, "code"),
                QualityCheck::IsActive => is_active(record, kind),
                QualityCheck::IsRecent => is_recent(record, now, recency_window),
            };
            (check, passed)
        })
        .collect();
    QualityAssessment::from_checks(checks)
}

/// Clock-backed scorer for callers that do not track evaluation time.
#[derive(Clone)]
pub struct QualityScorer {
    clock: Arc<dyn Clock>,
    recency_window: TimeDelta,
}

impl QualityScorer {
    /// Scorer with the default twelve-month window.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_recency_window(clock, TimeDelta::days(DEFAULT_RECENCY_WINDOW_DAYS))
    }

    /// Scorer with an explicit recency window.
    pub fn with_recency_window(clock: Arc<dyn Clock>, recency_window: TimeDelta) -> Self {
        Self {
            clock,
            recency_window,
        }
    }

    /// Score `record` as of the clock's current time.
    pub fn score(&self, record: &Value, kind: MetadataKind) -> QualityAssessment {
        score_record(record, kind, self.clock.utc(), self.recency_window)
    }
}

fn has_text(record: &Value, field: &str) -> bool {
    record
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|text| !text.trim().is_empty())
}

fn is_active(record: &Value, kind: MetadataKind) -> bool {
    let flagged = INACTIVE_FLAGS
        .iter()
        .any(|flag| record.get(*flag).and_then(Value::as_bool) == Some(true));
    let inactive_status = record
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|status| {
            INACTIVE_STATUSES
                .iter()
                .any(|inactive| status.trim().eq_ignore_ascii_case(inactive))
        });
    let switched_off = kind == MetadataKind::ProgramIndicator
        && record.get("active").and_then(Value::as_bool) == Some(false);
    !(flagged || inactive_status || switched_off)
}

fn is_recent(record: &Value, now: DateTime<Utc>, recency_window: TimeDelta) -> bool {
    record
        .get("lastUpdated")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .is_some_and(|updated| now - updated <= recency_window)
}

/// Parse RFC 3339 or the offset-less `YYYY-MM-DDTHH:MM:SS[.fff]` form
/// servers emit, reading the latter as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
