//! Deterministic execution fingerprints used as cache and single-flight keys.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use super::sql_view_parameters::SqlViewParameters;

const FINGERPRINT_NAMESPACE: &str = "sqlview:v1:";

/// Stable identity of one SQL view execution.
///
/// Derived from the SQL view id, the resolved parameters and the filters,
/// each sorted by name, hashed with SHA-256 over compact canonical JSON and
/// prefixed with a version namespace so the derivation can change without
/// colliding with entries produced by an older one.
///
/// # Examples
/// ```
/// use std::collections::BTreeMap;
///
/// use sqlview_backend::domain::{ExecutionFingerprint, SqlViewParameters};
///
/// let a = ExecutionFingerprint::compute("qMYMT0iUGkG", &SqlViewParameters::default(), &BTreeMap::new());
/// let b = ExecutionFingerprint::compute("qMYMT0iUGkG", &SqlViewParameters::default(), &BTreeMap::new());
/// assert_eq!(a, b);
/// assert!(a.as_str().starts_with("sqlview:v1:"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionFingerprint(String);

impl ExecutionFingerprint {
    /// Compute the fingerprint for one execution.
    pub fn compute(
        sql_view_id: &str,
        parameters: &SqlViewParameters,
        filters: &BTreeMap<String, String>,
    ) -> Self {
        let canonical = json!({
            "filters": filters,
            "parameters": parameters.sorted(),
            "sqlViewId": sql_view_id,
        });
        // `json!` keeps insertion order and both maps iterate sorted, so the
        // rendering below is canonical.
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        Self(format!("{FINGERPRINT_NAMESPACE}{}", hex::encode(digest)))
    }

    /// Borrow the fingerprint as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ExecutionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for ExecutionFingerprint {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
