//! Progress event emitted after each fetched page.

use serde::{Deserialize, Serialize};

/// Snapshot of an execution's progress after one page.
///
/// `rows_so_far` counts rows in the accumulated table, so it never
/// decreases between consecutive events of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageProgress {
    /// Pages fetched so far, including the one just processed.
    pub pages_fetched: u32,
    /// Rows accumulated so far.
    pub rows_so_far: usize,
    /// Upstream's estimate of the total row count, when reported.
    pub estimated_total: Option<u64>,
}
