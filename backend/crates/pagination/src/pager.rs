//! Decoding of the optional `pager` envelope returned alongside page data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::PageNumber;

/// Pagination metadata reported by the upstream server.
///
/// Every field is optional because server versions disagree on which ones
/// they emit. A pager that carries neither `pageCount` nor the
/// `total`/`pageSize` pair cannot answer [`Pager::has_more_after`]; callers
/// then fall back to the empty-page convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pager {
    /// Page the server says it returned.
    #[serde(default)]
    pub page: Option<u32>,
    /// Total number of pages available.
    #[serde(default)]
    pub page_count: Option<u32>,
    /// Total number of rows across all pages.
    #[serde(default)]
    pub total: Option<u64>,
    /// Rows per page.
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl Pager {
    /// Extract the pager from a raw response body.
    ///
    /// The envelope is looked up at the top level first and then inside a
    /// `listGrid` wrapper. A malformed envelope is treated as absent.
    ///
    /// # Examples
    /// ```
    /// use pagination::Pager;
    /// use serde_json::json;
    ///
    /// let body = json!({ "pager": { "page": 1, "pageCount": 3, "total": 117 } });
    /// let pager = Pager::from_envelope(&body).expect("pager present");
    /// assert_eq!(pager.page_count, Some(3));
    /// assert!(Pager::from_envelope(&json!([])).is_none());
    /// ```
    #[must_use]
    pub fn from_envelope(body: &Value) -> Option<Self> {
        let envelope = body
            .get("pager")
            .or_else(|| body.get("listGrid").and_then(|grid| grid.get("pager")))?;
        if !envelope.is_object() {
            return None;
        }
        Self::deserialize(envelope).ok()
    }

    /// Whether another page follows `current`.
    ///
    /// Returns `None` when the pager does not carry enough information to
    /// decide.
    #[must_use]
    pub fn has_more_after(&self, current: PageNumber) -> Option<bool> {
        if let Some(page_count) = self.page_count {
            return Some(current.get() < page_count);
        }
        match (self.total, self.page_size) {
            (Some(total), Some(page_size)) if page_size > 0 => {
                Some(u64::from(current.get()).saturating_mul(u64::from(page_size)) < total)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn page(raw: u32) -> PageNumber {
        PageNumber::new(raw).expect("non-zero page")
    }

    #[rstest]
    #[case(1, Some(true))]
    #[case(2, Some(true))]
    #[case(3, Some(false))]
    #[case(4, Some(false))]
    fn page_count_decides_remaining_pages(#[case] current: u32, #[case] expected: Option<bool>) {
        let pager = Pager {
            page_count: Some(3),
            ..Pager::default()
        };
        assert_eq!(pager.has_more_after(page(current)), expected);
    }

    #[rstest]
    fn total_and_page_size_are_used_without_page_count() {
        let pager = Pager {
            total: Some(117),
            page_size: Some(50),
            ..Pager::default()
        };
        assert_eq!(pager.has_more_after(page(2)), Some(true));
        assert_eq!(pager.has_more_after(page(3)), Some(false));
    }

    #[rstest]
    fn incomplete_pager_cannot_decide() {
        let pager = Pager {
            page: Some(1),
            total: Some(10),
            ..Pager::default()
        };
        assert_eq!(pager.has_more_after(page(1)), None);
    }

    #[rstest]
    fn pager_nested_in_list_grid_is_found() {
        let body = json!({ "listGrid": { "pager": { "pageCount": 2 } } });
        let pager = Pager::from_envelope(&body).expect("nested pager");
        assert_eq!(pager.page_count, Some(2));
    }

    #[rstest]
    #[case(json!({ "pager": "three" }))]
    #[case(json!({ "pager": { "pageCount": "three" } }))]
    #[case(json!({ "rows": [] }))]
    fn malformed_or_missing_pager_is_absent(#[case] body: Value) {
        assert!(Pager::from_envelope(&body).is_none());
    }
}
