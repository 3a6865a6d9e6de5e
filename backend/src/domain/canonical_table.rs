//! Canonical tabular representation of SQL view results.
//!
//! Every upstream response shape is normalised into a [`CanonicalTable`]:
//! an ordered list of unique column names plus rows keyed by those names.
//! Row order is the upstream emission order and is never re-sorted here.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One scalar cell.
///
/// Upstream cells holding arrays or objects are kept as their compact JSON
/// text so a single odd column never fails a whole page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Explicit or synthesised missing value.
    Null,
    /// Boolean cell.
    Bool(bool),
    /// Numeric cell, kept in upstream precision.
    Number(serde_json::Number),
    /// Text cell.
    Text(String),
}

impl CellValue {
    /// Borrow the text content of a [`CellValue::Text`] cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Whether the cell is [`CellValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<Value> for CellValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => Self::Number(number),
            Value::String(text) => Self::Text(text),
            nested @ (Value::Array(_) | Value::Object(_)) => Self::Text(nested.to_string()),
        }
    }
}

impl From<CellValue> for Value {
    fn from(cell: CellValue) -> Self {
        match cell {
            CellValue::Null => Self::Null,
            CellValue::Bool(flag) => Self::Bool(flag),
            CellValue::Number(number) => Self::Number(number),
            CellValue::Text(text) => Self::String(text),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// One table row keyed by column name.
pub type Row = BTreeMap<String, CellValue>;

/// Ordered, de-duplicated headers plus conforming rows.
///
/// ## Invariants
/// - `headers` are unique and keep their first-seen order.
/// - Every row holds exactly one cell per header: unknown keys are dropped
///   and absent columns are filled with [`CellValue::Null`] on insertion.
///
/// # Examples
/// ```
/// use sqlview_backend::domain::{CanonicalTable, CellValue, Row};
///
/// let mut table = CanonicalTable::new(vec!["uid".to_owned(), "name".to_owned()]);
/// table.push_row(Row::from([("uid".to_owned(), CellValue::from("abc"))]));
/// assert_eq!(table.rows()[0]["name"], CellValue::Null);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTable {
    headers: Vec<String>,
    rows: Vec<Row>,
}

impl CanonicalTable {
    /// Create an empty table. Duplicate header names keep their first
    /// occurrence only.
    pub fn new(headers: Vec<String>) -> Self {
        let mut seen = BTreeSet::new();
        let headers = headers
            .into_iter()
            .filter(|header| seen.insert(header.clone()))
            .collect();
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Column names in order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Rows in upstream order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether `name` is one of the table's headers.
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|header| header == name)
    }

    /// Append a row, conforming it to the header set.
    pub fn push_row(&mut self, mut row: Row) {
        let conformed = self
            .headers
            .iter()
            .map(|header| {
                let cell = row.remove(header).unwrap_or(CellValue::Null);
                (header.clone(), cell)
            })
            .collect();
        self.rows.push(conformed);
    }

    /// Consume the table into its headers and rows.
    pub fn into_parts(self) -> (Vec<String>, Vec<Row>) {
        (self.headers, self.rows)
    }
}

#[cfg(test)]
mod tests {
    //! Checks for header de-duplication and row conformance.

    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    #[rstest]
    fn duplicate_headers_keep_first_occurrence() {
        let table = CanonicalTable::new(headers(&["uid", "name", "uid"]));
        assert_eq!(table.headers(), ["uid", "name"]);
    }

    #[rstest]
    fn push_row_drops_unknown_keys_and_fills_missing() {
        let mut table = CanonicalTable::new(headers(&["uid", "name"]));
        table.push_row(Row::from([
            ("uid".to_owned(), CellValue::from("abc")),
            ("extra".to_owned(), CellValue::from("ignored")),
        ]));

        let row = &table.rows()[0];
        assert_eq!(row.len(), 2);
        assert_eq!(row["uid"], CellValue::from("abc"));
        assert!(row["name"].is_null());
        assert!(!row.contains_key("extra"));
    }

    #[rstest]
    #[case(json!(null), CellValue::Null)]
    #[case(json!(true), CellValue::Bool(true))]
    #[case(json!(12), CellValue::Number(12.into()))]
    #[case(json!("x"), CellValue::from("x"))]
    #[case(json!([1, 2]), CellValue::from("[1,2]"))]
    #[case(json!({ "a": 1 }), CellValue::from("{\"a\":1}"))]
    fn json_values_map_to_scalar_cells(#[case] raw: Value, #[case] expected: CellValue) {
        assert_eq!(CellValue::from(raw), expected);
    }

    #[rstest]
    fn cells_serialise_as_plain_json_scalars() {
        let mut table = CanonicalTable::new(headers(&["uid", "count"]));
        table.push_row(Row::from([
            ("uid".to_owned(), CellValue::from("abc")),
            ("count".to_owned(), CellValue::Number(3.into())),
        ]));
        let value = serde_json::to_value(&table).expect("serialise table");
        assert_eq!(
            value,
            json!({ "headers": ["uid", "count"], "rows": [{ "count": 3, "uid": "abc" }] })
        );
    }
}
