//! Detection and normalisation of upstream SQL view response shapes.
//!
//! Servers of different versions answer the same SQL view request with one
//! of four JSON layouts. [`detect_shape`] classifies a payload by checking
//! the layouts in a fixed priority order and [`normalize`] converts the
//! detected shape into a [`CanonicalTable`]. The order matters: the grid
//! checks run before the object-row checks so a grid payload is never read
//! as a list of records.

use std::collections::BTreeSet;

use serde_json::Value;

use super::canonical_table::{CanonicalTable, CellValue, Row};

/// A recognised response layout borrowing from the raw payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseShape<'a> {
    /// `{ "listGrid": { "headers": [...], "rows": [[...]] } }`.
    ListGrid {
        /// Header descriptors.
        headers: &'a [Value],
        /// Positional row arrays.
        rows: &'a [Value],
    },
    /// `{ "headers": [...], "rows": [[...]] }`.
    Grid {
        /// Header descriptors.
        headers: &'a [Value],
        /// Positional row arrays.
        rows: &'a [Value],
    },
    /// `{ "data": [{...}, ...] }`.
    DataObjects(&'a [Value]),
    /// `[{...}, ...]`.
    BareObjects(&'a [Value]),
}

impl ResponseShape<'_> {
    /// Stable name of the shape for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListGrid { .. } => "list_grid",
            Self::Grid { .. } => "grid",
            Self::DataObjects(_) => "data_objects",
            Self::BareObjects(_) => "bare_objects",
        }
    }
}

/// The payload matched none of the recognised layouts.
///
/// Carries the payload's JSON type and, for objects, its sorted top-level
/// keys so the failure can be diagnosed without the payload itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized response shape: {observed_kind} with keys [{}]", .keys.join(", "))]
pub struct UnrecognizedResponseShape {
    observed_kind: &'static str,
    keys: Vec<String>,
}

impl UnrecognizedResponseShape {
    /// Describe `raw` for diagnostics.
    pub fn from_payload(raw: &Value) -> Self {
        let keys = match raw {
            Value::Object(map) => {
                let mut keys = map.keys().cloned().collect::<Vec<_>>();
                keys.sort();
                keys
            }
            _ => Vec::new(),
        };
        Self {
            observed_kind: json_kind(raw),
            keys,
        }
    }

    /// JSON type of the rejected payload.
    pub fn observed_kind(&self) -> &'static str {
        self.observed_kind
    }

    /// Sorted top-level keys of the rejected payload.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

/// Classify `raw`, trying each layout in priority order.
///
/// # Errors
///
/// Returns [`UnrecognizedResponseShape`] when no layout matches.
pub fn detect_shape(raw: &Value) -> Result<ResponseShape<'_>, UnrecognizedResponseShape> {
    if let Some((headers, rows)) = raw.get("listGrid").and_then(|grid| grid_parts(grid, true)) {
        return Ok(ResponseShape::ListGrid { headers, rows });
    }
    if let Some((headers, rows)) = grid_parts(raw, false) {
        return Ok(ResponseShape::Grid { headers, rows });
    }
    if let Some(records) = raw
        .as_object()
        .and_then(|object| object.get("data"))
        .and_then(object_records)
    {
        return Ok(ResponseShape::DataObjects(records));
    }
    if let Some(records) = object_records(raw) {
        return Ok(ResponseShape::BareObjects(records));
    }
    Err(UnrecognizedResponseShape::from_payload(raw))
}

/// Normalise a raw page into a [`CanonicalTable`].
///
/// Pure: the input is only borrowed, so normalising the same payload twice
/// yields equal tables.
///
/// # Errors
///
/// Returns [`UnrecognizedResponseShape`] when no layout matches.
///
/// # Examples
/// ```
/// use serde_json::json;
/// use sqlview_backend::domain::{CellValue, normalize};
///
/// let raw = json!({ "listGrid": { "headers": [{ "name": "uid" }], "rows": [["abc"]] } });
/// let table = normalize(&raw).expect("list grid is recognised");
/// assert_eq!(table.headers(), ["uid"]);
/// assert_eq!(table.rows()[0]["uid"], CellValue::from("abc"));
/// ```
pub fn normalize(raw: &Value) -> Result<CanonicalTable, UnrecognizedResponseShape> {
    Ok(match detect_shape(raw)? {
        ResponseShape::ListGrid { headers, rows } | ResponseShape::Grid { headers, rows } => {
            grid_table(headers, rows)
        }
        ResponseShape::DataObjects(records) | ResponseShape::BareObjects(records) => {
            record_table(records)
        }
    })
}

fn grid_parts(candidate: &Value, rows_optional: bool) -> Option<(&[Value], &[Value])> {
    let object = candidate.as_object()?;
    let headers = object.get("headers")?.as_array()?;
    let rows: &[Value] = match object.get("rows") {
        Some(rows) => rows.as_array()?.as_slice(),
        // An empty `listGrid` may omit `rows`; the unwrapped layout must carry
        // both keys to be told apart from other objects with `headers`.
        None if rows_optional => &[],
        None => return None,
    };
    rows.iter()
        .all(Value::is_array)
        .then_some((headers.as_slice(), rows))
}

fn object_records(candidate: &Value) -> Option<&[Value]> {
    let records = candidate.as_array()?;
    records
        .iter()
        .all(Value::is_object)
        .then_some(records.as_slice())
}

fn grid_table(headers: &[Value], rows: &[Value]) -> CanonicalTable {
    let names = unique_header_names(headers);
    let mut table = CanonicalTable::new(names.clone());
    for row in rows.iter().filter_map(Value::as_array) {
        let cells = names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let cell = row.get(index).cloned().map_or(CellValue::Null, CellValue::from);
                (name.clone(), cell)
            })
            .collect::<Row>();
        table.push_row(cells);
    }
    table
}

fn record_table(records: &[Value]) -> CanonicalTable {
    let mut seen = BTreeSet::new();
    let mut headers = Vec::new();
    for record in records.iter().filter_map(Value::as_object) {
        for key in record.keys() {
            if seen.insert(key.as_str()) {
                headers.push(key.clone());
            }
        }
    }

    let mut table = CanonicalTable::new(headers);
    for record in records.iter().filter_map(Value::as_object) {
        let row = record
            .iter()
            .map(|(key, value)| (key.clone(), CellValue::from(value.clone())))
            .collect::<Row>();
        table.push_row(row);
    }
    table
}

/// Header names in order, synthesising `col_<index>` for unnamed columns and
/// suffixing repeated names with their index so every column survives.
fn unique_header_names(headers: &[Value]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    headers
        .iter()
        .enumerate()
        .map(|(index, header)| {
            let name = header_name(header).unwrap_or_else(|| format!("col_{index}"));
            if seen.insert(name.clone()) {
                name
            } else {
                let renamed = format!("{name}_{index}");
                seen.insert(renamed.clone());
                renamed
            }
        })
        .collect()
}

fn header_name(header: &Value) -> Option<String> {
    let name = match header {
        Value::String(name) => Some(name.as_str()),
        Value::Object(descriptor) => descriptor
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .or_else(|| descriptor.get("column").and_then(Value::as_str)),
        _ => None,
    }?;
    let trimmed = name.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
