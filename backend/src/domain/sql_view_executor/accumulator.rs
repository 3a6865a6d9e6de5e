//! Merges normalised pages into one table.

use crate::domain::canonical_table::CanonicalTable;

use super::HeaderDrift;

/// Accumulated rows of one execution, capped at `max_rows`.
pub(super) struct TableAccumulator {
    table: CanonicalTable,
    max_rows: usize,
    truncated: bool,
    header_drift: Vec<HeaderDrift>,
}

impl TableAccumulator {
    pub(super) fn new(max_rows: usize) -> Self {
        Self {
            table: CanonicalTable::default(),
            max_rows,
            truncated: false,
            header_drift: Vec::new(),
        }
    }

    /// Append one page. The first page with headers fixes the header set;
    /// later pages are conformed to it and any difference is recorded as
    /// drift.
    pub(super) fn absorb(&mut self, page: u32, normalized: CanonicalTable) -> Option<&HeaderDrift> {
        let (headers, rows) = normalized.into_parts();
        let mut drifted = false;
        if self.table.headers().is_empty() && self.table.is_empty() {
            self.table = CanonicalTable::new(headers);
        } else if let Some(drift) = HeaderDrift::between(page, self.table.headers(), &headers) {
            self.header_drift.push(drift);
            drifted = true;
        }

        let room = self.max_rows.saturating_sub(self.table.row_count());
        if rows.len() > room {
            self.truncated = true;
        }
        for row in rows.into_iter().take(room) {
            self.table.push_row(row);
        }

        if drifted { self.header_drift.last() } else { None }
    }

    pub(super) fn row_count(&self) -> usize {
        self.table.row_count()
    }

    pub(super) fn is_full(&self) -> bool {
        self.table.row_count() >= self.max_rows
    }

    pub(super) fn truncated(&self) -> bool {
        self.truncated
    }

    pub(super) fn finish(self) -> (CanonicalTable, Vec<HeaderDrift>) {
        (self.table, self.header_drift)
    }
}
