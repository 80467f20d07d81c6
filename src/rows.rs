//! A fully read result set with shared column widths.

use tracing::debug;

use crate::backend::{ColumnMeta, Cursor, Metadata, column_values};
use crate::color::display_width;
use crate::error::ShellError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowState {
    #[default]
    Normal,
    Inserted,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub values: Vec<Option<String>>,
    /// Visible width per column; shared across the set after normalizing.
    pub sizes: Vec<usize>,
    pub state: RowState,
    pub is_header: bool,
}

fn cell_size(value: &Option<String>) -> usize {
    value.as_ref().map_or(1, |v| display_width(v))
}

impl Row {
    fn header(columns: &[ColumnMeta]) -> Self {
        let values: Vec<Option<String>> = columns.iter().map(|c| Some(c.label.clone())).collect();
        Self {
            sizes: values.iter().map(cell_size).collect(),
            values,
            state: RowState::Normal,
            is_header: true,
        }
    }

    /// Row-state lookups that fail count as false.
    fn data(values: Vec<Option<String>>, cursor: &dyn Cursor) -> Self {
        let deleted = cursor.row_deleted().unwrap_or(false);
        let updated = cursor.row_updated().unwrap_or(false);
        let inserted = cursor.row_inserted().unwrap_or(false);
        let state = if deleted {
            RowState::Deleted
        } else if updated {
            RowState::Updated
        } else if inserted {
            RowState::Inserted
        } else {
            RowState::Normal
        };
        Self {
            sizes: values.iter().map(cell_size).collect(),
            values,
            state,
            is_header: false,
        }
    }

    /// Cell text as displayed; null shows as empty.
    pub fn display(&self, column: usize) -> &str {
        self.values
            .get(column)
            .and_then(|v| v.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyState {
    Unknown,
    Yes,
    No,
}

#[derive(Debug)]
pub struct RowSet {
    columns: Vec<ColumnMeta>,
    rows: Vec<Row>,
    normalized: bool,
    primary_keys: Vec<KeyState>,
}

impl RowSet {
    /// Reads the whole cursor. Row 0 is the header.
    pub fn read(cursor: &mut dyn Cursor) -> Result<Self, ShellError> {
        let columns = cursor.columns().to_vec();
        let mut rows = vec![Row::header(&columns)];
        while let Some(mut values) = cursor.next_row()? {
            values.resize(columns.len(), None);
            rows.push(Row::data(values, cursor));
        }
        debug!("[RowSet::read] Read {} rows", rows.len() - 1);
        Ok(Self {
            primary_keys: vec![KeyState::Unknown; columns.len()],
            columns,
            rows,
            normalized: false,
        })
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Rows excluding the header.
    pub fn count(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    /// Sets every row's sizes to the column maximum plus one, capped at
    /// `max_column_width` when it is positive. Only the first call has an
    /// effect.
    pub fn normalize(&mut self, max_column_width: usize) {
        if self.normalized {
            return;
        }
        let mut widths = vec![0; self.columns.len()];
        for row in &self.rows {
            for (width, size) in widths.iter_mut().zip(&row.sizes) {
                *width = (*width).max(size + 1);
            }
        }
        if max_column_width > 0 {
            for width in &mut widths {
                *width = (*width).min(max_column_width);
            }
        }
        for row in &mut self.rows {
            row.sizes.clone_from(&widths);
        }
        self.normalized = true;
    }

    /// Shared widths after [`normalize`](Self::normalize).
    pub fn widths(&self) -> &[usize] {
        self.rows.first().map_or(&[], |header| header.sizes.as_slice())
    }

    /// Whether `column` is part of its source table's primary key. The answer
    /// is looked up at most once per column; any failure counts as no.
    pub fn is_primary_key(&mut self, column: usize, metadata: &mut dyn Metadata) -> bool {
        match self.primary_keys.get(column) {
            Some(KeyState::Yes) => return true,
            Some(KeyState::No) | None => return false,
            Some(KeyState::Unknown) => {}
        }

        let answer = self.lookup_primary_key(column, metadata);
        self.primary_keys[column] = if answer { KeyState::Yes } else { KeyState::No };
        answer
    }

    fn lookup_primary_key(&self, column: usize, metadata: &mut dyn Metadata) -> bool {
        let meta = &self.columns[column];
        if meta.table.is_empty() || meta.name.is_empty() {
            return false;
        }
        let keys = metadata
            .primary_keys(&meta.table)
            .and_then(|mut cursor| column_values(cursor.as_mut(), "COLUMN_NAME"));
        match keys {
            Ok(keys) => keys.iter().any(|k| k.eq_ignore_ascii_case(&meta.name)),
            Err(e) => {
                debug!("[RowSet::is_primary_key] Lookup for {} failed: {}", meta.table, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockCursor, MockDriver, MockRow, SharedState, shared};
    use crate::backend::{Connection, Driver};
    use rstest::rstest;

    fn name_val() -> MockCursor {
        MockCursor::table(
            &["NAME", "VAL"],
            &[
                &[Some("A"), Some("1")],
                &[Some("BB"), Some("22")],
                &[Some("C"), Some("333")],
            ],
        )
    }

    fn metadata(state: &SharedState) -> Box<dyn Metadata> {
        let mut connection = MockDriver::new(state.clone()).connect("mock:db", "", "").unwrap();
        connection.metadata().unwrap()
    }

    #[rstest]
    fn test_normalized_widths_are_max_plus_one() {
        let mut rows = RowSet::read(&mut name_val()).unwrap();
        rows.normalize(0);
        assert_eq!(rows.widths(), &[5, 4]);
        assert!(rows.rows().iter().all(|r| r.sizes == vec![5, 4]));
        assert_eq!(rows.count(), 3);
    }

    #[rstest]
    fn test_normalize_runs_once() {
        let mut rows = RowSet::read(&mut name_val()).unwrap();
        rows.normalize(0);
        rows.normalize(2);
        assert_eq!(rows.widths(), &[5, 4]);
    }

    #[rstest]
    #[case(3, vec![3, 3])]
    #[case(100, vec![5, 4])]
    fn test_max_column_width_caps(#[case] cap: usize, #[case] expected: Vec<usize>) {
        let mut rows = RowSet::read(&mut name_val()).unwrap();
        rows.normalize(cap);
        assert_eq!(rows.widths(), expected.as_slice());
    }

    #[rstest]
    fn test_widths_use_display_columns() {
        let mut cursor = MockCursor::table(&["N"], &[&[Some("東京")], &[Some("abc")]]);
        let mut rows = RowSet::read(&mut cursor).unwrap();
        rows.normalize(0);
        assert_eq!(rows.widths(), &[5]);
    }

    #[rstest]
    fn test_null_cells_count_as_one() {
        let mut cursor = MockCursor::table(&["X"], &[&[None], &[None]]);
        let mut rows = RowSet::read(&mut cursor).unwrap();
        rows.normalize(0);
        assert_eq!(rows.widths(), &[2]);
        assert_eq!(rows.rows()[1].display(0), "");
    }

    #[rstest]
    fn test_empty_result_has_only_header() {
        let mut cursor = MockCursor::table(&["A", "B"], &[]);
        let rows = RowSet::read(&mut cursor).unwrap();
        assert_eq!(rows.count(), 0);
        assert!(rows.rows()[0].is_header);
    }

    #[rstest]
    fn test_row_state_precedence() {
        let mut both = MockRow::new(&[Some("x")]);
        both.deleted = true;
        both.inserted = true;
        let mut updated = MockRow::new(&[Some("y")]);
        updated.updated = true;
        updated.inserted = true;
        let mut inserted = MockRow::new(&[Some("z")]);
        inserted.inserted = true;
        let mut cursor = MockCursor::new(
            vec![ColumnMeta::labelled("C")],
            vec![both, updated, inserted, MockRow::new(&[Some("w")])],
        );

        let rows = RowSet::read(&mut cursor).unwrap();
        let states: Vec<RowState> = rows.rows()[1..].iter().map(|r| r.state).collect();
        assert_eq!(
            states,
            vec![RowState::Deleted, RowState::Updated, RowState::Inserted, RowState::Normal]
        );
    }

    #[rstest]
    fn test_failing_flags_default_to_normal() {
        let mut row = MockRow::new(&[Some("x")]);
        row.deleted = true;
        let mut cursor = MockCursor::new(vec![ColumnMeta::labelled("C")], vec![row]);
        cursor.flag_errors = true;
        let rows = RowSet::read(&mut cursor).unwrap();
        assert_eq!(rows.rows()[1].state, RowState::Normal);
    }

    #[rstest]
    fn test_cursor_error_propagates() {
        let mut cursor = name_val().failing_after(1);
        assert!(RowSet::read(&mut cursor).is_err());
    }

    #[rstest]
    fn test_primary_key_lookup_is_cached() {
        let state = shared();
        state.borrow_mut().primary_keys = vec![("Users".to_string(), vec!["ID".to_string()])];
        let mut meta = metadata(&state);
        let mut cursor = MockCursor::new(
            vec![
                ColumnMeta::new("id", "users", "id"),
                ColumnMeta::new("name", "users", "name"),
                ColumnMeta::labelled("expr"),
            ],
            vec![],
        );
        let mut rows = RowSet::read(&mut cursor).unwrap();

        assert!(rows.is_primary_key(0, meta.as_mut()));
        assert!(rows.is_primary_key(0, meta.as_mut()));
        assert!(!rows.is_primary_key(1, meta.as_mut()));
        assert!(!rows.is_primary_key(1, meta.as_mut()));
        // no source table, no lookup
        assert!(!rows.is_primary_key(2, meta.as_mut()));
        assert_eq!(state.borrow().primary_key_lookups, 2);
    }

    #[rstest]
    fn test_primary_key_failure_counts_as_no() {
        let state = shared();
        state.borrow_mut().fail_primary_keys = true;
        let mut meta = metadata(&state);
        let mut cursor = MockCursor::new(vec![ColumnMeta::new("id", "users", "id")], vec![]);
        let mut rows = RowSet::read(&mut cursor).unwrap();
        assert!(!rows.is_primary_key(0, meta.as_mut()));
        state.borrow_mut().fail_primary_keys = false;
        assert!(!rows.is_primary_key(0, meta.as_mut()));
        assert_eq!(state.borrow().primary_key_lookups, 1);
    }
}
