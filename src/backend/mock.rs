//! Scriptable in-memory backend for tests.
//!
//! Every driver, connection and metadata handle shares one [`MockState`], so
//! a test can queue responses before dispatching and inspect what the shell
//! did afterwards.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use super::{
    BufferedCursor, ColumnMeta, Connection, Cursor, Driver, DriverKind, Execution, Isolation,
    Metadata, RowValues, Warning,
};
use crate::error::ShellError;

#[derive(Debug, Clone, Default)]
pub struct MockRow {
    pub values: RowValues,
    pub inserted: bool,
    pub updated: bool,
    pub deleted: bool,
}

impl MockRow {
    pub fn new(values: &[Option<&str>]) -> Self {
        Self {
            values: values.iter().map(|v| v.map(str::to_string)).collect(),
            ..Self::default()
        }
    }
}

/// Cursor with per-row state flags and an optional read failure.
#[derive(Debug, Clone, Default)]
pub struct MockCursor {
    columns: Vec<ColumnMeta>,
    rows: VecDeque<MockRow>,
    current: Option<MockRow>,
    fail_after: Option<usize>,
    read: usize,
    pub flag_errors: bool,
}

impl MockCursor {
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<MockRow>) -> Self {
        Self {
            columns,
            rows: rows.into(),
            ..Self::default()
        }
    }

    /// Plain rows under label-only columns.
    pub fn table(labels: &[&str], rows: &[&[Option<&str>]]) -> Self {
        Self::new(
            labels.iter().map(|l| ColumnMeta::labelled(l)).collect(),
            rows.iter().map(|r| MockRow::new(r)).collect(),
        )
    }

    /// The read after `rows` successful ones fails.
    pub fn failing_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }
}

impl Cursor for MockCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<RowValues>, ShellError> {
        if self.fail_after == Some(self.read) {
            return Err(ShellError::Backend {
                message: "cursor failed".to_string(),
                state: "08S01".to_string(),
                code: 17,
            });
        }
        self.read += 1;
        self.current = self.rows.pop_front();
        Ok(self.current.as_ref().map(|row| row.values.clone()))
    }

    fn row_inserted(&self) -> Result<bool, ShellError> {
        self.flag(|row| row.inserted)
    }

    fn row_updated(&self) -> Result<bool, ShellError> {
        self.flag(|row| row.updated)
    }

    fn row_deleted(&self) -> Result<bool, ShellError> {
        self.flag(|row| row.deleted)
    }
}

impl MockCursor {
    fn flag(&self, get: fn(&MockRow) -> bool) -> Result<bool, ShellError> {
        if self.flag_errors {
            return Err(ShellError::backend("row state unsupported"));
        }
        Ok(self.current.as_ref().is_some_and(get))
    }
}

pub enum Response {
    Update(u64),
    Rows(MockCursor),
    Fail(String),
}

#[derive(Default)]
pub struct MockState {
    pub responses: VecDeque<Response>,
    pub executed: Vec<String>,
    pub connects: usize,
    pub fail_connect: bool,
    pub commits: usize,
    pub rollbacks: usize,
    pub closes: usize,
    pub fail_close: bool,
    pub fail_isolation: bool,
    pub auto_commit_calls: Vec<bool>,
    pub isolation_calls: Vec<Isolation>,
    pub warnings: Option<Arc<Warning>>,
    /// `(table, columns)` in declaration order.
    pub tables: Vec<(String, Vec<String>)>,
    /// `(table, key columns)`.
    pub primary_keys: Vec<(String, Vec<String>)>,
    pub fail_primary_keys: bool,
    pub primary_key_lookups: usize,
}

pub type SharedState = Rc<RefCell<MockState>>;

pub fn shared() -> SharedState {
    Rc::new(RefCell::new(MockState::default()))
}

pub struct MockDriver {
    state: SharedState,
}

impl MockDriver {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

impl Driver for MockDriver {
    fn id(&self) -> &str {
        "mock"
    }

    fn accepts_url(&self, url: &str) -> bool {
        url.starts_with("mock:")
    }

    fn name(&self) -> String {
        "Mock Driver".to_string()
    }

    fn version(&self) -> String {
        "0.1".to_string()
    }

    fn connect(
        &self,
        url: &str,
        _username: &str,
        _password: &str,
    ) -> Result<Box<dyn Connection>, ShellError> {
        let mut state = self.state.borrow_mut();
        if state.fail_connect {
            return Err(ShellError::backend(format!("Cannot reach {url}")));
        }
        state.connects += 1;
        Ok(Box::new(MockConnection {
            state: Rc::clone(&self.state),
            url: url.to_string(),
            auto_commit: true,
            isolation: Isolation::ReadCommitted,
            closed: false,
        }))
    }
}

pub struct MockConnection {
    state: SharedState,
    url: String,
    auto_commit: bool,
    isolation: Isolation,
    closed: bool,
}

impl Connection for MockConnection {
    fn execute(&mut self, sql: &str) -> Result<Execution, ShellError> {
        let mut state = self.state.borrow_mut();
        state.executed.push(sql.to_string());
        match state.responses.pop_front() {
            Some(Response::Rows(cursor)) => Ok(Execution {
                update_count: None,
                cursor: Some(Box::new(cursor)),
            }),
            Some(Response::Update(count)) => Ok(Execution {
                update_count: Some(count),
                cursor: None,
            }),
            Some(Response::Fail(message)) => Err(ShellError::Backend {
                message,
                state: "42000".to_string(),
                code: 1064,
            }),
            None => Ok(Execution {
                update_count: Some(0),
                cursor: None,
            }),
        }
    }

    fn metadata(&mut self) -> Result<Box<dyn Metadata>, ShellError> {
        Ok(Box::new(MockMetadata {
            state: Rc::clone(&self.state),
            url: self.url.clone(),
        }))
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), ShellError> {
        self.state.borrow_mut().auto_commit_calls.push(enabled);
        self.auto_commit = enabled;
        Ok(())
    }

    fn isolation(&self) -> Isolation {
        self.isolation
    }

    fn set_isolation(&mut self, level: Isolation) -> Result<(), ShellError> {
        let mut state = self.state.borrow_mut();
        if state.fail_isolation {
            return Err(ShellError::backend(format!("{level} is not supported")));
        }
        state.isolation_calls.push(level);
        self.isolation = level;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ShellError> {
        self.state.borrow_mut().commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ShellError> {
        self.state.borrow_mut().rollbacks += 1;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) -> Result<(), ShellError> {
        let mut state = self.state.borrow_mut();
        state.closes += 1;
        self.closed = true;
        if state.fail_close {
            return Err(ShellError::backend("close failed"));
        }
        Ok(())
    }

    fn warnings(&mut self) -> Option<Arc<Warning>> {
        self.state.borrow().warnings.clone()
    }

    fn clear_warnings(&mut self) {
        self.state.borrow_mut().warnings = None;
    }
}

pub struct MockMetadata {
    state: SharedState,
    url: String,
}

impl Metadata for MockMetadata {
    fn kind(&self) -> DriverKind {
        DriverKind::Sqlite
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn database_product_name(&mut self) -> Result<String, ShellError> {
        Ok("MockDB".to_string())
    }

    fn database_product_version(&mut self) -> Result<String, ShellError> {
        Ok("1.0".to_string())
    }

    fn driver_name(&self) -> String {
        "Mock Driver".to_string()
    }

    fn driver_version(&self) -> String {
        "0.1".to_string()
    }

    fn user_name(&mut self) -> Result<String, ShellError> {
        Ok("tester".to_string())
    }

    fn identifier_quote_string(&self) -> String {
        "\"".to_string()
    }

    fn sql_keywords(&mut self) -> Result<String, ShellError> {
        Ok("FROB,TWIDDLE".to_string())
    }

    fn numeric_functions(&mut self) -> Result<String, ShellError> {
        Ok("ABS".to_string())
    }

    fn string_functions(&mut self) -> Result<String, ShellError> {
        Ok("LOWER,UPPER".to_string())
    }

    fn system_functions(&mut self) -> Result<String, ShellError> {
        Ok(String::new())
    }

    fn time_date_functions(&mut self) -> Result<String, ShellError> {
        Ok("NOW".to_string())
    }

    fn is_read_only(&mut self) -> Result<bool, ShellError> {
        Ok(false)
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn default_transaction_isolation(&self) -> Isolation {
        Isolation::ReadCommitted
    }

    fn supports_transaction_isolation_level(&self, level: Isolation) -> bool {
        level != Isolation::None
    }

    fn tables(&mut self, pattern: Option<&str>) -> Result<Box<dyn Cursor>, ShellError> {
        let state = self.state.borrow();
        let rows = state
            .tables
            .iter()
            .filter(|(name, _)| like(pattern, name))
            .map(|(name, _)| vec![None, Some(name.clone()), Some("TABLE".to_string())])
            .collect();
        Ok(Box::new(BufferedCursor::from_labels(
            &["TABLE_SCHEM", "TABLE_NAME", "TABLE_TYPE"],
            rows,
        )))
    }

    fn columns(
        &mut self,
        table_pattern: Option<&str>,
        column_pattern: Option<&str>,
    ) -> Result<Box<dyn Cursor>, ShellError> {
        let state = self.state.borrow();
        let mut rows = Vec::new();
        for (table, columns) in state.tables.iter().filter(|(t, _)| like(table_pattern, t)) {
            for (position, column) in columns.iter().enumerate() {
                if like(column_pattern, column) {
                    rows.push(vec![
                        Some(table.clone()),
                        Some(column.clone()),
                        Some("VARCHAR".to_string()),
                        Some("YES".to_string()),
                        Some((position + 1).to_string()),
                    ]);
                }
            }
        }
        Ok(Box::new(BufferedCursor::from_labels(
            &["TABLE_NAME", "COLUMN_NAME", "TYPE_NAME", "IS_NULLABLE", "ORDINAL_POSITION"],
            rows,
        )))
    }

    fn primary_keys(&mut self, table: &str) -> Result<Box<dyn Cursor>, ShellError> {
        let mut state = self.state.borrow_mut();
        state.primary_key_lookups += 1;
        if state.fail_primary_keys {
            return Err(ShellError::backend("metadata unavailable"));
        }
        let rows = state
            .primary_keys
            .iter()
            .filter(|(t, _)| t.eq_ignore_ascii_case(table))
            .flat_map(|(t, columns)| {
                columns.iter().enumerate().map(move |(i, c)| {
                    vec![Some(t.clone()), Some(c.clone()), Some((i + 1).to_string())]
                })
            })
            .collect();
        Ok(Box::new(BufferedCursor::from_labels(
            &["TABLE_NAME", "COLUMN_NAME", "KEY_SEQ"],
            rows,
        )))
    }

    fn schemas(&mut self) -> Result<Box<dyn Cursor>, ShellError> {
        Ok(Box::new(BufferedCursor::from_labels(
            &["TABLE_SCHEM"],
            vec![vec![Some("main".to_string())]],
        )))
    }
}

/// `None` and `%` match everything; anything else is a case-insensitive
/// exact match.
fn like(pattern: Option<&str>, value: &str) -> bool {
    match pattern {
        None | Some("%") => true,
        Some(p) => p.eq_ignore_ascii_case(value),
    }
}
