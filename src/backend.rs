//! The seam between the shell and a database driver.
//!
//! Everything above this module talks to `dyn Driver`, `dyn Connection`,
//! `dyn Cursor` and `dyn Metadata`. The sqlx implementation lives in
//! `database_sqlx`.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::ShellError;

#[cfg(test)]
pub mod mock;

/// Database families compiled into the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[strum(ascii_case_insensitive)]
pub enum DriverKind {
    #[strum(serialize = "sqlite")]
    Sqlite,
    #[strum(to_string = "postgres", serialize = "postgresql")]
    Postgres,
    #[strum(to_string = "mysql", serialize = "mariadb")]
    MySql,
}

impl DriverKind {
    /// Infers the driver from a URL scheme, accepting a leading `jdbc:`.
    pub fn from_url(url: &str) -> Option<Self> {
        let url = url.strip_prefix("jdbc:").unwrap_or(url);
        let scheme = url.split(':').next()?;
        scheme.parse().ok()
    }
}

/// Transaction isolation levels, named the way users type them.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Isolation {
    #[strum(serialize = "TRANSACTION_NONE")]
    #[serde(rename = "TRANSACTION_NONE")]
    None,
    #[strum(serialize = "TRANSACTION_READ_UNCOMMITTED")]
    #[serde(rename = "TRANSACTION_READ_UNCOMMITTED")]
    ReadUncommitted,
    #[strum(serialize = "TRANSACTION_READ_COMMITTED")]
    #[serde(rename = "TRANSACTION_READ_COMMITTED")]
    ReadCommitted,
    #[strum(serialize = "TRANSACTION_REPEATABLE_READ")]
    #[serde(rename = "TRANSACTION_REPEATABLE_READ")]
    RepeatableRead,
    #[strum(serialize = "TRANSACTION_SERIALIZABLE")]
    #[serde(rename = "TRANSACTION_SERIALIZABLE")]
    Serializable,
}

impl Isolation {
    /// Numeric level as reported by metadata queries.
    pub fn code(self) -> i32 {
        match self {
            Isolation::None => 0,
            Isolation::ReadUncommitted => 1,
            Isolation::ReadCommitted => 2,
            Isolation::RepeatableRead => 4,
            Isolation::Serializable => 8,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Isolation::iter().find(|level| level.code() == code)
    }

    /// SQL spelling used by `SET TRANSACTION ISOLATION LEVEL`.
    pub fn sql_name(self) -> Option<&'static str> {
        match self {
            Isolation::None => None,
            Isolation::ReadUncommitted => Some("READ UNCOMMITTED"),
            Isolation::ReadCommitted => Some("READ COMMITTED"),
            Isolation::RepeatableRead => Some("REPEATABLE READ"),
            Isolation::Serializable => Some("SERIALIZABLE"),
        }
    }

    pub fn usage() -> String {
        let names: Vec<String> = Isolation::iter().map(|level| level.as_ref().to_owned()).collect();
        format!("isolation <{}>", names.join(" | "))
    }
}

/// A non-fatal notice attached to a connection. Warnings form a chain through
/// `next`; identity is the allocation, so the same notice reported twice is
/// recognised by pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub message: String,
    pub state: String,
    pub code: i32,
    pub next: Option<Arc<Warning>>,
}

impl Warning {
    pub fn new(message: impl Into<String>, state: impl Into<String>, code: i32) -> Self {
        Self {
            message: message.into(),
            state: state.into(),
            code,
            next: None,
        }
    }

    pub fn with_next(mut self, next: Arc<Warning>) -> Self {
        self.next = Some(next);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMeta {
    pub label: String,
    /// Source table, empty when the driver cannot tell.
    pub table: String,
    /// Source column name, empty when the driver cannot tell.
    pub name: String,
}

impl ColumnMeta {
    pub fn new(label: &str, table: &str, name: &str) -> Self {
        Self {
            label: label.to_string(),
            table: table.to_string(),
            name: name.to_string(),
        }
    }

    pub fn labelled(label: &str) -> Self {
        Self::new(label, "", label)
    }
}

pub type RowValues = Vec<Option<String>>;

/// A forward-only sequence of rows with column metadata.
pub trait Cursor {
    fn columns(&self) -> &[ColumnMeta];

    /// Advances and returns the next row, or `None` when exhausted.
    fn next_row(&mut self) -> Result<Option<RowValues>, ShellError>;

    fn row_inserted(&self) -> Result<bool, ShellError> {
        Ok(false)
    }

    fn row_updated(&self) -> Result<bool, ShellError> {
        Ok(false)
    }

    fn row_deleted(&self) -> Result<bool, ShellError> {
        Ok(false)
    }
}

/// Rows already fetched into memory.
#[derive(Debug, Clone, Default)]
pub struct BufferedCursor {
    columns: Vec<ColumnMeta>,
    rows: VecDeque<RowValues>,
}

impl BufferedCursor {
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<RowValues>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }

    /// Builds a cursor whose columns carry labels only.
    pub fn from_labels(labels: &[&str], rows: Vec<RowValues>) -> Self {
        Self::new(labels.iter().map(|l| ColumnMeta::labelled(l)).collect(), rows)
    }
}

impl Cursor for BufferedCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<RowValues>, ShellError> {
        Ok(self.rows.pop_front())
    }
}

/// Drains a cursor and returns the values of the column labelled `label`.
pub fn column_values(cursor: &mut dyn Cursor, label: &str) -> Result<Vec<String>, ShellError> {
    let Some(index) = cursor
        .columns()
        .iter()
        .position(|c| c.label.eq_ignore_ascii_case(label))
    else {
        return Ok(Vec::new());
    };
    let mut values = Vec::new();
    while let Some(row) = cursor.next_row()? {
        if let Some(Some(value)) = row.into_iter().nth(index) {
            values.push(value);
        }
    }
    Ok(values)
}

/// Outcome of one `execute`: an update count, a cursor, or both.
#[derive(Default)]
pub struct Execution {
    pub update_count: Option<u64>,
    pub cursor: Option<Box<dyn Cursor>>,
}

/// Introspection calls on an open connection. Methods that return a cursor
/// use upper-case labels (`TABLE_NAME`, `COLUMN_NAME`, ...).
pub trait Metadata {
    fn kind(&self) -> DriverKind;
    fn url(&self) -> String;
    fn database_product_name(&mut self) -> Result<String, ShellError>;
    fn database_product_version(&mut self) -> Result<String, ShellError>;
    fn driver_name(&self) -> String;
    fn driver_version(&self) -> String;
    fn user_name(&mut self) -> Result<String, ShellError>;
    fn identifier_quote_string(&self) -> String;
    /// Comma-separated, like the other function/keyword lists.
    fn sql_keywords(&mut self) -> Result<String, ShellError>;
    fn numeric_functions(&mut self) -> Result<String, ShellError>;
    fn string_functions(&mut self) -> Result<String, ShellError>;
    fn system_functions(&mut self) -> Result<String, ShellError>;
    fn time_date_functions(&mut self) -> Result<String, ShellError>;
    fn is_read_only(&mut self) -> Result<bool, ShellError>;
    fn supports_transactions(&self) -> bool;
    fn default_transaction_isolation(&self) -> Isolation;
    fn supports_transaction_isolation_level(&self, level: Isolation) -> bool;

    /// `TABLE_SCHEM`, `TABLE_NAME`, `TABLE_TYPE`.
    fn tables(&mut self, pattern: Option<&str>) -> Result<Box<dyn Cursor>, ShellError>;
    /// `TABLE_NAME`, `COLUMN_NAME`, `TYPE_NAME`, `IS_NULLABLE`, `ORDINAL_POSITION`.
    fn columns(
        &mut self,
        table_pattern: Option<&str>,
        column_pattern: Option<&str>,
    ) -> Result<Box<dyn Cursor>, ShellError>;
    /// `TABLE_NAME`, `COLUMN_NAME`, `KEY_SEQ`.
    fn primary_keys(&mut self, table: &str) -> Result<Box<dyn Cursor>, ShellError>;
    /// `TABLE_SCHEM`.
    fn schemas(&mut self) -> Result<Box<dyn Cursor>, ShellError>;
}

pub trait Connection {
    fn execute(&mut self, sql: &str) -> Result<Execution, ShellError>;
    fn metadata(&mut self) -> Result<Box<dyn Metadata>, ShellError>;
    fn auto_commit(&self) -> bool;
    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), ShellError>;
    fn isolation(&self) -> Isolation;
    fn set_isolation(&mut self, level: Isolation) -> Result<(), ShellError>;
    fn commit(&mut self) -> Result<(), ShellError>;
    fn rollback(&mut self) -> Result<(), ShellError>;
    fn is_closed(&self) -> bool;
    fn close(&mut self) -> Result<(), ShellError>;

    /// Head of the pending warning chain.
    fn warnings(&mut self) -> Option<Arc<Warning>> {
        None
    }

    fn clear_warnings(&mut self) {}
}

pub trait Driver {
    /// Identifier accepted by `-d` and by `!connect ... <driver>`.
    fn id(&self) -> &str;
    fn accepts_url(&self, url: &str) -> bool;
    fn name(&self) -> String;
    fn version(&self) -> String;
    fn connect(
        &self,
        url: &str,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn Connection>, ShellError>;
}

/// Drivers known to the shell, searched in registration order.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: Vec<Box<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, driver: Box<dyn Driver>) {
        self.drivers.push(driver);
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Driver> {
        self.drivers.iter().map(|d| d.as_ref())
    }

    /// An explicit id wins; otherwise the first driver accepting the URL.
    pub fn resolve(&self, id: Option<&str>, url: &str) -> Result<&dyn Driver, ShellError> {
        match id.filter(|id| !id.is_empty()) {
            Some(id) => self
                .iter()
                .find(|d| d.id().eq_ignore_ascii_case(id))
                .ok_or_else(|| ShellError::backend(format!("No such driver: {id}"))),
            None => self
                .iter()
                .find(|d| d.accepts_url(url))
                .ok_or_else(|| ShellError::backend(format!("No known driver to handle \"{url}\""))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("sqlite::memory:", Some(DriverKind::Sqlite))]
    #[case("jdbc:sqlite:/tmp/x.db", Some(DriverKind::Sqlite))]
    #[case("postgres://localhost/db", Some(DriverKind::Postgres))]
    #[case("postgresql://localhost/db", Some(DriverKind::Postgres))]
    #[case("MySQL://localhost/db", Some(DriverKind::MySql))]
    #[case("mariadb://localhost/db", Some(DriverKind::MySql))]
    #[case("oracle:thin:@host", None)]
    #[case("", None)]
    fn test_driver_kind_from_url(#[case] url: &str, #[case] expected: Option<DriverKind>) {
        assert_eq!(DriverKind::from_url(url), expected);
    }

    #[rstest]
    #[case("TRANSACTION_READ_COMMITTED", Isolation::ReadCommitted)]
    #[case("transaction_serializable", Isolation::Serializable)]
    fn test_isolation_parses_case_insensitively(#[case] name: &str, #[case] expected: Isolation) {
        assert_eq!(name.parse::<Isolation>().ok(), Some(expected));
    }

    #[rstest]
    fn test_isolation_code_round_trip() {
        for level in Isolation::iter() {
            assert_eq!(Isolation::from_code(level.code()), Some(level));
        }
        assert_eq!(Isolation::from_code(3), None);
    }

    #[rstest]
    fn test_column_values_by_label() {
        let mut cursor = BufferedCursor::from_labels(
            &["TABLE_SCHEM", "TABLE_NAME"],
            vec![
                vec![None, Some("users".to_string())],
                vec![None, Some("orders".to_string())],
                vec![None, None],
            ],
        );
        let names = column_values(&mut cursor, "table_name").unwrap();
        assert_eq!(names, vec!["users", "orders"]);
    }
}
