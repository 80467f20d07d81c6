//! SQLite, PostgreSQL and MySQL through sqlx.
//!
//! The shell is synchronous, so each connection owns a current-thread tokio
//! runtime and blocks on every call. User statements race against Ctrl-C;
//! an interrupt drops the in-flight future, which abandons the statement.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use futures_util::TryStreamExt;
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Column, Connection as _, Either, Executor, Row, TypeInfo, ValueRef};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::backend::{
    BufferedCursor, ColumnMeta, Connection, Cursor, Driver, DriverKind, DriverRegistry, Execution,
    Isolation, Metadata, RowValues, Warning,
};
use crate::error::ShellError;

const SQLX_VERSION: &str = "0.8";

/// SQLSTATE class for warnings; `SHOW WARNINGS` only reports codes.
const WARNING_STATE: &str = "01000";

/// Registers one driver per compiled-in database family.
pub fn register_builtin(registry: &mut DriverRegistry) {
    registry.register(Box::new(SqlxDriver::new(DriverKind::Sqlite)));
    registry.register(Box::new(SqlxDriver::new(DriverKind::Postgres)));
    registry.register(Box::new(SqlxDriver::new(DriverKind::MySql)));
}

pub struct SqlxDriver {
    kind: DriverKind,
}

impl SqlxDriver {
    pub fn new(kind: DriverKind) -> Self {
        Self { kind }
    }
}

impl Driver for SqlxDriver {
    fn id(&self) -> &str {
        self.kind.as_ref()
    }

    fn accepts_url(&self, url: &str) -> bool {
        DriverKind::from_url(url) == Some(self.kind)
    }

    fn name(&self) -> String {
        format!("sqlx-{}", self.kind)
    }

    fn version(&self) -> String {
        SQLX_VERSION.to_string()
    }

    fn connect(
        &self,
        url: &str,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn Connection>, ShellError> {
        let target = connection_url(self.kind, url, username, password)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        debug!("[SqlxDriver::connect] Opening {} connection", self.kind);
        let link = runtime.block_on(Link::open(self.kind, &target))?;

        let session = Rc::new(Session {
            runtime,
            kind: self.kind,
            url: url.to_string(),
            link: RefCell::new(Some(link)),
        });
        Ok(Box::new(SqlxConnection {
            session,
            auto_commit: true,
            in_transaction: false,
            isolation: default_isolation(self.kind),
            warnings: None,
        }))
    }
}

/// Credentials go into the URL for server databases; SQLite ignores them.
fn connection_url(
    kind: DriverKind,
    url: &str,
    username: &str,
    password: &str,
) -> Result<String, ShellError> {
    let url = url.strip_prefix("jdbc:").unwrap_or(url);
    if kind == DriverKind::Sqlite || (username.is_empty() && password.is_empty()) {
        return Ok(url.to_string());
    }

    let mut parsed = url::Url::parse(url)
        .map_err(|e| ShellError::backend(format!("Invalid URL \"{url}\": {e}")))?;
    if !username.is_empty() {
        parsed
            .set_username(username)
            .map_err(|_| ShellError::backend(format!("URL \"{url}\" cannot carry a username")))?;
    }
    if !password.is_empty() {
        parsed
            .set_password(Some(password))
            .map_err(|_| ShellError::backend(format!("URL \"{url}\" cannot carry a password")))?;
    }
    Ok(parsed.to_string())
}

fn default_isolation(kind: DriverKind) -> Isolation {
    match kind {
        DriverKind::Sqlite => Isolation::Serializable,
        DriverKind::Postgres => Isolation::ReadCommitted,
        DriverKind::MySql => Isolation::RepeatableRead,
    }
}

/// Words and punctuation of a statement. String literals collapse to `'`
/// and quoted identifiers keep their quotes.
fn sql_tokens(sql: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if matches!(c, '(' | ')' | ',' | ';') {
            tokens.push(c.to_string());
            chars.next();
        } else if c == '\'' {
            chars.next();
            for c in chars.by_ref() {
                if c == '\'' {
                    break;
                }
            }
            tokens.push("'".to_string());
        } else {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || matches!(c, '(' | ')' | ',' | ';' | '\'') {
                    break;
                }
                chars.next();
                word.push(c);
                if matches!(c, '"' | '`') {
                    for q in chars.by_ref() {
                        word.push(q);
                        if q == c {
                            break;
                        }
                    }
                }
            }
            tokens.push(word);
        }
    }
    tokens
}

const CLAUSES: &[&str] = &[
    "where", "group", "order", "limit", "having", "union", "except", "intersect", "offset",
    "fetch", "window", "for", ";",
];

fn is_clause(token: &str) -> bool {
    CLAUSES.iter().any(|c| c.eq_ignore_ascii_case(token))
}

fn is_name(token: &str) -> bool {
    const JOINS: &[&str] = &["join", "inner", "left", "right", "full", "cross", "natural", "outer"];
    token
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '"' | '`'))
        && !is_clause(token)
        && !JOINS.iter().any(|j| j.eq_ignore_ascii_case(token))
}

/// The table read by a plain single-table `SELECT`, unquoted and without
/// its schema. Joins, comma lists and subqueries in `FROM` give `None`.
fn source_table(sql: &str) -> Option<String> {
    let tokens = sql_tokens(sql);
    if !tokens.first()?.eq_ignore_ascii_case("select") {
        return None;
    }

    let mut depth = 0usize;
    let from = tokens.iter().position(|t| {
        match t.as_str() {
            "(" => depth += 1,
            ")" => depth = depth.saturating_sub(1),
            _ => {}
        }
        depth == 0 && t.eq_ignore_ascii_case("from")
    })?;

    let mut rest = tokens[from + 1..].iter().peekable();
    let table = rest.next().filter(|t| is_name(t))?;
    if rest.peek().is_some_and(|t| t.eq_ignore_ascii_case("as")) {
        rest.next();
        rest.next().filter(|t| is_name(t))?;
    } else if rest.peek().is_some_and(|t| is_name(t)) {
        rest.next();
    }
    if rest.next().is_some_and(|t| !is_clause(t)) {
        return None;
    }

    let name = table.rsplit('.').next()?;
    Some(name.trim_matches(|c| matches!(c, '"' | '`')).to_string())
}

/// `SHOW WARNINGS` rows (`Level`, `Code`, `Message`) as a chain in the
/// order the server reported them.
fn warning_chain(rows: Vec<RowValues>) -> Option<Arc<Warning>> {
    rows.into_iter().rev().fold(None, |next, row| {
        let mut cells = row.into_iter().skip(1);
        let code = cells
            .next()
            .flatten()
            .and_then(|code| code.parse().ok())
            .unwrap_or(0);
        let message = cells.next().flatten().unwrap_or_default();
        let warning = Warning::new(message, WARNING_STATE, code);
        Some(Arc::new(match next {
            Some(next) => warning.with_next(next),
            None => warning,
        }))
    })
}

#[derive(Default)]
struct Fetched {
    affected: u64,
    columns: Vec<ColumnMeta>,
    rows: Vec<RowValues>,
}

fn column_meta<C: Column>(columns: &[C]) -> Vec<ColumnMeta> {
    columns.iter().map(|c| ColumnMeta::labelled(c.name())).collect()
}

/// Runs raw SQL on a concrete connection and buffers every row. When nothing
/// came back the statement is described so empty result sets keep a header.
macro_rules! drain {
    ($conn:expr, $sql:expr, $format:path) => {{
        let mut fetched = Fetched::default();
        {
            let mut stream = sqlx::raw_sql($sql).fetch_many(&mut *$conn);
            while let Some(item) = stream.try_next().await? {
                match item {
                    Either::Left(done) => fetched.affected += done.rows_affected(),
                    Either::Right(row) => {
                        if fetched.columns.is_empty() {
                            fetched.columns = column_meta(row.columns());
                        }
                        fetched.rows.push((0..row.len()).map(|i| $format(&row, i)).collect());
                    }
                }
            }
        }
        if fetched.rows.is_empty() {
            if let Ok(described) = (&mut *$conn).describe($sql).await {
                fetched.columns = column_meta(described.columns());
            }
        }
        fetched
    }};
}

macro_rules! fetch_bound {
    ($conn:expr, $sql:expr, $binds:expr, $format:path) => {{
        let mut query = sqlx::query($sql);
        for bind in $binds {
            query = query.bind(bind.clone());
        }
        let rows = query.fetch_all(&mut *$conn).await?;
        rows.iter()
            .map(|row| (0..row.len()).map(|i| $format(row, i)).collect())
            .collect::<Vec<RowValues>>()
    }};
}

enum Link {
    Sqlite(SqliteConnection),
    Postgres(PgConnection),
    MySql(MySqlConnection),
}

impl Link {
    async fn open(kind: DriverKind, url: &str) -> Result<Self, sqlx::Error> {
        Ok(match kind {
            DriverKind::Sqlite => Link::Sqlite(SqliteConnection::connect(url).await?),
            DriverKind::Postgres => Link::Postgres(PgConnection::connect(url).await?),
            DriverKind::MySql => Link::MySql(MySqlConnection::connect(url).await?),
        })
    }

    async fn run(&mut self, sql: &str) -> Result<Fetched, sqlx::Error> {
        Ok(match self {
            Link::Sqlite(conn) => drain!(conn, sql, format_sqlite_value),
            Link::Postgres(conn) => drain!(conn, sql, format_postgres_value),
            Link::MySql(conn) => drain!(conn, sql, format_mysql_value),
        })
    }

    async fn rows(&mut self, sql: &str, binds: &[String]) -> Result<Vec<RowValues>, sqlx::Error> {
        Ok(match self {
            Link::Sqlite(conn) => fetch_bound!(conn, sql, binds, format_sqlite_value),
            Link::Postgres(conn) => fetch_bound!(conn, sql, binds, format_postgres_value),
            Link::MySql(conn) => fetch_bound!(conn, sql, binds, format_mysql_value),
        })
    }

    async fn close(self) -> Result<(), sqlx::Error> {
        match self {
            Link::Sqlite(conn) => conn.close().await,
            Link::Postgres(conn) => conn.close().await,
            Link::MySql(conn) => conn.close().await,
        }
    }
}

/// Runtime plus the live link, shared by a connection and its metadata.
struct Session {
    runtime: Runtime,
    kind: DriverKind,
    url: String,
    link: RefCell<Option<Link>>,
}

impl Session {
    fn closed() -> ShellError {
        ShellError::ConnectionState("Connection is closed".to_string())
    }

    fn run(&self, sql: &str) -> Result<Fetched, ShellError> {
        let mut guard = self.link.borrow_mut();
        let link = guard.as_mut().ok_or_else(Self::closed)?;
        self.runtime.block_on(cancellable(link.run(sql)))
    }

    fn run_quiet(&self, sql: &str) -> Result<(), ShellError> {
        let mut guard = self.link.borrow_mut();
        let link = guard.as_mut().ok_or_else(Self::closed)?;
        self.runtime.block_on(link.run(sql))?;
        Ok(())
    }

    fn rows(&self, sql: &str, binds: &[String]) -> Result<Vec<RowValues>, ShellError> {
        let mut guard = self.link.borrow_mut();
        let link = guard.as_mut().ok_or_else(Self::closed)?;
        Ok(self.runtime.block_on(link.rows(sql, binds))?)
    }

    fn scalar(&self, sql: &str) -> Result<String, ShellError> {
        let rows = self.rows(sql, &[])?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next().flatten())
            .unwrap_or_default())
    }

    fn cursor(
        &self,
        labels: &[&str],
        sql: &str,
        binds: &[String],
    ) -> Result<Box<dyn Cursor>, ShellError> {
        Ok(Box::new(BufferedCursor::from_labels(labels, self.rows(sql, binds)?)))
    }

    fn close(&self) -> Result<(), ShellError> {
        let Some(link) = self.link.borrow_mut().take() else {
            return Ok(());
        };
        self.runtime.block_on(link.close())?;
        Ok(())
    }
}

async fn cancellable<T>(
    work: impl Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, ShellError> {
    tokio::select! {
        result = work => result.map_err(ShellError::from),
        Ok(()) = tokio::signal::ctrl_c() => {
            debug!("[database_sqlx::cancellable] Interrupted, dropping statement");
            Err(ShellError::Cancelled)
        }
    }
}

pub struct SqlxConnection {
    session: Rc<Session>,
    auto_commit: bool,
    in_transaction: bool,
    isolation: Isolation,
    warnings: Option<Arc<Warning>>,
}

impl SqlxConnection {
    fn begin_sql(&self) -> &'static str {
        match self.session.kind {
            DriverKind::MySql => "START TRANSACTION",
            DriverKind::Sqlite | DriverKind::Postgres => "BEGIN",
        }
    }

    /// Only MySQL keeps a per-statement warning list the client can read.
    fn fetch_warnings(&self) -> Option<Arc<Warning>> {
        if self.session.kind != DriverKind::MySql {
            return None;
        }
        match self.session.run("SHOW WARNINGS") {
            Ok(fetched) => warning_chain(fetched.rows),
            Err(e) => {
                debug!("[SqlxConnection::fetch_warnings] SHOW WARNINGS failed: {}", e);
                None
            }
        }
    }

    fn finish(&mut self, sql: &str) -> Result<(), ShellError> {
        if self.in_transaction {
            self.in_transaction = false;
            self.session.run_quiet(sql)?;
        }
        Ok(())
    }
}

impl Connection for SqlxConnection {
    fn execute(&mut self, sql: &str) -> Result<Execution, ShellError> {
        if !self.auto_commit && !self.in_transaction {
            self.session.run_quiet(self.begin_sql())?;
            self.in_transaction = true;
        }

        debug!("[SqlxConnection::execute] Executing statement");
        let mut fetched = self.session.run(sql)?;
        self.warnings = self.fetch_warnings();
        if fetched.rows.is_empty() && fetched.columns.is_empty() {
            return Ok(Execution {
                update_count: Some(fetched.affected),
                cursor: None,
            });
        }

        if let Some(table) = source_table(sql) {
            for column in fetched.columns.iter_mut().filter(|c| c.table.is_empty()) {
                column.table.clone_from(&table);
            }
        }
        Ok(Execution {
            update_count: None,
            cursor: Some(Box::new(BufferedCursor::new(fetched.columns, fetched.rows))),
        })
    }

    fn warnings(&mut self) -> Option<Arc<Warning>> {
        self.warnings.clone()
    }

    fn clear_warnings(&mut self) {
        self.warnings = None;
    }

    fn metadata(&mut self) -> Result<Box<dyn Metadata>, ShellError> {
        if self.is_closed() {
            return Err(Session::closed());
        }
        Ok(Box::new(SqlxMetadata {
            session: Rc::clone(&self.session),
        }))
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), ShellError> {
        if enabled {
            self.finish("COMMIT")?;
        }
        self.auto_commit = enabled;
        Ok(())
    }

    fn isolation(&self) -> Isolation {
        self.isolation
    }

    fn set_isolation(&mut self, level: Isolation) -> Result<(), ShellError> {
        let unsupported =
            || ShellError::backend(format!("{level} is not supported by {}", self.session.kind));
        let sql = match (self.session.kind, level.sql_name()) {
            (_, None) => return Err(unsupported()),
            (DriverKind::Sqlite, Some(_)) => {
                if level == Isolation::ReadUncommitted {
                    "PRAGMA read_uncommitted = 1".to_string()
                } else {
                    "PRAGMA read_uncommitted = 0".to_string()
                }
            }
            (DriverKind::Postgres, Some(name)) => {
                format!("SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL {name}")
            }
            (DriverKind::MySql, Some(name)) => {
                format!("SET SESSION TRANSACTION ISOLATION LEVEL {name}")
            }
        };
        self.session.run_quiet(&sql)?;
        self.isolation = level;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ShellError> {
        self.finish("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), ShellError> {
        self.finish("ROLLBACK")
    }

    fn is_closed(&self) -> bool {
        self.session.link.borrow().is_none()
    }

    fn close(&mut self) -> Result<(), ShellError> {
        self.in_transaction = false;
        self.session.close()
    }
}

pub struct SqlxMetadata {
    session: Rc<Session>,
}

const TABLE_LABELS: &[&str] = &["TABLE_SCHEM", "TABLE_NAME", "TABLE_TYPE"];
const COLUMN_LABELS: &[&str] = &[
    "TABLE_NAME",
    "COLUMN_NAME",
    "TYPE_NAME",
    "IS_NULLABLE",
    "ORDINAL_POSITION",
];
const KEY_LABELS: &[&str] = &["TABLE_NAME", "COLUMN_NAME", "KEY_SEQ"];

const SQLITE_KEYWORDS: &str = "ABORT,ANALYZE,ATTACH,AUTOINCREMENT,CONFLICT,DETACH,EXCLUSIVE,GLOB,\
IGNORE,INDEXED,INSTEAD,PLAN,PRAGMA,RAISE,REINDEX,RENAME,REPLACE,TEMP,VACUUM,VIRTUAL";

impl Metadata for SqlxMetadata {
    fn kind(&self) -> DriverKind {
        self.session.kind
    }

    fn url(&self) -> String {
        self.session.url.clone()
    }

    fn database_product_name(&mut self) -> Result<String, ShellError> {
        Ok(match self.session.kind {
            DriverKind::Sqlite => "SQLite",
            DriverKind::Postgres => "PostgreSQL",
            DriverKind::MySql => "MySQL",
        }
        .to_string())
    }

    fn database_product_version(&mut self) -> Result<String, ShellError> {
        self.session.scalar(match self.session.kind {
            DriverKind::Sqlite => "SELECT sqlite_version()",
            DriverKind::Postgres => "SHOW server_version",
            DriverKind::MySql => "SELECT VERSION()",
        })
    }

    fn driver_name(&self) -> String {
        format!("sqlx-{}", self.session.kind)
    }

    fn driver_version(&self) -> String {
        SQLX_VERSION.to_string()
    }

    fn user_name(&mut self) -> Result<String, ShellError> {
        match self.session.kind {
            DriverKind::Sqlite => Ok(String::new()),
            DriverKind::Postgres => self.session.scalar("SELECT current_user::text"),
            DriverKind::MySql => self.session.scalar("SELECT CURRENT_USER()"),
        }
    }

    fn identifier_quote_string(&self) -> String {
        match self.session.kind {
            DriverKind::MySql => "`".to_string(),
            DriverKind::Sqlite | DriverKind::Postgres => "\"".to_string(),
        }
    }

    fn sql_keywords(&mut self) -> Result<String, ShellError> {
        match self.session.kind {
            DriverKind::Sqlite => Ok(SQLITE_KEYWORDS.to_string()),
            DriverKind::Postgres => self.session.scalar(
                "SELECT string_agg(upper(word), ',' ORDER BY word) FROM pg_get_keywords()",
            ),
            DriverKind::MySql => self.session.scalar(
                "SELECT GROUP_CONCAT(WORD ORDER BY WORD) FROM information_schema.KEYWORDS",
            ),
        }
    }

    fn numeric_functions(&mut self) -> Result<String, ShellError> {
        Ok(match self.session.kind {
            DriverKind::Sqlite => "ABS,MAX,MIN,RANDOM,ROUND,SIGN",
            DriverKind::Postgres | DriverKind::MySql => {
                "ABS,CEIL,CEILING,EXP,FLOOR,LN,LOG,MOD,PI,POWER,RANDOM,ROUND,SIGN,SQRT,TRUNC"
            }
        }
        .to_string())
    }

    fn string_functions(&mut self) -> Result<String, ShellError> {
        Ok(match self.session.kind {
            DriverKind::Sqlite => "INSTR,LENGTH,LOWER,LTRIM,REPLACE,RTRIM,SUBSTR,TRIM,UPPER",
            DriverKind::Postgres | DriverKind::MySql => {
                "CONCAT,LEFT,LENGTH,LOWER,LPAD,LTRIM,REPEAT,REPLACE,RIGHT,RPAD,RTRIM,SUBSTRING,TRIM,UPPER"
            }
        }
        .to_string())
    }

    fn system_functions(&mut self) -> Result<String, ShellError> {
        Ok(match self.session.kind {
            DriverKind::Sqlite => "CHANGES,COALESCE,IFNULL,LAST_INSERT_ROWID,NULLIF,TYPEOF",
            DriverKind::Postgres => "COALESCE,CURRENT_DATABASE,CURRENT_SCHEMA,CURRENT_USER,NULLIF,VERSION",
            DriverKind::MySql => "COALESCE,DATABASE,IFNULL,LAST_INSERT_ID,NULLIF,USER,VERSION",
        }
        .to_string())
    }

    fn time_date_functions(&mut self) -> Result<String, ShellError> {
        Ok(match self.session.kind {
            DriverKind::Sqlite => "DATE,DATETIME,JULIANDAY,STRFTIME,TIME",
            DriverKind::Postgres => "AGE,CURRENT_DATE,CURRENT_TIME,CURRENT_TIMESTAMP,DATE_PART,DATE_TRUNC,EXTRACT,NOW",
            DriverKind::MySql => "CURDATE,CURTIME,DATE_ADD,DATE_FORMAT,DATEDIFF,EXTRACT,NOW,UNIX_TIMESTAMP",
        }
        .to_string())
    }

    fn is_read_only(&mut self) -> Result<bool, ShellError> {
        let value = self.session.scalar(match self.session.kind {
            DriverKind::Sqlite => "PRAGMA query_only",
            DriverKind::Postgres => "SHOW transaction_read_only",
            DriverKind::MySql => "SELECT @@session.transaction_read_only",
        })?;
        Ok(matches!(value.as_str(), "1" | "on" | "true"))
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn default_transaction_isolation(&self) -> Isolation {
        default_isolation(self.session.kind)
    }

    fn supports_transaction_isolation_level(&self, level: Isolation) -> bool {
        match self.session.kind {
            DriverKind::Sqlite => {
                matches!(level, Isolation::ReadUncommitted | Isolation::Serializable)
            }
            DriverKind::Postgres | DriverKind::MySql => level != Isolation::None,
        }
    }

    fn tables(&mut self, pattern: Option<&str>) -> Result<Box<dyn Cursor>, ShellError> {
        let sql = match self.session.kind {
            DriverKind::Sqlite => {
                "SELECT NULL, name, upper(type) FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' AND name LIKE ? \
                 ORDER BY name"
            }
            DriverKind::Postgres => {
                "SELECT table_schema::text, table_name::text, table_type::text \
                 FROM information_schema.tables \
                 WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
                 AND table_name LIKE $1 ORDER BY table_schema, table_name"
            }
            DriverKind::MySql => {
                "SELECT table_schema, table_name, table_type FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name LIKE ? ORDER BY table_name"
            }
        };
        let binds = [pattern.unwrap_or("%").to_string()];
        self.session.cursor(TABLE_LABELS, sql, &binds)
    }

    fn columns(
        &mut self,
        table_pattern: Option<&str>,
        column_pattern: Option<&str>,
    ) -> Result<Box<dyn Cursor>, ShellError> {
        let sql = match self.session.kind {
            DriverKind::Sqlite => {
                "SELECT m.name, p.name, p.type, \
                 CASE p.\"notnull\" WHEN 0 THEN 'YES' ELSE 'NO' END, p.cid + 1 \
                 FROM sqlite_master m JOIN pragma_table_info(m.name) p \
                 WHERE m.type IN ('table', 'view') AND m.name NOT LIKE 'sqlite_%' \
                 AND m.name LIKE ? AND p.name LIKE ? ORDER BY m.name, p.cid"
            }
            DriverKind::Postgres => {
                "SELECT table_name::text, column_name::text, data_type::text, is_nullable::text, \
                 ordinal_position::int FROM information_schema.columns \
                 WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
                 AND table_name LIKE $1 AND column_name LIKE $2 \
                 ORDER BY table_schema, table_name, ordinal_position"
            }
            DriverKind::MySql => {
                "SELECT table_name, column_name, data_type, is_nullable, ordinal_position \
                 FROM information_schema.columns \
                 WHERE table_schema = DATABASE() AND table_name LIKE ? AND column_name LIKE ? \
                 ORDER BY table_name, ordinal_position"
            }
        };
        let binds = [
            table_pattern.unwrap_or("%").to_string(),
            column_pattern.unwrap_or("%").to_string(),
        ];
        self.session.cursor(COLUMN_LABELS, sql, &binds)
    }

    fn primary_keys(&mut self, table: &str) -> Result<Box<dyn Cursor>, ShellError> {
        let sql = match self.session.kind {
            DriverKind::Sqlite => {
                "SELECT m.name, p.name, p.pk FROM sqlite_master m \
                 JOIN pragma_table_info(m.name) p \
                 WHERE m.type = 'table' AND m.name = ? COLLATE NOCASE AND p.pk > 0 ORDER BY p.pk"
            }
            DriverKind::Postgres => {
                "SELECT kcu.table_name::text, kcu.column_name::text, kcu.ordinal_position::int \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                 ON tc.constraint_name = kcu.constraint_name \
                 AND tc.table_schema = kcu.table_schema AND tc.table_name = kcu.table_name \
                 WHERE tc.constraint_type = 'PRIMARY KEY' AND lower(tc.table_name) = lower($1) \
                 ORDER BY kcu.ordinal_position"
            }
            DriverKind::MySql => {
                "SELECT table_name, column_name, ordinal_position \
                 FROM information_schema.key_column_usage \
                 WHERE table_schema = DATABASE() AND constraint_name = 'PRIMARY' \
                 AND table_name = ? ORDER BY ordinal_position"
            }
        };
        self.session.cursor(KEY_LABELS, sql, &[table.to_string()])
    }

    fn schemas(&mut self) -> Result<Box<dyn Cursor>, ShellError> {
        let sql = match self.session.kind {
            DriverKind::Sqlite => "SELECT name FROM pragma_database_list ORDER BY seq",
            DriverKind::Postgres => {
                "SELECT schema_name::text FROM information_schema.schemata ORDER BY schema_name"
            }
            DriverKind::MySql => {
                "SELECT schema_name FROM information_schema.schemata ORDER BY schema_name"
            }
        };
        self.session.cursor(&["TABLE_SCHEM"], sql, &[])
    }
}

/// SQLite is dynamically typed, so the storage class decides.
fn format_sqlite_value(row: &SqliteRow, index: usize) -> Option<String> {
    match row.try_get_raw(index) {
        Ok(value) if value.is_null() => return None,
        Err(_) => return None,
        Ok(_) => {}
    }

    if let Ok(val) = row.try_get::<i64, _>(index) {
        return Some(val.to_string());
    }
    if let Ok(val) = row.try_get::<f64, _>(index) {
        return Some(val.to_string());
    }
    if let Ok(val) = row.try_get::<String, _>(index) {
        return Some(val);
    }
    if let Ok(val) = row.try_get::<Vec<u8>, _>(index) {
        return Some(format!("\\x{}", hex::encode(val)));
    }
    Some(format!("<{}>", row.column(index).type_info().name()))
}

fn format_postgres_value(row: &PgRow, index: usize) -> Option<String> {
    match row.try_get_raw(index) {
        Ok(value) if value.is_null() => return None,
        Err(_) => return None,
        Ok(_) => {}
    }

    let type_name = row.column(index).type_info().name().to_string();
    let formatted = match type_name.as_str() {
        "INT2" => row.try_get::<i16, _>(index).map(|v| v.to_string()),
        "INT4" => row.try_get::<i32, _>(index).map(|v| v.to_string()),
        "INT8" => row.try_get::<i64, _>(index).map(|v| v.to_string()),
        "OID" => row.try_get::<sqlx::postgres::types::Oid, _>(index).map(|v| v.0.to_string()),
        "FLOAT4" => row.try_get::<f32, _>(index).map(|v| v.to_string()),
        "FLOAT8" => row.try_get::<f64, _>(index).map(|v| v.to_string()),
        "NUMERIC" => row.try_get::<sqlx::types::Decimal, _>(index).map(|v| v.to_string()),
        "BOOL" => row.try_get::<bool, _>(index).map(|v| v.to_string()),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(|v| v.to_rfc3339()),
        "TIMESTAMP" => row.try_get::<chrono::NaiveDateTime, _>(index).map(|v| v.to_string()),
        "DATE" => row.try_get::<chrono::NaiveDate, _>(index).map(|v| v.to_string()),
        "TIME" => row.try_get::<chrono::NaiveTime, _>(index).map(|v| v.to_string()),
        "JSON" | "JSONB" => row.try_get::<serde_json::Value, _>(index).map(|v| v.to_string()),
        "UUID" => row.try_get::<sqlx::types::Uuid, _>(index).map(|v| v.to_string()),
        "BYTEA" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|v| format!("\\x{}", hex::encode(v))),
        _ => row.try_get::<String, _>(index),
    };
    Some(formatted.unwrap_or_else(|_| format!("<{type_name}>")))
}

fn format_mysql_value(row: &MySqlRow, index: usize) -> Option<String> {
    match row.try_get_raw(index) {
        Ok(value) if value.is_null() => return None,
        Err(_) => return None,
        Ok(_) => {}
    }

    if let Ok(val) = row.try_get::<i64, _>(index) {
        return Some(val.to_string());
    }
    if let Ok(val) = row.try_get::<u64, _>(index) {
        return Some(val.to_string());
    }
    if let Ok(val) = row.try_get::<f64, _>(index) {
        return Some(val.to_string());
    }
    if let Ok(val) = row.try_get::<sqlx::types::Decimal, _>(index) {
        return Some(val.to_string());
    }
    if let Ok(val) = row.try_get::<String, _>(index) {
        return Some(val);
    }
    if let Ok(val) = row.try_get::<chrono::NaiveDateTime, _>(index) {
        return Some(val.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    if let Ok(val) = row.try_get::<chrono::NaiveDate, _>(index) {
        return Some(val.format("%Y-%m-%d").to_string());
    }
    if let Ok(val) = row.try_get::<chrono::NaiveTime, _>(index) {
        return Some(val.format("%H:%M:%S").to_string());
    }
    if let Ok(val) = row.try_get::<serde_json::Value, _>(index) {
        return Some(val.to_string());
    }
    if let Ok(bytes) = row.try_get::<Vec<u8>, _>(index) {
        return Some(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => format!("\\x{}", hex::encode(err.into_bytes())),
        });
    }
    Some(format!("<{}>", row.column(index).type_info().name()))
}
