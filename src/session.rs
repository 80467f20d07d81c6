//! One configured backend connection and its lifecycle.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::backend::{Connection, Cursor, Driver, DriverRegistry, Isolation, Metadata, column_values};
use crate::completion::SQL_KEYWORDS;
use crate::config::Opts;
use crate::console::Console;
use crate::error::ShellError;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub enum SessionState {
    Unconnected,
    Connected {
        connection: Box<dyn Connection>,
        metadata: Box<dyn Metadata>,
    },
    Closed,
}

pub struct SessionConnection {
    id: u64,
    pub url: String,
    pub username: String,
    pub password: String,
    /// Explicit driver id; inferred from the URL scheme when `None`.
    pub driver: Option<String>,
    state: SessionState,
    completions: Vec<String>,
}

impl PartialEq for SessionConnection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl SessionConnection {
    pub fn new(url: &str, username: &str, password: &str, driver: Option<&str>) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            url: url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            driver: driver.filter(|d| !d.is_empty()).map(str::to_string),
            state: SessionState::Unconnected,
            completions: Vec::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected { .. })
    }

    /// Open means connected and not closed underneath us.
    pub fn is_open(&self) -> bool {
        match &self.state {
            SessionState::Connected { connection, .. } => !connection.is_closed(),
            _ => false,
        }
    }

    pub fn completions(&self) -> &[String] {
        &self.completions
    }

    pub fn connect(
        &mut self,
        drivers: &DriverRegistry,
        opts: &Opts,
        console: &mut Console,
    ) -> Result<(), ShellError> {
        let driver = drivers.resolve(self.driver.as_deref(), &self.url)?;

        if self.is_connected() {
            if let Err(e) = self.close(console) {
                console.error(&e);
            }
        }

        debug!("[SessionConnection::connect] Connecting to {} with {}", self.url, driver.id());
        let (connection, metadata) = match self.open(driver, opts, console) {
            Ok(parts) => parts,
            Err(e) => {
                self.state = SessionState::Unconnected;
                return Err(e);
            }
        };

        self.state = SessionState::Connected {
            connection,
            metadata,
        };
        self.rebuild_completions(opts.fast_connect);
        Ok(())
    }

    fn open(
        &self,
        driver: &dyn Driver,
        opts: &Opts,
        console: &mut Console,
    ) -> Result<(Box<dyn Connection>, Box<dyn Metadata>), ShellError> {
        let mut connection = driver.connect(&self.url, &self.username, &self.password)?;
        let mut metadata = connection.metadata()?;

        // Rejected settings leave the connection usable
        if let Err(e) = connection.set_auto_commit(opts.auto_commit) {
            console.error(&e);
        }
        if let Err(e) = connection.set_isolation(opts.isolation) {
            console.error(&e);
        }

        let product = metadata.database_product_name()?;
        let version = metadata.database_product_version()?;
        console.line(&format!("Connected to: {product} (version {version})"));
        console.line(&format!(
            "Driver: {} (version {})",
            metadata.driver_name(),
            metadata.driver_version()
        ));
        console.line(&format!("Autocommit: {}", connection.auto_commit()));
        Ok((connection, metadata))
    }

    /// Lazily connects, once, on first use.
    pub fn connection(
        &mut self,
        drivers: &DriverRegistry,
        opts: &Opts,
        console: &mut Console,
    ) -> Result<&mut dyn Connection, ShellError> {
        if matches!(self.state, SessionState::Unconnected) {
            self.connect(drivers, opts, console)?;
        }
        Ok(self.parts()?.0)
    }

    /// Live connection and metadata, without connecting.
    pub fn parts(&mut self) -> Result<(&mut dyn Connection, &mut dyn Metadata), ShellError> {
        match &mut self.state {
            SessionState::Connected {
                connection,
                metadata,
            } => Ok((connection.as_mut(), metadata.as_mut())),
            SessionState::Unconnected => Err(ShellError::no_connection()),
            SessionState::Closed => Err(ShellError::ConnectionState(
                "Connection is closed".to_string(),
            )),
        }
    }

    pub fn metadata(&mut self) -> Result<&mut dyn Metadata, ShellError> {
        Ok(self.parts()?.1)
    }

    pub fn auto_commit(&self) -> Option<bool> {
        match &self.state {
            SessionState::Connected { connection, .. } => Some(connection.auto_commit()),
            _ => None,
        }
    }

    pub fn isolation(&self) -> Option<Isolation> {
        match &self.state {
            SessionState::Connected { connection, .. } => Some(connection.isolation()),
            _ => None,
        }
    }

    /// Ends up `Closed` whether or not the backend close succeeds.
    pub fn close(&mut self, console: &mut Console) -> Result<(), ShellError> {
        let previous = std::mem::replace(&mut self.state, SessionState::Closed);
        self.completions.clear();
        match previous {
            SessionState::Connected { mut connection, .. } => {
                console.line(&format!("Closing: {}", self.url));
                if connection.is_closed() {
                    return Ok(());
                }
                connection.close()
            }
            SessionState::Unconnected | SessionState::Closed => Ok(()),
        }
    }

    pub fn reconnect(
        &mut self,
        drivers: &DriverRegistry,
        opts: &Opts,
        console: &mut Console,
    ) -> Result<(), ShellError> {
        if let Err(e) = self.close(console) {
            console.error(&e);
        }
        self.state = SessionState::Unconnected;
        self.connect(drivers, opts, console)
    }

    /// Keywords in both cases, then table and column names unless
    /// `skip_meta`. Lookup failures only shrink the candidate set.
    pub fn rebuild_completions(&mut self, skip_meta: bool) {
        let Ok(metadata) = self.metadata() else {
            return;
        };

        let mut keywords: Vec<String> = SQL_KEYWORDS.split(',').map(str::to_string).collect();
        match metadata.sql_keywords() {
            Ok(extra) => keywords.extend(
                extra
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string),
            ),
            Err(e) => debug!("[SessionConnection::rebuild_completions] No keywords: {}", e),
        }

        let mut candidates = Vec::new();
        for keyword in keywords {
            candidates.push(keyword.to_lowercase());
            candidates.push(keyword.to_uppercase());
        }

        if !skip_meta {
            match metadata.tables(None) {
                Ok(mut tables) => {
                    if let Ok(names) = column_values(tables.as_mut(), "TABLE_NAME") {
                        candidates.extend(names);
                    }
                }
                Err(e) => debug!("[SessionConnection::rebuild_completions] No tables: {}", e),
            }
            match metadata.columns(None, None) {
                Ok(mut columns) => {
                    for (table, column) in table_columns(columns.as_mut()) {
                        candidates.push(format!("{table}.{column}"));
                        candidates.push(column);
                    }
                }
                Err(e) => debug!("[SessionConnection::rebuild_completions] No columns: {}", e),
            }
        }

        candidates.sort();
        candidates.dedup();
        debug!(
            "[SessionConnection::rebuild_completions] {} candidates for {}",
            candidates.len(),
            self.url
        );
        self.completions = candidates;
    }
}

/// `(TABLE_NAME, COLUMN_NAME)` pairs; stops quietly at the first read error.
fn table_columns(cursor: &mut dyn Cursor) -> Vec<(String, String)> {
    let position = |label: &str| {
        cursor
            .columns()
            .iter()
            .position(|c| c.label.eq_ignore_ascii_case(label))
    };
    let (Some(table), Some(column)) = (position("TABLE_NAME"), position("COLUMN_NAME")) else {
        return Vec::new();
    };

    let mut pairs = Vec::new();
    while let Ok(Some(row)) = cursor.next_row() {
        if let (Some(Some(t)), Some(Some(c))) = (row.get(table), row.get(column)) {
            pairs.push((t.clone(), c.clone()));
        }
    }
    pairs
}
