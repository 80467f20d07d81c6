//! The shell: owns every connection and routes each input line.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use tracing::debug;

use crate::backend::{Connection, Cursor, DriverRegistry, Metadata, Warning};
use crate::commands::{self, COMMANDS};
use crate::config::{LoggingConfig, Opts};
use crate::connections::Connections;
use crate::console::Console;
use crate::error::ShellError;
use crate::format;
use crate::prompt;
use crate::rows::RowSet;
use crate::script::Script;
use crate::session::SessionConnection;

/// A warning already reported, kept alive so its address cannot be reused.
struct SeenWarning {
    _warning: Arc<Warning>,
    first_seen: DateTime<Local>,
}

pub struct Shell {
    pub opts: Opts,
    pub connections: Connections<SessionConnection>,
    pub drivers: DriverRegistry,
    pub console: Console,
    pub(crate) exit: bool,
    pub(crate) script: Option<Script>,
    /// Logging section written back by `!save`.
    pub(crate) logging: LoggingConfig,
    pub(crate) config_path: Option<PathBuf>,
    /// Scripts being replayed by `!run`, outermost first.
    pub(crate) running: Vec<PathBuf>,
    seen_warnings: HashMap<usize, SeenWarning>,
    completions: Arc<Mutex<Vec<String>>>,
}

impl Shell {
    pub fn new(opts: Opts, drivers: DriverRegistry, console: Console) -> Self {
        Self {
            opts,
            connections: Connections::new(),
            drivers,
            console,
            exit: false,
            script: None,
            logging: LoggingConfig::default(),
            config_path: None,
            running: Vec::new(),
            seen_warnings: HashMap::new(),
            completions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Where `!save` writes, along with the logging settings to preserve.
    pub fn with_config(mut self, path: Option<PathBuf>, logging: LoggingConfig) -> Self {
        self.config_path = path;
        self.logging = logging;
        self
    }

    /// Shared cell the line editor's completer reads from.
    pub fn completion_cell(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.completions)
    }

    /// Every alias of every command, in declaration order.
    pub fn command_names() -> Vec<String> {
        COMMANDS
            .iter()
            .flat_map(|c| c.names.iter().map(|n| n.to_string()))
            .collect()
    }

    pub fn prompt(&self) -> String {
        match (self.connections.index(), self.connections.current()) {
            (Some(index), Some(session)) => prompt::connection_prompt(index, &session.url),
            _ => prompt::DEFAULT_PROMPT.to_string(),
        }
    }

    /// Handles one line of input. Returns false when the shell should stop,
    /// after closing every connection.
    pub fn dispatch(&mut self, line: Option<&str>) -> bool {
        let Some(line) = line else {
            self.close_all();
            return false;
        };
        let line = line.trim();
        if line.is_empty() {
            return true;
        }

        if let Some(script) = self.script.as_mut() {
            if let Err(e) = script.record(line) {
                self.report_error(&e);
            }
        }

        let line = if line == "?" || line.eq_ignore_ascii_case("help") {
            "!help"
        } else {
            line
        };

        let result = match line.strip_prefix('!') {
            Some(rest) => match COMMANDS.iter().find(|c| c.matches(rest)) {
                Some(command) => {
                    debug!("[Shell::dispatch] !{} <- {}", command.name(), line);
                    (command.action)(self, line)
                }
                None => Err(ShellError::UserInput(format!("Unknown command: {rest}"))),
            },
            None => commands::sql(self, line),
        };
        if let Err(e) = result {
            self.report_error(&e);
        }

        self.console.color = self.opts.color;
        self.refresh_completions();
        self.console.flush();

        if self.exit {
            self.close_all();
            return false;
        }
        true
    }

    pub fn report_error(&mut self, err: &ShellError) {
        debug!("[Shell::report_error] {:?}", err);
        self.console.error(err);
    }

    /// Walks a warning chain, remembering each warning the first time it is
    /// seen and printing it then when `showWarnings` is on.
    pub fn report_warnings(&mut self, head: Option<Arc<Warning>>) {
        if !self.opts.verbose {
            return;
        }
        let mut current = head;
        while let Some(warning) = current {
            let key = Arc::as_ptr(&warning) as usize;
            if !self.seen_warnings.contains_key(&key) {
                let first_seen = Local::now();
                debug!(
                    "[Shell::report_warnings] New warning at {}: {}",
                    first_seen.format("%H:%M:%S"),
                    warning.message
                );
                if self.opts.show_warnings {
                    let text = format!(
                        "Warning: {} (state={},code={})",
                        warning.message, warning.state, warning.code
                    );
                    let buffer = self.console.buffer().red(&text);
                    self.console.output(&buffer);
                }
                self.seen_warnings.insert(
                    key,
                    SeenWarning {
                        _warning: Arc::clone(&warning),
                        first_seen,
                    },
                );
            }
            let next = warning.next.clone();
            if next.as_ref().is_some_and(|n| Arc::ptr_eq(n, &warning)) {
                break;
            }
            current = next;
        }
    }

    /// Number of distinct warnings reported so far and when the oldest was seen.
    pub fn warning_history(&self) -> (usize, Option<DateTime<Local>>) {
        let oldest = self.seen_warnings.values().map(|w| w.first_seen).min();
        (self.seen_warnings.len(), oldest)
    }

    /// Reports whatever the current connection has queued.
    pub fn show_warnings(&mut self) {
        let head = match self.connections.current_mut().map(|s| s.parts()) {
            Some(Ok((connection, _))) => connection.warnings(),
            _ => None,
        };
        self.report_warnings(head);
    }

    /// The current session's connection, connecting it first if needed.
    pub fn live_connection(&mut self) -> Result<&mut dyn Connection, ShellError> {
        let session = self
            .connections
            .current_mut()
            .ok_or_else(ShellError::no_connection)?;
        let connection = session.connection(&self.drivers, &self.opts, &mut self.console)?;
        if connection.is_closed() {
            return Err(ShellError::ConnectionState("Connection is closed".to_string()));
        }
        Ok(connection)
    }

    /// Metadata of the current session, connecting it first if needed.
    pub fn live_metadata(&mut self) -> Result<&mut dyn Metadata, ShellError> {
        self.live_connection()?;
        self.current_session()?.metadata()
    }

    pub fn current_session(&mut self) -> Result<&mut SessionConnection, ShellError> {
        self.connections
            .current_mut()
            .ok_or_else(ShellError::no_connection)
    }

    /// Reads and renders a cursor, returning the row count.
    pub fn print_cursor(&mut self, cursor: &mut dyn Cursor) -> Result<usize, ShellError> {
        let rows = RowSet::read(cursor)?;
        Ok(self.print_rows(rows))
    }

    pub fn print_rows(&mut self, mut rows: RowSet) -> usize {
        let metadata = self
            .connections
            .current_mut()
            .and_then(|s| s.metadata().ok());
        format::render(&mut rows, &self.opts, metadata, &mut self.console)
    }

    /// Registers a new session as current and connects it. A failed connect
    /// leaves it registered, unconnected, for a later lazy retry.
    pub fn connect_with(
        &mut self,
        url: &str,
        username: &str,
        password: &str,
        driver: Option<&str>,
    ) -> Result<(), ShellError> {
        let session = SessionConnection::new(url, username, password, driver);
        self.connections.set_current(session);
        let Some(session) = self.connections.current_mut() else {
            return Err(ShellError::no_connection());
        };
        let result = session.connect(&self.drivers, &self.opts, &mut self.console);
        self.show_warnings();
        result
    }

    /// Closes the current session and removes it from the registry.
    pub fn close_current(&mut self) -> Result<(), ShellError> {
        let Some(session) = self.connections.current_mut() else {
            return Ok(());
        };
        let result = session.close(&mut self.console);
        self.connections.remove_current();
        result
    }

    /// Closes everything, reporting failures as they happen.
    pub fn close_all(&mut self) {
        while !self.connections.is_empty() {
            self.connections.set_index(0);
            if let Err(e) = self.close_current() {
                self.report_error(&e);
            }
        }
    }

    /// Publishes the current session's candidates to the completer.
    pub fn refresh_completions(&mut self) {
        let candidates = self
            .connections
            .current()
            .map(|s| s.completions().to_vec())
            .unwrap_or_default();
        match self.completions.lock() {
            Ok(mut cell) => *cell = candidates,
            Err(_) => debug!("[Shell::refresh_completions] Candidate cell poisoned"),
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::backend::mock::{MockDriver, SharedState, shared};
    use crate::console::capture::{self, Captured};

    pub struct Harness {
        pub shell: Shell,
        pub state: SharedState,
        pub out: Captured,
    }

    impl Harness {
        pub fn text(&self) -> String {
            self.out.text()
        }

        /// Dispatches and clears previous output first.
        pub fn run(&mut self, line: &str) -> bool {
            self.out.clear();
            self.shell.dispatch(Some(line))
        }
    }

    /// A shell with only the mock driver, no color and a wide terminal.
    pub fn harness() -> Harness {
        let state = shared();
        state.borrow_mut().tables = vec![
            ("users".to_string(), vec!["id".to_string(), "name".to_string()]),
            ("orders".to_string(), vec!["id".to_string()]),
        ];
        let mut drivers = DriverRegistry::new();
        drivers.register(Box::new(MockDriver::new(state.clone())));
        let (console, out) = capture::console(false);
        let opts = Opts {
            color: false,
            max_width: 100,
            ..Opts::default()
        };
        Harness {
            shell: Shell::new(opts, drivers, console),
            state,
            out,
        }
    }
}
