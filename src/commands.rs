//! The `!` command table and its handlers.
//!
//! Handlers are matched in declaration order against the text after `!`, so
//! an alias that is a prefix of another (`close` / `closeall`) must come
//! after it.

use std::fs;
use std::io::{self, IsTerminal};
use std::path::Path;
use std::time::Instant;

use tracing::debug;

use crate::backend::{Isolation, Metadata};
use crate::color::pad;
use crate::config::Config;
use crate::dispatch::Shell;
use crate::error::ShellError;
use crate::introspect::DBINFO_METHODS;
use crate::reflector::{self, InvokeError, Value};
use crate::rows::RowSet;
use crate::script::Script;

pub type Action = fn(&mut Shell, &str) -> Result<(), ShellError>;

pub struct CommandHandler {
    /// The first name is the canonical one.
    pub names: &'static [&'static str],
    pub help: &'static str,
    pub action: Action,
}

impl CommandHandler {
    pub fn name(&self) -> &'static str {
        self.names.first().copied().unwrap_or_default()
    }

    pub fn matches(&self, rest: &str) -> bool {
        self.names.iter().any(|name| rest.starts_with(name))
    }
}

pub static COMMANDS: &[CommandHandler] = &[
    CommandHandler {
        names: &["quit", "done", "exit"],
        help: "Exits the program",
        action: quit,
    },
    CommandHandler {
        names: &["connect", "open"],
        help: "Open a new connection to the database. Usage: connect <url> [user] [password] [driver]",
        action: connect,
    },
    CommandHandler {
        names: &["describe", "desc"],
        help: "Describe a table, or list every table when none is given",
        action: describe,
    },
    CommandHandler {
        names: &["reconnect"],
        help: "Reconnect to the current database",
        action: reconnect,
    },
    CommandHandler {
        names: &["metadata", "meta"],
        help: "Call a metadata method by name, for example \"metadata getTables\" or \"metadata getColumns users\"",
        action: metadata,
    },
    CommandHandler {
        names: &["dbinfo"],
        help: "Show information about the current database",
        action: dbinfo,
    },
    CommandHandler {
        names: &["tables"],
        help: "List all the tables in the database",
        action: tables,
    },
    CommandHandler {
        names: &["columns"],
        help: "List the columns of a table",
        action: columns,
    },
    CommandHandler {
        names: &["primarykeys"],
        help: "List the primary key columns of a table",
        action: primary_keys,
    },
    CommandHandler {
        names: &["rehash"],
        help: "Fetch table and column names for command completion",
        action: rehash,
    },
    CommandHandler {
        names: &["verbose"],
        help: "Set verbose mode on",
        action: verbose,
    },
    CommandHandler {
        names: &["run"],
        help: "Run every line of a script file as if it were typed",
        action: run,
    },
    CommandHandler {
        names: &["list"],
        help: "List the current connections",
        action: list,
    },
    CommandHandler {
        names: &["all"],
        help: "Execute the specified SQL against every connection",
        action: all,
    },
    CommandHandler {
        names: &["go", "#"],
        help: "Select the current connection by index",
        action: go,
    },
    CommandHandler {
        names: &["script"],
        help: "Start saving entered lines to a script file, or stop when one is open",
        action: script,
    },
    CommandHandler {
        names: &["brief"],
        help: "Set verbose mode off",
        action: brief,
    },
    CommandHandler {
        names: &["closeall"],
        help: "Close every connection",
        action: close_all,
    },
    CommandHandler {
        names: &["close"],
        help: "Close the current connection to the database",
        action: close,
    },
    CommandHandler {
        names: &["isolation"],
        help: "Set the transaction isolation level for this connection",
        action: isolation,
    },
    CommandHandler {
        names: &["autocommit"],
        help: "Turn autocommit on or off. Usage: autocommit <on/off>",
        action: autocommit,
    },
    CommandHandler {
        names: &["driverinfo"],
        help: "List the database drivers built into the shell",
        action: driver_info,
    },
    CommandHandler {
        names: &["commit"],
        help: "Commit the current transaction (if autocommit is off)",
        action: commit,
    },
    CommandHandler {
        names: &["rollback"],
        help: "Roll back the current transaction (if autocommit is off)",
        action: rollback,
    },
    CommandHandler {
        names: &["help", "?"],
        help: "Print a summary of command usage",
        action: help,
    },
    CommandHandler {
        names: &["set"],
        help: "Set a preference, or list every preference when no key is given",
        action: set,
    },
    CommandHandler {
        names: &["save"],
        help: "Save the current preferences",
        action: save,
    },
    CommandHandler {
        names: &["sql"],
        help: "Execute a SQL command",
        action: sql,
    },
];

const HELP_INDENT: usize = 20;
const HELP_WIDTH: usize = 60;
const DBINFO_PAD: usize = 50;

fn words(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

/// Text after the leading `!` and whichever of `names` it starts with.
fn argument<'a>(line: &'a str, names: &[&str]) -> &'a str {
    let rest = line.strip_prefix('!').unwrap_or(line);
    names
        .iter()
        .find_map(|name| rest.strip_prefix(name))
        .unwrap_or(rest)
        .trim()
}

fn rows_word(count: usize) -> &'static str {
    if count == 1 { "row" } else { "rows" }
}

fn quit(shell: &mut Shell, _line: &str) -> Result<(), ShellError> {
    shell.exit = true;
    shell.close_current()
}

fn connect(shell: &mut Shell, line: &str) -> Result<(), ShellError> {
    let parts = words(line);
    let Some(url) = parts.get(1).copied() else {
        return Err(ShellError::usage("connect <url> [user] [password] [driver]"));
    };
    let user = parts.get(2).copied().unwrap_or("");
    let mut password = parts.get(3).copied().unwrap_or("").to_string();
    let driver = parts.get(4).copied();

    if !user.is_empty() && parts.len() < 4 && io::stdin().is_terminal() {
        password = rpassword::prompt_password(format!("Enter password for {user}: "))?;
    }
    shell.connect_with(url, user, &password, driver)
}

fn describe(shell: &mut Shell, line: &str) -> Result<(), ShellError> {
    let target = words(line).get(1).map(|t| t.to_string());
    let mut cursor = {
        let metadata = shell.live_metadata()?;
        match target.as_deref() {
            None => metadata.tables(None)?,
            Some(t) if t.eq_ignore_ascii_case("tables") => metadata.tables(None)?,
            Some(table) => metadata.columns(Some(table), None)?,
        }
    };
    let rows = RowSet::read(cursor.as_mut())?;
    if rows.count() == 0 {
        let what = target.as_deref().unwrap_or("tables");
        return Err(ShellError::UserInput(format!("No entries found for {what}")));
    }
    shell.print_rows(rows);
    Ok(())
}

fn reconnect(shell: &mut Shell, _line: &str) -> Result<(), ShellError> {
    let url = shell.current_session()?.url.clone();
    shell.console.line(&format!("Reconnecting to {url}"));
    let Some(session) = shell.connections.current_mut() else {
        return Err(ShellError::no_connection());
    };
    session.reconnect(&shell.drivers, &shell.opts, &mut shell.console)?;
    shell.show_warnings();
    Ok(())
}

fn metadata(shell: &mut Shell, line: &str) -> Result<(), ShellError> {
    let parts = words(line);
    let Some(method) = parts.get(1).copied() else {
        return Err(ShellError::usage("metadata <method> [args...]"));
    };
    let args: Vec<Option<String>> = parts[2..].iter().map(|a| Some(a.to_string())).collect();
    call_metadata(shell, method, &args)
}

/// Invokes a metadata method and prints what it returns. An unknown method
/// lists what could have been meant.
fn call_metadata(shell: &mut Shell, method: &str, args: &[Option<String>]) -> Result<(), ShellError> {
    let metadata = shell.live_metadata()?;
    let value = match reflector::invoke(metadata, method, args) {
        Ok(value) => value,
        Err(ShellError::Reflection(InvokeError::NoMatchingMethod { name, candidates })) => {
            let options = if candidates.is_empty() {
                reflector::signatures::<dyn Metadata>()
            } else {
                candidates
            };
            shell.report_error(&ShellError::UserInput(format!(
                "No method matching \"{name}\" was found"
            )));
            shell.console.line("Possible methods:");
            for signature in options {
                shell.console.line(&format!("   {signature}"));
            }
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    match value {
        Value::Cursor(mut cursor) => {
            shell.print_cursor(cursor.as_mut())?;
        }
        Value::Unit | Value::Null => {}
        other => shell.console.line(&other.to_string()),
    }
    shell.show_warnings();
    Ok(())
}

fn dbinfo(shell: &mut Shell, _line: &str) -> Result<(), ShellError> {
    let metadata = shell.live_metadata()?;
    let answers: Vec<(&str, Result<Value, ShellError>)> = DBINFO_METHODS
        .iter()
        .map(|method| (*method, reflector::invoke(&mut *metadata, method, &[])))
        .collect();

    for (method, answer) in answers {
        match answer {
            Ok(value) => {
                let line = shell
                    .console
                    .buffer()
                    .bold(&pad(method, DBINFO_PAD))
                    .append(&value.to_string());
                shell.console.output(&line);
            }
            Err(e) => shell.report_error(&e),
        }
    }
    shell.show_warnings();
    Ok(())
}

fn tables(shell: &mut Shell, _line: &str) -> Result<(), ShellError> {
    call_metadata(shell, "getTables", &[])
}

fn columns(shell: &mut Shell, line: &str) -> Result<(), ShellError> {
    let Some(table) = words(line).get(1).map(|t| t.to_string()) else {
        return Err(ShellError::usage("columns <table name>"));
    };
    call_metadata(shell, "getColumns", &[Some(table)])
}

fn primary_keys(shell: &mut Shell, line: &str) -> Result<(), ShellError> {
    let Some(table) = words(line).get(1).map(|t| t.to_string()) else {
        return Err(ShellError::usage("primarykeys <table name>"));
    };
    call_metadata(shell, "getPrimaryKeys", &[Some(table)])
}

fn rehash(shell: &mut Shell, _line: &str) -> Result<(), ShellError> {
    shell.live_connection()?;
    shell.current_session()?.rebuild_completions(false);
    Ok(())
}

fn verbose(shell: &mut Shell, _line: &str) -> Result<(), ShellError> {
    shell.opts.set("verbose", "true")?;
    shell.console.line("verbose: on");
    Ok(())
}

fn brief(shell: &mut Shell, _line: &str) -> Result<(), ShellError> {
    shell.opts.set("verbose", "false")?;
    shell.console.line("verbose: off");
    Ok(())
}

fn run(shell: &mut Shell, line: &str) -> Result<(), ShellError> {
    let parts = words(line);
    if parts.len() != 2 {
        return Err(ShellError::usage("run <scriptfile>"));
    }
    let content = fs::read_to_string(parts[1])?;
    let path = fs::canonicalize(parts[1])?;
    if shell.running.contains(&path) {
        return Err(ShellError::UserInput(format!(
            "Script {} is already running",
            path.display()
        )));
    }

    debug!("[commands::run] Replaying {}", path.display());
    shell.running.push(path);
    for script_line in content.lines() {
        if !shell.dispatch(Some(script_line)) {
            break;
        }
    }
    shell.running.pop();
    Ok(())
}

fn list(shell: &mut Shell, _line: &str) -> Result<(), ShellError> {
    let total = shell.connections.len();
    let noun = if total == 1 { "connection" } else { "connections" };
    let mut lines = vec![format!("{total} active {noun}:")];
    for (index, session) in shell.connections.iter().enumerate() {
        let state = if session.is_open() { "open" } else { "closed" };
        lines.push(format!(
            "{}{}{}",
            pad(&format!(" #{index}"), 5),
            pad(state, 9),
            session.url
        ));
    }
    for line in lines {
        shell.console.line(&line);
    }
    Ok(())
}

fn all(shell: &mut Shell, line: &str) -> Result<(), ShellError> {
    let sql_text = argument(line, &["all"]);
    if sql_text.is_empty() {
        return Err(ShellError::usage("all <sql>"));
    }
    let saved = shell.connections.index();
    for index in 0..shell.connections.len() {
        shell.connections.set_index(index);
        let url = shell
            .connections
            .current()
            .map(|s| s.url.clone())
            .unwrap_or_default();
        shell.console.line(&format!("Executing SQL against: {url}"));
        if let Err(e) = sql(shell, sql_text) {
            shell.report_error(&e);
        }
    }
    if let Some(index) = saved {
        shell.connections.set_index(index);
    }
    Ok(())
}

fn go(shell: &mut Shell, line: &str) -> Result<(), ShellError> {
    let target = argument(line, &["go", "#"]);
    let usage = || ShellError::usage("go <connection index>");
    if target.is_empty() {
        return Err(usage());
    }
    let index: i64 = target.parse().map_err(|_| usage())?;
    let switched = usize::try_from(index).is_ok_and(|i| shell.connections.set_index(i));
    if !switched {
        shell.report_error(&ShellError::UserInput(format!("Invalid connection: {index}")));
        list(shell, line)?;
    }
    Ok(())
}

fn script(shell: &mut Shell, line: &str) -> Result<(), ShellError> {
    if let Some(open) = shell.script.take() {
        let path = open.close()?;
        shell.console.line(&format!(
            "Script closed. Enter \"run {}\" to replay it.",
            path.display()
        ));
        return Ok(());
    }

    let parts = words(line);
    if parts.len() != 2 {
        return Err(ShellError::usage("script <filename>"));
    }
    let started = Script::start(Path::new(parts[1]))?;
    shell.console.line(&format!(
        "Saving command script to \"{}\". Enter \"script\" to end.",
        started.path().display()
    ));
    shell.script = Some(started);
    Ok(())
}

fn close_all(shell: &mut Shell, _line: &str) -> Result<(), ShellError> {
    shell.close_all();
    Ok(())
}

fn close(shell: &mut Shell, _line: &str) -> Result<(), ShellError> {
    shell.close_current()
}

fn isolation(shell: &mut Shell, line: &str) -> Result<(), ShellError> {
    let Some(level) = words(line)
        .get(1)
        .and_then(|name| name.parse::<Isolation>().ok())
    else {
        return Err(ShellError::usage(&Isolation::usage()));
    };
    shell.live_connection()?.set_isolation(level)?;
    shell.show_warnings();
    shell.console.line(&format!("Transaction isolation set to: {level}"));
    Ok(())
}

fn autocommit(shell: &mut Shell, line: &str) -> Result<(), ShellError> {
    let enabled = match words(line).get(1).map(|w| w.to_ascii_lowercase()).as_deref() {
        Some("on") => true,
        Some("off") => false,
        _ => return Err(ShellError::usage("autocommit <on/off>")),
    };
    shell.live_connection()?.set_auto_commit(enabled)?;
    shell.show_warnings();
    let state = if enabled { "on" } else { "off" };
    shell.console.line(&format!("Autocommit is {state}"));
    Ok(())
}

fn driver_info(shell: &mut Shell, _line: &str) -> Result<(), ShellError> {
    let lines: Vec<String> = shell
        .drivers
        .iter()
        .map(|d| format!("{}{} (version {})", pad(d.id(), 12), d.name(), d.version()))
        .collect();
    let noun = if lines.len() == 1 { "driver" } else { "drivers" };
    shell.console.line(&format!("{} {noun} available:", lines.len()));
    for line in lines {
        shell.console.line(&line);
    }
    Ok(())
}

fn end_transaction(shell: &mut Shell, commit: bool) -> Result<(), ShellError> {
    let connection = shell.live_connection()?;
    if connection.auto_commit() {
        return Err(ShellError::UserInput(
            "Operation requires that autocommit be turned off.".to_string(),
        ));
    }
    if commit {
        connection.commit()?;
    } else {
        connection.rollback()?;
    }
    shell.show_warnings();
    shell.console.line(if commit { "Commit complete" } else { "Rollback complete" });
    Ok(())
}

fn commit(shell: &mut Shell, _line: &str) -> Result<(), ShellError> {
    end_transaction(shell, true)
}

fn rollback(shell: &mut Shell, _line: &str) -> Result<(), ShellError> {
    end_transaction(shell, false)
}

/// Wraps `text` at `width`, indenting continuation lines by `indent`.
fn wrap(text: &str, width: usize, indent: usize) -> String {
    let separator = format!("\n{}", " ".repeat(indent));
    textwrap::wrap(text, width).join(&separator)
}

fn help(shell: &mut Shell, line: &str) -> Result<(), ShellError> {
    let filter = words(line).get(1).map(|w| w.trim_start_matches('!').to_string());
    let selected: Vec<&CommandHandler> = COMMANDS
        .iter()
        .filter(|c| filter.as_deref().is_none_or(|f| c.names.contains(&f)))
        .collect();
    if selected.is_empty() {
        let name = filter.unwrap_or_default();
        return Err(ShellError::UserInput(format!("Unknown command: {name}")));
    }
    for command in selected {
        let text = format!(
            "{}{}",
            pad(&format!("!{}", command.name()), HELP_INDENT),
            wrap(command.help, HELP_WIDTH, HELP_INDENT)
        );
        shell.console.line(&text);
    }
    Ok(())
}

fn set(shell: &mut Shell, line: &str) -> Result<(), ShellError> {
    let parts = words(line);
    match parts.len() {
        1 => {
            for (key, value) in shell.opts.to_properties()? {
                let line = shell.console.buffer().green(&pad(&key, 20)).append(&value);
                shell.console.output(&line);
            }
            Ok(())
        }
        2 => Err(ShellError::usage("set <key> <value>")),
        _ => shell.opts.set(parts[1], &parts[2..].join(" ")),
    }
}

fn save(shell: &mut Shell, _line: &str) -> Result<(), ShellError> {
    let Some(path) = shell.config_path.clone() else {
        return Err(ShellError::Config("No configuration directory available".to_string()));
    };
    let config = Config {
        opts: shell.opts.clone(),
        logging: shell.logging.clone(),
    };
    config.save_to(&path)?;
    shell.console.line(&format!("Saved preferences to {}", path.display()));
    Ok(())
}

/// Raw query path: everything that is not a `!` command ends up here.
pub fn sql(shell: &mut Shell, line: &str) -> Result<(), ShellError> {
    let text = line.strip_prefix("!sql").unwrap_or(line).trim();
    let text = text.trim_end_matches(';').trim_end();
    if text.is_empty() {
        return Ok(());
    }

    let started = Instant::now();
    let connection = shell.live_connection()?;
    let result = connection.execute(text);
    let warnings = connection.warnings();
    shell.report_warnings(warnings);
    let execution = result?;

    if let Some(count) = execution.update_count {
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        let message = format!("{count} {} affected", rows_word(count));
        timed(shell, message, started);
    }
    if let Some(mut cursor) = execution.cursor {
        let count = shell.print_cursor(cursor.as_mut())?;
        let message = format!("{count} {} selected", rows_word(count));
        timed(shell, message, started);
    }
    Ok(())
}

fn timed(shell: &mut Shell, message: String, started: Instant) {
    let line = if shell.opts.show_time {
        format!("{message} ({:.3} seconds)", started.elapsed().as_secs_f64())
    } else {
        message
    };
    shell.console.line(&line);
}
