use thiserror::Error;

use crate::reflector::InvokeError;

/// Every failure a command handler can surface. None of them end the session;
/// the dispatcher reports them and reads the next line.
#[derive(Error, Debug)]
pub enum ShellError {
    /// Malformed command arguments.
    #[error("{0}")]
    UserInput(String),

    /// Anything reported by the database, including warnings promoted to errors.
    #[error("{message} (state={state},code={code})")]
    Backend {
        message: String,
        state: String,
        code: i32,
    },

    /// No current connection, or the current one is closed.
    #[error("{0}")]
    ConnectionState(String),

    #[error(transparent)]
    Reflection(#[from] InvokeError),

    #[error("Statement cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Config(String),
}

impl ShellError {
    pub fn usage(text: &str) -> Self {
        ShellError::UserInput(format!("Usage: {text}"))
    }

    pub fn backend(message: impl Into<String>) -> Self {
        ShellError::Backend {
            message: message.into(),
            state: String::new(),
            code: 0,
        }
    }

    pub fn no_connection() -> Self {
        ShellError::ConnectionState("No current connection".to_string())
    }
}

impl From<sqlx::Error> for ShellError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let state = db_err.code().map(|c| c.to_string()).unwrap_or_default();
                // MySQL and SQLite report numeric codes in the state slot
                let code = state.parse::<i32>().unwrap_or(0);
                ShellError::Backend {
                    message: db_err.message().to_string(),
                    state,
                    code,
                }
            }
            other => ShellError::backend(other.to_string()),
        }
    }
}

impl From<toml::de::Error> for ShellError {
    fn from(err: toml::de::Error) -> Self {
        ShellError::Config(format!("Invalid configuration file: {err}"))
    }
}

impl From<toml::ser::Error> for ShellError {
    fn from(err: toml::ser::Error) -> Self {
        ShellError::Config(format!("Cannot serialize configuration: {err}"))
    }
}
