pub mod backend;
pub mod cli;
pub mod color;
pub mod commands;
pub mod completion;
pub mod config;
pub mod connections;
pub mod console;
pub mod database_sqlx; // sqlx-backed drivers for SQLite, PostgreSQL and MySQL
pub mod dispatch;
pub mod error;
pub mod format;
pub mod introspect;
pub mod logging;
pub mod prompt;
pub mod reflector;
pub mod rows;
pub mod script;
pub mod session;

pub use config::{Config, Opts};
pub use dispatch::Shell;
pub use error::ShellError;
