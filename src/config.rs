use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use dirs::home_dir;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use crate::backend::Isolation;
use crate::error::ShellError;
use crate::reflector::{self, MethodSpec, ParamType, Reflect, Value};

/// Prefix accepted in front of option names (`--dbline.color=false`).
pub const PROPERTY_PREFIX: &str = "dbline.";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum OutputFormat {
    #[default]
    Table,
    Vertical,
    Csv,
    Tsv,
    Json,
    XmlAttr,
    XmlElements,
}

/// Shell options. Every field is reachable from `!set <key> <value>` through
/// the `set<Key>` method registered in [`Reflect for Opts`](Reflect).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Opts {
    pub color: bool,
    pub show_header: bool,
    /// Repeat the header every N rows; zero or less disables repetition.
    pub header_interval: i32,
    /// Skip table and column discovery on connect.
    pub fast_connect: bool,
    pub auto_commit: bool,
    pub verbose: bool,
    pub show_warnings: bool,
    pub show_time: bool,
    pub max_width: usize,
    /// Caps every normalized column width; zero means no cap.
    pub max_column_width: usize,
    pub isolation: Isolation,
    pub output_format: OutputFormat,
    pub history_file: PathBuf,
}

impl Default for Opts {
    fn default() -> Self {
        Opts {
            color: true,
            show_header: true,
            header_interval: 100,
            fast_connect: true,
            auto_commit: true,
            verbose: true,
            show_warnings: false,
            show_time: false,
            max_width: default_max_width(),
            max_column_width: 0,
            isolation: Isolation::RepeatableRead,
            output_format: OutputFormat::Table,
            history_file: default_history_file(),
        }
    }
}

fn default_max_width() -> usize {
    terminal_size::terminal_size()
        .map(|(terminal_size::Width(w), _)| usize::from(w))
        .unwrap_or(80)
}

fn default_history_file() -> PathBuf {
    Config::get_config_dir()
        .map(|dir| dir.join("history"))
        .unwrap_or_else(|| PathBuf::from(".dbline_history"))
}

impl Opts {
    /// Applies `key = value` through the matching `set<key>` method.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ShellError> {
        let key = key.strip_prefix(PROPERTY_PREFIX).unwrap_or(key);
        debug!("[Opts::set] {} = {}", key, value);
        reflector::invoke(self, &format!("set{key}"), &[Some(value.to_string())])
            .map(|_| ())
            .map_err(|e| ShellError::Config(format!("Error setting configuration: {key}: {e}")))
    }

    /// Current values keyed by option name, sorted.
    pub fn to_properties(&self) -> Result<BTreeMap<String, String>, ShellError> {
        let toml::Value::Table(table) = toml::Value::try_from(self)? else {
            return Ok(BTreeMap::new());
        };
        Ok(table
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    toml::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect())
    }
}

fn flag(args: &[Value]) -> Result<bool, ShellError> {
    args.first()
        .and_then(Value::as_bool)
        .ok_or_else(|| ShellError::UserInput("expected true or false".to_string()))
}

fn int(args: &[Value]) -> Result<i32, ShellError> {
    args.first()
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| ShellError::UserInput("expected a number".to_string()))
}

fn width(args: &[Value]) -> Result<usize, ShellError> {
    usize::try_from(int(args)?)
        .map_err(|_| ShellError::UserInput("expected a non-negative number".to_string()))
}

fn text(args: &[Value]) -> Result<&str, ShellError> {
    args.first()
        .and_then(Value::as_str)
        .ok_or_else(|| ShellError::UserInput("expected a value".to_string()))
}

impl Reflect for Opts {
    fn methods() -> Vec<MethodSpec<Self>> {
        use ParamType::{Bool, Int, Str};
        vec![
            MethodSpec::new("setColor", &[Bool], |o, a| {
                o.color = flag(&a)?;
                Ok(Value::Unit)
            }),
            MethodSpec::new("setShowHeader", &[Bool], |o, a| {
                o.show_header = flag(&a)?;
                Ok(Value::Unit)
            }),
            MethodSpec::new("setHeaderInterval", &[Int], |o, a| {
                o.header_interval = int(&a)?;
                Ok(Value::Unit)
            }),
            MethodSpec::new("setFastConnect", &[Bool], |o, a| {
                o.fast_connect = flag(&a)?;
                Ok(Value::Unit)
            }),
            MethodSpec::new("setAutoCommit", &[Bool], |o, a| {
                o.auto_commit = flag(&a)?;
                Ok(Value::Unit)
            }),
            MethodSpec::new("setVerbose", &[Bool], |o, a| {
                o.verbose = flag(&a)?;
                Ok(Value::Unit)
            }),
            MethodSpec::new("setShowWarnings", &[Bool], |o, a| {
                o.show_warnings = flag(&a)?;
                Ok(Value::Unit)
            }),
            MethodSpec::new("setShowTime", &[Bool], |o, a| {
                o.show_time = flag(&a)?;
                Ok(Value::Unit)
            }),
            MethodSpec::new("setMaxWidth", &[Int], |o, a| {
                o.max_width = width(&a)?;
                Ok(Value::Unit)
            }),
            MethodSpec::new("setMaxColumnWidth", &[Int], |o, a| {
                o.max_column_width = width(&a)?;
                Ok(Value::Unit)
            }),
            MethodSpec::new("setIsolation", &[Str], |o, a| {
                o.isolation = text(&a)?
                    .parse()
                    .map_err(|_| ShellError::usage(&Isolation::usage()))?;
                Ok(Value::Unit)
            }),
            MethodSpec::new("setOutputFormat", &[Str], |o, a| {
                let name = text(&a)?;
                o.output_format = name.parse().map_err(|_| {
                    ShellError::UserInput(format!("Unknown output format \"{name}\""))
                })?;
                Ok(Value::Unit)
            }),
            MethodSpec::new("setHistoryFile", &[Str], |o, a| {
                o.history_file = expand_home(text(&a)?);
                Ok(Value::Unit)
            }),
        ]
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub console_output: bool,
    #[serde(default = "default_file_output")]
    pub file_output: bool,
    /// Empty means `debug.log` in the config directory.
    #[serde(default)]
    pub file_path: String,
}

fn default_file_output() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            console_output: false,
            file_output: default_file_output(),
            file_path: String::new(),
        }
    }
}

/// On-disk layout of `config.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Config {
    #[serde(rename = "dbline", default)]
    pub opts: Opts,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// `~/.config/dbline`, or `None` without a home directory.
    pub fn get_config_dir() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".config").join("dbline"))
    }

    pub fn default_path() -> Option<PathBuf> {
        Self::get_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Missing files yield the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ShellError> {
        if !path.exists() {
            debug!("[Config::load_from] {} not found, using defaults", path.display());
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ShellError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let toml = toml::to_string(self)?;
        let mut file = File::create(path)?;
        file.write_all(toml.as_bytes())?;
        debug!("[Config::save_to] Wrote {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;

    #[rstest]
    fn test_defaults() {
        let opts = Opts::default();
        assert!(opts.color);
        assert!(opts.show_header);
        assert_eq!(opts.header_interval, 100);
        assert!(opts.fast_connect);
        assert!(opts.auto_commit);
        assert!(opts.verbose);
        assert!(!opts.show_warnings);
        assert_eq!(opts.max_column_width, 0);
        assert_eq!(opts.isolation, Isolation::RepeatableRead);
        assert_eq!(opts.output_format, OutputFormat::Table);
    }

    #[rstest]
    fn test_setter_name_is_case_insensitive() {
        let mut opts = Opts::default();
        opts.color = false;
        reflector::invoke(&mut opts, "SETCOLOR", &[Some("true".to_string())]).unwrap();
        assert!(opts.color);
    }

    #[rstest]
    fn test_non_flag_string_sets_false() {
        let mut opts = Opts::default();
        reflector::invoke(&mut opts, "setColor", &[Some("notabool".to_string())]).unwrap();
        assert!(!opts.color);
    }

    #[rstest]
    #[case("headerInterval", "25")]
    #[case("HEADERINTERVAL", "25")]
    #[case("dbline.headerInterval", "25")]
    fn test_set_by_key(#[case] key: &str, #[case] value: &str) {
        let mut opts = Opts::default();
        opts.set(key, value).unwrap();
        assert_eq!(opts.header_interval, 25);
    }

    #[rstest]
    fn test_set_typed_values() {
        let mut opts = Opts::default();
        opts.set("isolation", "transaction_read_committed").unwrap();
        opts.set("outputFormat", "vertical").unwrap();
        opts.set("maxWidth", "120").unwrap();
        opts.set("showWarnings", "on").unwrap();
        assert_eq!(opts.isolation, Isolation::ReadCommitted);
        assert_eq!(opts.output_format, OutputFormat::Vertical);
        assert_eq!(opts.max_width, 120);
        assert!(opts.show_warnings);
    }

    #[rstest]
    #[case("nosuchkey", "1", "Error setting configuration: nosuchkey:")]
    #[case("maxWidth", "wide", "Error setting configuration: maxWidth:")]
    #[case("maxWidth", "-3", "non-negative")]
    #[case("outputFormat", "xml", "Unknown output format")]
    fn test_set_rejects_bad_input(#[case] key: &str, #[case] value: &str, #[case] expected: &str) {
        let mut opts = Opts::default();
        let before = opts.clone();
        let err = opts.set(key, value).unwrap_err();
        assert!(err.to_string().contains(expected), "{err}");
        assert_eq!(opts, before);
    }

    #[rstest]
    #[case("json", OutputFormat::Json)]
    #[case("xml-attr", OutputFormat::XmlAttr)]
    #[case("XML-ELEMENTS", OutputFormat::XmlElements)]
    fn test_structured_output_formats(#[case] name: &str, #[case] expected: OutputFormat) {
        let mut opts = Opts::default();
        opts.set("outputFormat", name).unwrap();
        assert_eq!(opts.output_format, expected);
        assert_eq!(
            opts.to_properties().unwrap().get("outputFormat").map(String::as_str),
            Some(name.to_lowercase().as_str())
        );
    }

    #[rstest]
    #[case(LogLevel::Trace, "trace")]
    #[case(LogLevel::Warn, "warn")]
    fn test_log_level_names(#[case] level: LogLevel, #[case] name: &str) {
        assert_eq!(level.to_string(), name);
        assert_eq!(name.to_uppercase().parse::<LogLevel>().unwrap(), level);
        let config: LoggingConfig = toml::from_str(&format!("level = \"{name}\"")).unwrap();
        assert_eq!(config.level, level);
    }

    #[rstest]
    fn test_to_properties_uses_option_names() {
        let props = Opts::default().to_properties().unwrap();
        assert_eq!(props.get("showHeader").map(String::as_str), Some("true"));
        assert_eq!(props.get("headerInterval").map(String::as_str), Some("100"));
        assert_eq!(
            props.get("isolation").map(String::as_str),
            Some("TRANSACTION_REPEATABLE_READ")
        );
        assert_eq!(props.get("outputFormat").map(String::as_str), Some("table"));
    }

    #[rstest]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.opts.set("color", "false").unwrap();
        config.opts.set("maxColumnWidth", "30").unwrap();
        config.logging.level = LogLevel::Debug;
        config.save_to(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[dbline]"));

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[rstest]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.logging, LoggingConfig::default());
        assert!(loaded.opts.show_header);
    }

    #[rstest]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[dbline]\nverbose = false\n").unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert!(!loaded.opts.verbose);
        assert_eq!(loaded.opts.header_interval, 100);
    }
}
