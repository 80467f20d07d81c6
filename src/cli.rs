use std::io::Write;

use clap::{CommandFactory, Parser, ValueEnum};

/// dbline - an interactive SQL shell for one or more database connections
#[derive(Parser, Clone, Default)]
#[command(name = "dbline")]
#[command(version, long_about = None)]
#[command(about = "Interactive SQL shell for one or more database connections")]
#[command(after_help = "Any --<option>=<value> argument sets a preference before connecting, \
for example --showHeader=false or --outputFormat=csv.")]
pub struct Args {
    /// Driver id to use instead of inferring it from the URL (sqlite, postgres, mysql)
    #[arg(short = 'd', value_name = "DRIVER")]
    pub driver: Option<String>,

    /// User name to connect with
    #[arg(short = 'n', value_name = "USER")]
    pub user: Option<String>,

    /// Password to connect with
    #[arg(short = 'p', value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Database URL to connect to on startup
    ///
    /// Examples:
    ///   SQLite:     sqlite:///path/to/database.db
    ///   PostgreSQL: postgres://localhost:5432/mydb
    ///   MySQL:      mysql://localhost:3306/mydb
    #[arg(short = 'u', value_name = "URL")]
    pub url: Option<String>,

    /// Run a command or SQL statement and exit; may be repeated
    #[arg(short = 'e', value_name = "COMMAND", action = clap::ArgAction::Append)]
    pub execute: Vec<String>,

    /// Generate shell completions
    #[arg(long, value_enum)]
    pub completions: Option<CompletionShell>,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("driver", &self.driver)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("url", &self.url)
            .field("execute", &self.execute)
            .field("completions", &self.completions)
            .finish()
    }
}

impl Args {
    /// The `!connect` line equivalent to `-u`/`-n`/`-p`/`-d`, if a URL was given.
    pub fn connect_parts(&self) -> Option<(&str, &str, &str, Option<&str>)> {
        let url = self.url.as_deref()?;
        Some((
            url,
            self.user.as_deref().unwrap_or(""),
            self.password.as_deref().unwrap_or(""),
            self.driver.as_deref(),
        ))
    }
}

/// Supported shells for completion generation
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

pub fn generate_completions(shell: CompletionShell, out: &mut dyn Write) {
    use clap_complete::shells;
    let mut cmd = Args::command();
    let name = "dbline";
    match shell {
        CompletionShell::Bash => clap_complete::generate(shells::Bash, &mut cmd, name, out),
        CompletionShell::Zsh => clap_complete::generate(shells::Zsh, &mut cmd, name, out),
        CompletionShell::Fish => clap_complete::generate(shells::Fish, &mut cmd, name, out),
        CompletionShell::PowerShell => {
            clap_complete::generate(shells::PowerShell, &mut cmd, name, out)
        }
        CompletionShell::Elvish => clap_complete::generate(shells::Elvish, &mut cmd, name, out),
    }
}

/// Long options clap itself understands; everything else of the form
/// `--key=value` is a preference.
const CLAP_LONG_OPTIONS: &[&str] = &["completions", "help", "version"];

/// Splits preference overrides out of the raw argument list. Returns the
/// arguments left for clap and the `(key, value)` pairs in order.
pub fn extract_overrides<I>(args: I) -> (Vec<String>, Vec<(String, String)>)
where
    I: IntoIterator<Item = String>,
{
    let mut remaining = Vec::new();
    let mut overrides = Vec::new();
    for arg in args {
        let preference = arg
            .strip_prefix("--")
            .and_then(|rest| rest.split_once('='))
            .filter(|(key, _)| !key.is_empty() && !CLAP_LONG_OPTIONS.contains(key));
        match preference {
            Some((key, value)) => overrides.push((key.to_string(), value.to_string())),
            None => remaining.push(arg),
        }
    }
    (remaining, overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[rstest]
    fn test_overrides_are_pulled_out_in_order() {
        let (rest, overrides) = extract_overrides(strings(&[
            "dbline",
            "--color=false",
            "-u",
            "sqlite::memory:",
            "--maxWidth=120",
            "--dbline.showTime=true",
        ]));
        assert_eq!(rest, strings(&["dbline", "-u", "sqlite::memory:"]));
        assert_eq!(
            overrides,
            vec![
                ("color".to_string(), "false".to_string()),
                ("maxWidth".to_string(), "120".to_string()),
                ("dbline.showTime".to_string(), "true".to_string()),
            ]
        );
    }

    #[rstest]
    #[case("--completions=bash")]
    #[case("--help")]
    #[case("--=x")]
    #[case("-e=select 1")]
    fn test_non_preferences_stay_for_clap(#[case] arg: &str) {
        let (rest, overrides) = extract_overrides(strings(&["dbline", arg]));
        assert_eq!(rest, strings(&["dbline", arg]));
        assert!(overrides.is_empty());
    }

    #[rstest]
    fn test_empty_value_is_kept() {
        let (_, overrides) = extract_overrides(strings(&["dbline", "--historyFile="]));
        assert_eq!(overrides, vec![("historyFile".to_string(), String::new())]);
    }

    #[rstest]
    fn test_parse_short_flags() {
        let args = Args::parse_from([
            "dbline", "-u", "postgres://h/db", "-n", "sa", "-p", "secret", "-d", "postgres", "-e",
            "!tables", "-e", "select 1",
        ]);
        assert_eq!(
            args.connect_parts(),
            Some(("postgres://h/db", "sa", "secret", Some("postgres")))
        );
        assert_eq!(args.execute, vec!["!tables", "select 1"]);
        assert!(!format!("{args:?}").contains("secret"));
    }

    #[rstest]
    fn test_no_url_means_no_connect() {
        let args = Args::parse_from(["dbline", "-n", "sa"]);
        assert_eq!(args.connect_parts(), None);
    }

    #[rstest]
    fn test_completions_generate() {
        let mut out = Vec::new();
        generate_completions(CompletionShell::Bash, &mut out);
        assert!(String::from_utf8_lossy(&out).contains("dbline"));
    }
}
