use std::sync::{Arc, Mutex};

use reedline::{Completer, Span, Suggestion};
use tracing::debug;

/// ANSI SQL keywords offered on every connection, before any the backend adds.
pub const SQL_KEYWORDS: &str = "ABSOLUTE,ACTION,ADD,ALL,ALLOCATE,ALTER,AND,ANY,ARE,AS,ASC,\
ASSERTION,AT,AUTHORIZATION,AVG,BEGIN,BETWEEN,BIT,BIT_LENGTH,BOTH,BY,CASCADE,CASCADED,CASE,CAST,\
CATALOG,CHAR,CHARACTER,CHAR_LENGTH,CHARACTER_LENGTH,CHECK,CLOSE,CLUSTER,COALESCE,COLLATE,\
COLLATION,COLUMN,COMMIT,CONNECT,CONNECTION,CONSTRAINT,CONSTRAINTS,CONTINUE,CONVERT,\
CORRESPONDING,COUNT,CREATE,CROSS,CURRENT,CURRENT_DATE,CURRENT_TIME,CURRENT_TIMESTAMP,\
CURRENT_USER,CURSOR,DATE,DAY,DEALLOCATE,DEC,DECIMAL,DECLARE,DEFAULT,DEFERRABLE,DEFERRED,DELETE,\
DESC,DESCRIBE,DESCRIPTOR,DIAGNOSTICS,DISCONNECT,DISTINCT,DOMAIN,DOUBLE,DROP,ELSE,END,END-EXEC,\
ESCAPE,EXCEPT,EXCEPTION,EXEC,EXECUTE,EXISTS,EXPLAIN,EXTERNAL,EXTRACT,FALSE,FETCH,FIRST,FLOAT,\
FOR,FOREIGN,FOUND,FROM,FULL,GET,GLOBAL,GO,GOTO,GRANT,GROUP,HAVING,HOUR,IDENTITY,IMMEDIATE,IN,\
INDICATOR,INITIALLY,INNER,INPUT,INSENSITIVE,INSERT,INT,INTEGER,INTERSECT,INTERVAL,INTO,IS,\
ISOLATION,JOIN,KEY,LANGUAGE,LAST,LEADING,LEFT,LEVEL,LIKE,LIMIT,LOCAL,LOWER,MATCH,MAX,MIN,MINUTE,\
MODULE,MONTH,NAMES,NATIONAL,NATURAL,NCHAR,NEXT,NO,NOT,NULL,NULLIF,NUMERIC,OCTET_LENGTH,OF,ON,\
ONLY,OPEN,OPTION,OR,ORDER,OUTER,OUTPUT,OVERLAPS,PAD,PARTIAL,POSITION,PRECISION,PREPARE,PRESERVE,\
PRIMARY,PRIOR,PRIVILEGES,PROCEDURE,PUBLIC,READ,REAL,REFERENCES,RELATIVE,RESTRICT,REVOKE,RIGHT,\
ROLLBACK,ROWS,SCHEMA,SCROLL,SECOND,SECTION,SELECT,SESSION,SESSION_USER,SET,SIZE,SMALLINT,SOME,\
SPACE,SQL,SQLCODE,SQLERROR,SQLSTATE,SUBSTRING,SUM,SYSTEM_USER,TABLE,TEMPORARY,THEN,TIME,\
TIMESTAMP,TIMEZONE_HOUR,TIMEZONE_MINUTE,TO,TRAILING,TRANSACTION,TRANSLATE,TRANSLATION,TRIM,TRUE,\
UNION,UNIQUE,UNKNOWN,UPDATE,UPPER,USAGE,USER,USING,VALUE,VALUES,VARCHAR,VARYING,VIEW,WHEN,\
WHENEVER,WHERE,WITH,WORK,WRITE,YEAR,ZONE";

/// Commands whose arguments are SQL and complete like SQL.
const SQL_COMMANDS: [&str; 2] = ["!all", "!sql"];

fn is_boundary(c: char) -> bool {
    c.is_whitespace() || c == '(' || c == ','
}

/// Byte offset where the word ending at `pos` starts.
fn word_start(line: &str, pos: usize) -> usize {
    line[..pos]
        .char_indices()
        .rev()
        .find(|(_, c)| is_boundary(*c))
        .map_or(0, |(i, c)| i + c.len_utf8())
}

/// Candidates for the word under the cursor, sorted and de-duplicated.
///
/// A line that starts with `!` (other than `!all` and `!sql`) completes its
/// first word against `!` plus each command alias, and nothing after it.
/// Any other line completes against `sql`.
pub fn complete_line(commands: &[String], sql: &[String], line: &str, pos: usize) -> Vec<String> {
    let pos = clamp_to_boundary(line, pos);
    let start = word_start(line, pos);
    let word = &line[start..pos];

    let mut found: Vec<String> = if is_command_line(line) {
        if start != 0 {
            return Vec::new();
        }
        commands
            .iter()
            .map(|alias| format!("!{alias}"))
            .filter(|candidate| candidate.starts_with(word))
            .collect()
    } else {
        sql.iter()
            .filter(|candidate| candidate.starts_with(word))
            .cloned()
            .collect()
    };
    found.sort();
    found.dedup();
    found
}

fn is_command_line(line: &str) -> bool {
    line.starts_with('!') && !SQL_COMMANDS.iter().any(|c| line.starts_with(c))
}

fn clamp_to_boundary(line: &str, pos: usize) -> usize {
    let mut pos = pos.min(line.len());
    while !line.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Reedline adapter. The shell refreshes `candidates` after every dispatch.
pub struct ShellCompleter {
    commands: Vec<String>,
    candidates: Arc<Mutex<Vec<String>>>,
}

impl ShellCompleter {
    pub fn new(commands: Vec<String>, candidates: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            commands,
            candidates,
        }
    }
}

impl Completer for ShellCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        let pos = clamp_to_boundary(line, pos);
        let start = word_start(line, pos);
        let values = match self.candidates.lock() {
            Ok(sql) => complete_line(&self.commands, &sql, line, pos),
            Err(_) => {
                debug!("[ShellCompleter::complete] Candidate list poisoned");
                complete_line(&self.commands, &[], line, pos)
            }
        };

        values
            .into_iter()
            .map(|value| Suggestion {
                value,
                span: Span { start, end: pos },
                append_whitespace: true,
                ..Suggestion::default()
            })
            .collect()
    }
}
