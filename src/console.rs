use std::io::{self, Write};

use crate::color::ColorBuffer;
use crate::error::ShellError;

/// Where the shell prints. Write failures on the terminal are not
/// actionable, so they are dropped.
pub struct Console {
    out: Box<dyn Write>,
    pub color: bool,
}

impl Console {
    pub fn new(out: Box<dyn Write>, color: bool) -> Self {
        Self { out, color }
    }

    pub fn stdout(color: bool) -> Self {
        Self::new(Box::new(io::stdout()), color)
    }

    /// An empty buffer that follows the current color setting.
    pub fn buffer(&self) -> ColorBuffer {
        ColorBuffer::new(self.color)
    }

    pub fn output(&mut self, buffer: &ColorBuffer) {
        let text = if self.color {
            buffer.colored()
        } else {
            buffer.mono()
        };
        self.line(&text);
    }

    pub fn line(&mut self, text: &str) {
        let _ = writeln!(self.out, "{text}");
    }

    /// Database errors carry an `Error:` prefix; everything else prints as is.
    pub fn error(&mut self, err: &ShellError) {
        let text = match err {
            ShellError::Backend { .. } => format!("Error: {err}"),
            _ => err.to_string(),
        };
        let buffer = self.buffer().red(&text);
        self.output(&buffer);
    }

    pub fn flush(&mut self) {
        let _ = self.out.flush();
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_backend_errors_are_prefixed() {
        let (mut console, out) = capture::console(false);
        console.error(&ShellError::backend("boom"));
        console.error(&ShellError::no_connection());
        assert_eq!(out.text(), "Error: boom (state=,code=0)\nNo current connection\n");
    }

    #[rstest]
    fn test_color_follows_flag() {
        let (mut console, out) = capture::console(true);
        console.output(&ColorBuffer::new(false).green("ok"));
        assert!(out.text().contains('\x1b'));

        out.clear();
        console.color = false;
        console.output(&ColorBuffer::new(true).green("ok"));
        assert_eq!(out.text(), "ok\n");
    }
}
