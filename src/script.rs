//! Recording of entered lines into a replayable file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ShellError;

/// An open recording. Each line is flushed as it is written so a crash
/// keeps everything entered so far.
pub struct Script {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Script {
    /// Creates (or truncates) `path`.
    pub fn start(path: &Path) -> Result<Self, ShellError> {
        let file = File::create(path)?;
        debug!("[Script::start] Recording to {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&mut self, line: &str) -> Result<(), ShellError> {
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and closes the file, returning its path.
    pub fn close(mut self) -> Result<PathBuf, ShellError> {
        self.writer.flush()?;
        debug!("[Script::close] Closed {}", self.path.display());
        Ok(self.path)
    }
}
