use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

/// First line of a fresh file-backed log. Readers skip any `#`-prefixed line.
const SIGNATURE: &str = "# chronik-streamlog v1";

/// Storage behind a [`StreamLog`](crate::StreamLog).
///
/// A backing stores opaque lines in append order. `load_lines` is called once
/// when the log is opened and returns everything previously appended;
/// `append_line` must make the line durable before returning.
pub trait Backing: Send + 'static {
    fn load_lines(&mut self) -> io::Result<Vec<String>>;
    fn append_line(&mut self, line: &str) -> io::Result<()>;
}

/// In-memory [`Backing`].
///
/// The buffer is shared between clones, so a log "reopened" from a clone of
/// its backing sees everything published so far. Mainly useful for tests.
#[derive(Clone, Debug, Default)]
pub struct Memory(Arc<RwLock<Vec<String>>>);

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw appended lines, for inspection.
    pub fn lines(&self) -> Vec<String> {
        self.0.read().clone()
    }
}

impl Backing for Memory {
    fn load_lines(&mut self) -> io::Result<Vec<String>> {
        Ok(self.lines())
    }

    fn append_line(&mut self, line: &str) -> io::Result<()> {
        self.0.write().push(line.to_owned());
        Ok(())
    }
}

/// A single append-only file, one record per line.
///
/// Created files start with a signature comment line; comment and blank lines
/// are skipped when loading, so the record framing itself stays pure JSON.
#[derive(Debug)]
pub struct FileBacking {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileBacking {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backing for FileBacking {
    fn load_lines(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();
        let existed = self.path.exists();
        if existed {
            let reader = BufReader::new(File::open(&self.path)?);
            for line in reader.lines() {
                let line = line?;
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                lines.push(line);
            }
            debug!("resuming log {}: {} records", self.path.display(), lines.len());
        } else {
            debug!("starting fresh log {}", self.path.display());
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        if !existed {
            writeln!(file, "{SIGNATURE}")?;
            file.flush()?;
        }
        self.writer = Some(BufWriter::new(file));
        Ok(lines)
    }

    fn append_line(&mut self, line: &str) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "file backing not loaded"))?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}
