//! Destinations for exported files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Where an export lands: a browser download, a directory, an HTTP body.
pub trait ExportSink {
    fn write(&mut self, bytes: &[u8], filename: &str, mime_type: &str) -> io::Result<()>;
}

/// One file captured by a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Keeps exported files in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub artifacts: Vec<Artifact>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&Artifact> {
        self.artifacts.last()
    }

    pub fn into_last(mut self) -> Option<Artifact> {
        self.artifacts.pop()
    }
}

impl ExportSink for MemorySink {
    fn write(&mut self, bytes: &[u8], filename: &str, mime_type: &str) -> io::Result<()> {
        self.artifacts.push(Artifact {
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}

/// Writes exported files into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            written: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ExportSink for DirectorySink {
    fn write(&mut self, bytes: &[u8], filename: &str, _mime_type: &str) -> io::Result<()> {
        // Only the final path component is honoured; exports never escape the root.
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty export filename"))?;
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(name);
        fs::write(&path, bytes)?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "wrote export");
        self.written.push(path);
        Ok(())
    }
}
