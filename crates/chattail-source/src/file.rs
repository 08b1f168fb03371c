use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{RawSnapshot, SnapshotSource, SourceError};

/// On-disk snapshot written by a client-side exporter.
///
/// ```json
/// { "tick": 1042, "buffers": { "messages": [ { "name": "Bob", "value": "hi", "type": "PUBLICCHAT" } ] } }
/// ```
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SnapshotDocument {
    /// Client tick at the time of export
    #[serde(default)]
    pub tick: u64,

    /// Buffer name to ordered entries
    #[serde(default)]
    pub buffers: HashMap<String, RawSnapshot>,
}

/// Reads snapshots from a JSON document the exporter rewrites in place
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and parse the whole document
    pub fn load(&self) -> Result<SnapshotDocument, SourceError> {
        let content = fs::read_to_string(&self.path).map_err(|source| SourceError::Io {
            path: self.path.clone(),
            source,
        })?;

        // The exporter may be caught between truncate and write
        if content.trim().is_empty() {
            return Err(SourceError::Unavailable(format!(
                "{} is empty",
                self.path.display()
            )));
        }

        serde_json::from_str(&content).map_err(|source| SourceError::Malformed {
            path: self.path.clone(),
            source,
        })
    }
}

impl SnapshotSource for FileSource {
    fn snapshot(&self, buffer: &str) -> Result<RawSnapshot, SourceError> {
        let mut document = self.load()?;
        Ok(document.buffers.remove(buffer).unwrap_or_default())
    }

    fn tick(&self) -> Result<u64, SourceError> {
        self.load().map(|document| document.tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_document(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_reads_buffer_and_tick() {
        let file = write_document(
            r#"{"tick": 7, "buffers": {"messages": [
                {"name": "Bob", "value": "hi", "type": "PUBLICCHAT"},
                {"value": "Welcome to the game."}
            ]}}"#,
        );
        let source = FileSource::new(file.path());

        assert_eq!(source.tick().unwrap(), 7);
        let snapshot = source.snapshot("messages").unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name.as_deref(), Some("Bob"));
        assert_eq!(snapshot[1].kind, None);
    }

    #[test]
    fn test_missing_buffer_is_empty() {
        let file = write_document(r#"{"tick": 1, "buffers": {}}"#);
        let source = FileSource::new(file.path());
        assert!(source.snapshot("clan").unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path().join("absent.json"));
        let err = source.tick().unwrap_err();
        assert!(err.is_unreachable());
    }

    #[test]
    fn test_malformed_document() {
        let file = write_document("{ not json");
        let source = FileSource::new(file.path());
        let err = source.snapshot("messages").unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
        assert!(!err.is_unreachable());
    }
}
