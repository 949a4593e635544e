//! Persistence backends for the parameter store.

use crate::error::ConfigError;
use crate::params::ParameterSet;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Where a [`ParameterStore`](crate::ParameterStore) reads and writes its document.
///
/// # Implementations
///
/// - **Production**: `JsonFileSource` - a JSON document on disk
/// - **Testing**: `MemorySource` - an in-memory document with a write counter
///
/// Every write replaces the whole document.
pub trait ConfigSource: Send + Sync {
    /// Reads the whole document.
    ///
    /// # Returns
    /// * `Ok(Some(params))` - The document exists and parsed
    /// * `Ok(None)` - No document exists yet
    /// * `Err(ConfigError::Malformed)` - The document exists but is invalid
    fn read(&self) -> Result<Option<ParameterSet>, ConfigError>;

    /// Replaces the whole document with `params`.
    fn write(&self, params: &ParameterSet) -> Result<(), ConfigError>;

    /// Human-readable name for logs and errors.
    fn describe(&self) -> String;
}

/// JSON document on the local filesystem.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ConfigSource for JsonFileSource {
    fn read(&self) -> Result<Option<ParameterSet>, ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ConfigError::io(self.describe(), e)),
        };

        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| ConfigError::malformed(self.describe(), e))?;
        ParameterSet::from_value(value, &self.describe()).map(Some)
    }

    fn write(&self, params: &ParameterSet) -> Result<(), ConfigError> {
        // 4-space indent
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        params.serialize(&mut ser)?;
        buf.push(b'\n');

        let tmp = self.temp_path();
        fs::write(&tmp, &buf).map_err(|e| ConfigError::io(self.describe(), e))?;
        fs::rename(&tmp, &self.path).map_err(|e| ConfigError::io(self.describe(), e))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory document that counts writes.
#[derive(Debug, Default)]
pub struct MemorySource {
    document: Mutex<Option<ParameterSet>>,
    writes: AtomicUsize,
}

impl MemorySource {
    /// Creates a source with no document (a fresh config).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source that already holds `params`.
    pub fn with_document(params: ParameterSet) -> Self {
        Self {
            document: Mutex::new(Some(params)),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `write` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns a copy of the stored document.
    pub fn document(&self) -> Option<ParameterSet> {
        self.document.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl ConfigSource for MemorySource {
    fn read(&self) -> Result<Option<ParameterSet>, ConfigError> {
        Ok(self.document())
    }

    fn write(&self, params: &ParameterSet) -> Result<(), ConfigError> {
        *self.document.lock().unwrap_or_else(|p| p.into_inner()) = Some(params.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

impl<S: ConfigSource + ?Sized> ConfigSource for std::sync::Arc<S> {
    fn read(&self) -> Result<Option<ParameterSet>, ConfigError> {
        (**self).read()
    }

    fn write(&self, params: &ParameterSet) -> Result<(), ConfigError> {
        (**self).write(params)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonFileSource::new(dir.path().join("config.json"));
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = JsonFileSource::new(&path).read().unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn test_write_uses_four_space_indent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let source = JsonFileSource::new(&path);

        source.write(&ParameterSet::new().with("duration", 10)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n    \"duration\": 10"));
        assert!(!source.temp_path().exists());
        assert_eq!(source.read().unwrap().unwrap().get_value("duration"), Some(&json!(10)));
    }

    #[test]
    fn test_memory_source_counts_writes() {
        let source = MemorySource::new();
        assert!(source.read().unwrap().is_none());

        source.write(&ParameterSet::new()).unwrap();
        source.write(&ParameterSet::new().with("a", 1)).unwrap();

        assert_eq!(source.write_count(), 2);
        assert_eq!(source.document().unwrap().len(), 1);
    }
}
