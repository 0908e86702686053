//! NDJSON (Newline Delimited JSON) file connectors

use crate::disposable::{Disposable, DisposeFlag};
use crate::etl::{Extractor, Loader};

use async_trait::async_trait;
use eyre::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Data source reading one JSON record per line
pub struct NdjsonSource {
    path: PathBuf,
    flag: DisposeFlag,
}

impl NdjsonSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            flag: DisposeFlag::new("NdjsonSource"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all lines as JSON values, skipping blank lines
    pub fn read(&self) -> Result<Vec<Value>> {
        self.flag.ensure_active()?;
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read NDJSON file: {}", self.path.display()))?;

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(number, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!(
                        "Failed to parse JSON on line {} of {}",
                        number + 1,
                        self.path.display()
                    )
                })
            })
            .collect()
    }
}

impl Disposable for NdjsonSource {
    fn is_disposed(&self) -> bool {
        self.flag.is_set()
    }

    fn dispose(&self) {
        if self.flag.set() {
            log::debug!("Disposed NDJSON source {}", self.path.display());
        }
    }
}

#[async_trait]
impl Extractor for NdjsonSource {
    type Output = Vec<Value>;

    async fn extract(&self) -> Result<Self::Output> {
        let records = self.read()?;
        log::info!(
            "Read {} record(s) from {}",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }
}

/// Data sink writing one JSON record per line
///
/// Replaces the file on every load unless created with
/// [`appending`](NdjsonSink::appending).
pub struct NdjsonSink {
    path: PathBuf,
    append: bool,
    flag: DisposeFlag,
}

impl NdjsonSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            append: false,
            flag: DisposeFlag::new("NdjsonSink"),
        }
    }

    /// Add records to the end of the file instead of replacing it
    pub fn appending(mut self) -> Self {
        self.append = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write JSON values as NDJSON
    pub fn write(&self, items: &[Value]) -> Result<()> {
        self.flag.ensure_active()?;
        let ndjson = items
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?
            .join("\n");

        let content = if ndjson.is_empty() {
            String::new()
        } else {
            format!("{}\n", ndjson)
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write NDJSON file: {}", self.path.display()))?;

        Ok(())
    }

    /// Append items to an existing NDJSON file
    pub fn append(&self, items: &[Value]) -> Result<()> {
        use std::io::Write;

        self.flag.ensure_active()?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open NDJSON file: {}", self.path.display()))?;

        for item in items {
            writeln!(file, "{}", serde_json::to_string(item)?)?;
        }

        Ok(())
    }
}

impl Disposable for NdjsonSink {
    fn is_disposed(&self) -> bool {
        self.flag.is_set()
    }

    fn dispose(&self) {
        if self.flag.set() {
            log::debug!("Disposed NDJSON sink {}", self.path.display());
        }
    }
}

#[async_trait]
impl Loader for NdjsonSink {
    type Input = Vec<Value>;

    async fn load(&self, items: Self::Input) -> Result<()> {
        if self.append {
            self.append(&items)?;
        } else {
            self.write(&items)?;
        }
        log::info!("Wrote {} record(s) to {}", items.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use serde_json::json;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_read_write() {
        let temp = NamedTempFile::new().unwrap();
        let sink = NdjsonSink::new(temp.path());

        let data = vec![json!({"a": 1}), json!({"b": 2})];
        sink.write(&data).unwrap();

        let source = NdjsonSource::new(temp.path());
        assert_eq!(source.read().unwrap(), data);
    }

    #[tokio::test]
    async fn test_appending_sink() {
        let temp = NamedTempFile::new().unwrap();
        NdjsonSink::new(temp.path())
            .load(vec![json!({"a": 1})])
            .await
            .unwrap();
        NdjsonSink::new(temp.path())
            .appending()
            .load(vec![json!({"b": 2})])
            .await
            .unwrap();

        let data = NdjsonSource::new(temp.path()).extract().await.unwrap();
        assert_eq!(data, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "{\"a\":1}\n\n   \n{\"b\":2}\n").unwrap();

        let data = NdjsonSource::new(temp.path()).read().unwrap();
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_parse_error_names_the_line() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "{\"a\":1}\nnot json\n").unwrap();

        let err = NdjsonSource::new(temp.path()).read().unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_sink_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("records.ndjson");

        NdjsonSink::new(&path).write(&[json!({"a": 1})]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":1}\n");
    }

    #[tokio::test]
    async fn test_disposed_connectors_refuse_work() {
        let temp = NamedTempFile::new().unwrap();
        let source = NdjsonSource::new(temp.path());
        let sink = NdjsonSink::new(temp.path());
        source.dispose();
        sink.dispose();
        sink.dispose();

        let err = source.extract().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EtlError>(),
            Some(EtlError::ResourceDisposed { .. })
        ));
        assert!(sink.load(vec![]).await.is_err());
    }
}
