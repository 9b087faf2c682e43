//! Append-only structured log shared by cloning and watching.
//!
//! Each record is encoded in memory, then written with a single `write_all`
//! and flushed while the sink's lock is held, so records never interleave.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum LogSinkError {
    #[error("log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV encoding error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("log sink is closed")]
    Closed,
}

/// On-disk record encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEncoding {
    Csv,
    /// One JSON object per line.
    Ndjson,
}

impl LogEncoding {
    /// `.json`, `.jsonl` and `.ndjson` select NDJSON; anything else is CSV.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json" | "jsonl" | "ndjson") => Self::Ndjson,
            _ => Self::Csv,
        }
    }
}

struct SinkState {
    file: Option<File>,
    needs_header: bool,
    written: usize,
}

/// Append-only record writer.
pub struct LogSink {
    path: PathBuf,
    encoding: LogEncoding,
    state: Mutex<SinkState>,
}

impl LogSink {
    /// Open (or create) the log for appending.
    ///
    /// Missing parent directories are created. Failure here is a
    /// configuration error and happens before any work is dispatched.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let wrap = |source| ConfigError::LogFile {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(wrap)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(wrap)?;
        let existing_len = file.metadata().await.map_err(wrap)?.len();

        let encoding = LogEncoding::from_path(&path);
        tracing::debug!(path = %path.display(), ?encoding, existing_len, "Opened log sink");

        Ok(Self {
            encoding,
            state: Mutex::new(SinkState {
                file: Some(file),
                needs_header: existing_len == 0,
                written: 0,
            }),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encoding(&self) -> LogEncoding {
        self.encoding
    }

    /// Records appended through this handle.
    pub async fn written(&self) -> usize {
        self.state.lock().await.written
    }

    /// Append one record and flush it before returning.
    pub async fn append<T: Serialize>(&self, record: &T) -> Result<(), LogSinkError> {
        let mut state = self.state.lock().await;
        let needs_header = state.needs_header;
        let Some(file) = state.file.as_mut() else {
            return Err(LogSinkError::Closed);
        };

        let bytes = match self.encoding {
            LogEncoding::Csv => encode_csv(record, needs_header)?,
            LogEncoding::Ndjson => {
                let mut line = serde_json::to_vec(record)?;
                line.push(b'\n');
                line
            }
        };

        file.write_all(&bytes).await?;
        file.flush().await?;
        state.needs_header = false;
        state.written += 1;
        Ok(())
    }

    /// Flush and sync the file, then release it. Later appends fail with
    /// [`LogSinkError::Closed`].
    pub async fn close(&self) -> Result<(), LogSinkError> {
        let mut state = self.state.lock().await;
        if let Some(mut file) = state.file.take() {
            file.flush().await?;
            file.sync_all().await?;
            tracing::debug!(path = %self.path.display(), written = state.written, "Closed log sink");
        }
        Ok(())
    }
}

fn encode_csv<T: Serialize>(record: &T, with_header: bool) -> Result<Vec<u8>, LogSinkError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(with_header)
        .from_writer(Vec::new());
    writer.serialize(record)?;
    writer.into_inner().map_err(|e| LogSinkError::Io(e.into_error()))
}

/// Re-read every record of a log written by [`LogSink`].
pub async fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, LogSinkError> {
    let bytes = tokio::fs::read(path).await?;
    match LogEncoding::from_path(path) {
        LogEncoding::Csv => {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .from_reader(bytes.as_slice());
            reader
                .deserialize::<T>()
                .map(|row| row.map_err(LogSinkError::from))
                .collect()
        }
        LogEncoding::Ndjson => bytes
            .split(|b| *b == b'\n')
            .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
            .map(|line| serde_json::from_slice(line).map_err(LogSinkError::from))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        name: String,
        count: u64,
    }

    fn row(name: &str, count: u64) -> Row {
        Row {
            name: name.to_string(),
            count,
        }
    }

    #[test]
    fn test_encoding_from_extension() {
        assert_eq!(LogEncoding::from_path(Path::new("a.json")), LogEncoding::Ndjson);
        assert_eq!(LogEncoding::from_path(Path::new("a.JSONL")), LogEncoding::Ndjson);
        assert_eq!(LogEncoding::from_path(Path::new("a.ndjson")), LogEncoding::Ndjson);
        assert_eq!(LogEncoding::from_path(Path::new("a.csv")), LogEncoding::Csv);
        assert_eq!(LogEncoding::from_path(Path::new("changes")), LogEncoding::Csv);
    }

    #[tokio::test]
    async fn test_csv_header_written_once_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let sink = LogSink::open(&path).await.unwrap();
        sink.append(&row("a", 1)).await.unwrap();
        sink.close().await.unwrap();

        let sink = LogSink::open(&path).await.unwrap();
        sink.append(&row("b", 2)).await.unwrap();
        sink.close().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "name,count\na,1\nb,2\n");

        let rows: Vec<Row> = read_records(&path).await.unwrap();
        assert_eq!(rows, vec![row("a", 1), row("b", 2)]);
    }

    #[tokio::test]
    async fn test_ndjson_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("log.jsonl");

        let sink = LogSink::open(&path).await.unwrap();
        assert_eq!(sink.encoding(), LogEncoding::Ndjson);
        sink.append(&row("a", 1)).await.unwrap();
        sink.append(&row("b", 2)).await.unwrap();
        assert_eq!(sink.written().await, 2);
        sink.close().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        let rows: Vec<Row> = read_records(&path).await.unwrap();
        assert_eq!(rows, vec![row("a", 1), row("b", 2)]);
    }

    #[tokio::test]
    async fn test_append_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LogSink::open(dir.path().join("log.csv")).await.unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap();
        assert!(matches!(
            sink.append(&row("late", 0)).await,
            Err(LogSinkError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_open_failure_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let err = LogSink::open(blocker.join("log.csv"))
            .await
            .err()
            .expect("parent is a file");
        assert!(matches!(err, ConfigError::LogFile { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let sink = Arc::new(LogSink::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..32u64 {
            let sink = Arc::clone(&sink);
            handles.push(tokio::spawn(async move {
                sink.append(&row(&format!("r{i}"), i)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        sink.close().await.unwrap();

        let mut rows: Vec<Row> = read_records(&path).await.unwrap();
        rows.sort_by_key(|r| r.count);
        assert_eq!(rows.len(), 32);
        assert!(rows.iter().enumerate().all(|(i, r)| r.count == i as u64));
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("name,count").count(), 1);
    }
}
