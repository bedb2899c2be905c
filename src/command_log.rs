//! Append-only, timestamped command log.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub payload: String,
}

impl Display for LogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{}: {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.payload
        )
    }
}

struct LogState {
    file: Option<File>,
    content: String,
}

/// Every append and snapshot runs under one lock, so a record is either fully
/// visible or not visible at all. Records are stamped once the lock is held,
/// so timestamps follow file order.
pub struct CommandLog {
    path: Option<PathBuf>,
    state: Arc<Mutex<LogState>>,
}

impl CommandLog {
    /// Opens (or creates) the log file in append mode. Existing content is
    /// kept and included in snapshots.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read log file: {}", path.display()));
            }
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;

        debug!(path = %path.display(), bytes = content.len(), "Opened command log");
        Ok(Self {
            path: Some(path.to_path_buf()),
            state: Arc::new(Mutex::new(LogState {
                file: Some(file),
                content,
            })),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Arc::new(Mutex::new(LogState {
                file: None,
                content: String::new(),
            })),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends one record. The write runs on its own task: dropping the
    /// returned future does not stop a record that has been started, so the
    /// file and the in-memory mirror never diverge.
    pub async fn append(&self, payload: &str) -> Result<LogRecord> {
        let state = Arc::clone(&self.state);
        let payload = payload.to_string();
        tokio::spawn(async move { Self::write_record(&state, payload).await })
            .await
            .context("Log writer task failed")?
    }

    async fn write_record(state: &Mutex<LogState>, payload: String) -> Result<LogRecord> {
        let mut state = state.lock().await;
        let record = LogRecord {
            timestamp: Local::now(),
            payload,
        };
        let line = record.to_string();

        if let Some(file) = state.file.as_mut() {
            file.write_all(line.as_bytes())
                .await
                .context("Failed to write log record")?;
            file.flush().await.context("Failed to flush log file")?;
        }
        state.content.push_str(&line);
        debug!(bytes = line.len(), "Appended log record");

        Ok(record)
    }

    pub async fn snapshot_all(&self) -> String {
        self.state.lock().await.content.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_snapshot() -> Result<()> {
        let log = CommandLog::in_memory();
        let first = log.append("hello").await?;
        log.append("world").await?;

        let snapshot = log.snapshot_all().await;
        let lines: Vec<&str> = snapshot.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(": hello"));
        assert!(lines[1].ends_with(": world"));
        assert_eq!(lines[0], first.to_string().trim_end());
        Ok(())
    }

    #[tokio::test]
    async fn test_file_log_persists_and_reopens() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("exchange.log");

        let log = CommandLog::open(&path).await?;
        log.append("exchange\n2024-03-01\tEUR\t41.5").await?;
        drop(log);

        let reopened = CommandLog::open(&path).await?;
        reopened.append("ping").await?;

        let on_disk = tokio::fs::read_to_string(&path).await?;
        assert_eq!(reopened.snapshot_all().await, on_disk);
        assert!(on_disk.contains(": exchange\n2024-03-01\tEUR\t41.5\n"));
        assert!(on_disk.ends_with(": ping\n"));
        assert_eq!(reopened.path(), Some(path.as_path()));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_never_interleave() -> Result<()> {
        let dir = TempDir::new()?;
        let log = Arc::new(CommandLog::open(dir.path().join("exchange.log")).await?);

        let a = "A".repeat(64 * 1024);
        let b = "B".repeat(64 * 1024);
        let mut tasks = Vec::new();
        for payload in [a.clone(), b.clone()] {
            let log = Arc::clone(&log);
            tasks.push(tokio::spawn(async move { log.append(&payload).await }));
        }
        for task in tasks {
            task.await??;
        }

        let snapshot = log.snapshot_all().await;
        let payloads: Vec<&str> = snapshot
            .lines()
            .map(|line| line.split_once(": ").map(|(_, p)| p).unwrap_or_default())
            .collect();
        assert_eq!(payloads.len(), 2);
        assert!(payloads.contains(&a.as_str()));
        assert!(payloads.contains(&b.as_str()));
        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_append_still_writes_whole_record() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("exchange.log");
        let log = CommandLog::open(&path).await?;

        let big = "h".repeat(4 * 1024 * 1024);
        // Polled once, then dropped while the record is being written
        assert!(log.append(&big).now_or_never().is_none());
        log.append("later").await?;

        let on_disk = tokio::fs::read_to_string(&path).await?;
        assert_eq!(log.snapshot_all().await, on_disk);
        let payloads: Vec<&str> = on_disk
            .lines()
            .map(|line| line.split_once(": ").map(|(_, p)| p).unwrap_or_default())
            .collect();
        assert_eq!(payloads, vec![big.as_str(), "later"]);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_timestamps_follow_file_order() -> Result<()> {
        let log = Arc::new(CommandLog::in_memory());
        let mut tasks = Vec::new();
        for n in 0..32 {
            let log = Arc::clone(&log);
            tasks.push(tokio::spawn(async move { log.append(&format!("entry {n}")).await }));
        }
        for task in tasks {
            task.await??;
        }

        let snapshot = log.snapshot_all().await;
        let stamps: Vec<&str> = snapshot
            .lines()
            .filter_map(|line| line.split_once(": ").map(|(ts, _)| ts))
            .collect();
        assert_eq!(stamps.len(), 32);
        assert!(stamps.windows(2).all(|pair| pair[0] <= pair[1]));
        Ok(())
    }
}
