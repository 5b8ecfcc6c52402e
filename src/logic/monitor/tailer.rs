//! EVE log tailer
//!
//! One background task follows the log from its current end, hands every
//! complete line to an `EventSink` and sleeps for the poll interval when
//! there is nothing new. Stopping is cooperative: the flag is checked once
//! per iteration.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::task::JoinHandle;

use crate::config::MonitorConfig;

/// Receives complete lines in file order
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn handle_line(&self, line: &str);
}

pub struct LogTailer {
    path: PathBuf,
    poll_interval: Duration,
}

/// Handle to a running tailer
pub struct TailerHandle {
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl TailerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Ask the worker to stop after its current iteration
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop and wait for the worker to exit
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            tracing::warn!("Log tailer task ended abnormally: {}", e);
        }
    }
}

impl LogTailer {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            poll_interval,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(&config.eve_log_path, Duration::from_millis(config.poll_interval_ms.max(1)))
    }

    /// Spawn the worker. Returns `None` (and ingestion stays off) when the log
    /// does not exist. The start offset is taken before returning, so lines
    /// appended after `start` are never skipped.
    pub fn start(self, sink: Arc<dyn EventSink>) -> Option<TailerHandle> {
        let offset = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(
                    "EVE log {} not found, alert ingestion disabled: {}",
                    self.path.display(),
                    e
                );
                return None;
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let task = tokio::spawn(async move {
            self.run(sink, flag, offset).await;
        });

        Some(TailerHandle { running, task })
    }

    async fn run(self, sink: Arc<dyn EventSink>, running: Arc<AtomicBool>, offset: u64) {
        let (mut reader, mut position) = match open_at(&self.path, SeekFrom::Start(offset)).await {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!("Cannot open EVE log {}: {}", self.path.display(), e);
                running.store(false, Ordering::SeqCst);
                return;
            }
        };

        tracing::info!("Tailing {} from offset {}", self.path.display(), position);

        // Bytes of a line still being written
        let mut pending: Vec<u8> = Vec::new();

        while running.load(Ordering::SeqCst) {
            match reader.read_until(b'\n', &mut pending).await {
                Ok(0) => {
                    if self.was_truncated(position).await {
                        tracing::info!("{} was truncated or rotated, reading from start", self.path.display());
                        match open_at(&self.path, SeekFrom::Start(0)).await {
                            Ok((new_reader, new_position)) => {
                                reader = new_reader;
                                position = new_position;
                                pending.clear();
                            }
                            Err(e) => tracing::warn!("Cannot reopen {}: {}", self.path.display(), e),
                        }
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
                Ok(n) => {
                    position += n as u64;
                    if pending.last() != Some(&b'\n') {
                        // partial line, the rest is read on a later pass
                        continue;
                    }

                    let line = String::from_utf8_lossy(&pending);
                    let line = line.trim();
                    if !line.is_empty() {
                        sink.handle_line(line).await;
                    }
                    pending.clear();
                }
                Err(e) => {
                    tracing::warn!("Error reading {}: {}", self.path.display(), e);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        tracing::info!("Log tailer for {} stopped", self.path.display());
    }

    async fn was_truncated(&self, position: u64) -> bool {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len() < position,
            Err(_) => false,
        }
    }
}

async fn open_at(path: &Path, from: SeekFrom) -> std::io::Result<(BufReader<File>, u64)> {
    let mut file = File::open(path).await?;
    let position = file.seek(from).await?;
    Ok((BufReader::new(file), position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Write;

    #[derive(Default)]
    struct CollectingSink {
        lines: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventSink for CollectingSink {
        async fn handle_line(&self, line: &str) {
            self.lines.lock().push(line.to_string());
        }
    }

    impl CollectingSink {
        async fn wait_for(&self, count: usize) -> Vec<String> {
            for _ in 0..200 {
                if self.lines.lock().len() >= count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            self.lines.lock().clone()
        }
    }

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file.flush().unwrap();
    }

    #[tokio::test]
    async fn missing_file_does_not_start() {
        let sink = Arc::new(CollectingSink::default());
        let tailer = LogTailer::new("/nonexistent/suricata/eve.json", Duration::from_millis(5));
        assert!(tailer.start(sink).is_none());
    }

    #[tokio::test]
    async fn skips_history_and_follows_appends() {
        let file = tempfile::NamedTempFile::new().unwrap();
        append(file.path(), "{\"old\":1}\n");

        let sink = Arc::new(CollectingSink::default());
        let handle = LogTailer::new(file.path(), Duration::from_millis(5))
            .start(sink.clone())
            .unwrap();

        // written immediately after start, before the worker has polled
        append(file.path(), "{\"new\":1}\n{\"new\":2}\n");
        let lines = sink.wait_for(2).await;
        assert_eq!(lines, vec!["{\"new\":1}", "{\"new\":2}"]);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn partial_line_waits_for_newline() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let sink = Arc::new(CollectingSink::default());
        let handle = LogTailer::new(file.path(), Duration::from_millis(5))
            .start(sink.clone())
            .unwrap();

        append(file.path(), "{\"event_type\":");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sink.lines.lock().is_empty());

        append(file.path(), "\"alert\"}\n");
        let lines = sink.wait_for(1).await;
        assert_eq!(lines, vec!["{\"event_type\":\"alert\"}"]);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn truncation_restarts_from_beginning() {
        let file = tempfile::NamedTempFile::new().unwrap();
        append(file.path(), &"x".repeat(256));
        append(file.path(), "\n");

        let sink = Arc::new(CollectingSink::default());
        let handle = LogTailer::new(file.path(), Duration::from_millis(5))
            .start(sink.clone())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        std::fs::write(file.path(), "after-rotate\n").unwrap();
        let lines = sink.wait_for(1).await;
        assert_eq!(lines, vec!["after-rotate"]);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn stop_is_cooperative() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let sink = Arc::new(CollectingSink::default());
        let handle = LogTailer::new(file.path(), Duration::from_millis(5))
            .start(sink)
            .unwrap();

        assert!(handle.is_running());
        handle.stop();
        assert!(!handle.is_running());
        handle.shutdown().await;
    }
}
