//! Output dispatch: atomic persist, optional print, bounded retry

use crate::error::{PipelineError, Result};
use crate::printer::Printer;
use std::fs::{self, File};
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Destination for finished documents
pub trait OutputSink: Send + Sync {
    /// Store `bytes` under `file_name`, returning the final path.
    ///
    /// Readers of the destination must never observe a partial file.
    fn persist(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Writes documents into a folder with [`atomic_write`]
#[derive(Debug, Clone)]
pub struct FolderSink {
    dir: PathBuf,
}

impl FolderSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl OutputSink for FolderSink {
    fn persist(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.dir.join(file_name);
        atomic_write(&path, bytes)?;
        Ok(path)
    }
}

/// Write a file through a temporary sibling and a rename
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    atomic_write_with(path, |file| file.write_all(bytes))
}

/// Atomic write with a caller-supplied writer.
///
/// The content goes to a hidden temporary file in the same folder, is synced,
/// then persisted over `path`. If `write` fails the temporary file is removed
/// and `path` is left exactly as it was.
pub fn atomic_write_with<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if path.file_name().is_none() {
        return Err(PipelineError::Configuration(format!(
            "Invalid output path {}",
            path.display()
        )));
    }

    fs::create_dir_all(dir).map_err(|e| PipelineError::io("creating output folder", dir, e))?;

    // Dropping the temp file on any early return deletes it
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| PipelineError::io("creating temp file in", dir, e))?;
    write(tmp.as_file_mut()).map_err(|e| PipelineError::io("writing", path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| PipelineError::io("syncing", path, e))?;
    tmp.persist(path)
        .map_err(|e| PipelineError::io("renaming into", path, e.error))?;

    // Persist the rename itself; not supported on every platform
    #[cfg(unix)]
    if let Ok(dir_handle) = File::open(dir) {
        let _ = dir_handle.sync_all();
    }

    Ok(())
}

/// Bounded retry with fixed backoff for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Run `op` until it succeeds, fails permanently or runs out of attempts.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    log::warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        operation,
                        attempt,
                        attempts,
                        self.backoff,
                        e
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        log::error!("{} failed after {} attempt(s): {}", operation, attempt, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// Persists finished documents and hands them to the printer
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn OutputSink>,
    printer: Option<Arc<dyn Printer>>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("printing", &self.printer.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn OutputSink>, printer: Option<Arc<dyn Printer>>, retry: RetryPolicy) -> Self {
        Self {
            sink,
            printer,
            retry,
        }
    }

    /// Persist a document, then print the persisted file if printing is on.
    ///
    /// Persisting and printing are retried independently, so a print retry
    /// never rewrites the file.
    pub async fn dispatch(&self, file_name: &str, bytes: Arc<[u8]>) -> Result<PathBuf> {
        let path = self
            .retry
            .run("Writing output", |_| {
                let sink = Arc::clone(&self.sink);
                let file_name = file_name.to_string();
                let bytes = Arc::clone(&bytes);
                async move {
                    tokio::task::spawn_blocking(move || sink.persist(&file_name, &bytes)).await?
                }
            })
            .await?;
        log::info!("Wrote {}", path.display());

        if let Some(printer) = &self.printer {
            let target = path.as_path();
            self.retry
                .run("Printing", move |_| printer.print_document(target))
                .await?;
            log::info!("Sent {} to the printer", path.display());
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn flaky(path: &str) -> PipelineError {
        PipelineError::io(
            "writing",
            path,
            io::Error::new(io::ErrorKind::NotConnected, "share unavailable"),
        )
    }

    #[tokio::test]
    async fn test_retry_stops_after_configured_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let result: Result<()> = policy
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(flaky("out.pdf")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let result = policy
            .run("test", |attempt| async move {
                if attempt < 2 {
                    Err(flaky("out.pdf"))
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::ZERO);

        let result: Result<()> = policy
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::malformed("a.pdf", "bad xref")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
    }
}
