//! Processed-set ledger
//!
//! An append-only JSON Lines file with one success record per archive
//! fingerprint. Every append is flushed to disk before `mark_processed`
//! returns. On open, lines that fail to parse (a torn final write) are
//! dropped and the file is compacted through a temp file and rename, so a
//! crash can only ever lose the record being written, never an earlier one.

use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode ledger record: {0}")]
    Encode(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, LedgerError>;

/// Terminal outcome stored in the ledger; only successes are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Success,
}

/// One durable ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub fingerprint: Fingerprint,
    pub processed_at: DateTime<Utc>,
    pub outcome: RecordOutcome,
    /// Archive file name when it was recorded, for operators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
}

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    records: HashMap<Fingerprint, ProcessedRecord>,
}

impl Ledger {
    /// Open the ledger, creating an empty one if the file does not exist
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| LedgerError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let content = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(io_err(e)),
        };

        let mut records = HashMap::new();
        let mut dropped = 0usize;
        for (line_no, line) in content.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<ProcessedRecord>(line) {
                Ok(record) => {
                    // First record wins; later duplicates carry no new information
                    records
                        .entry(record.fingerprint.clone())
                        .or_insert(record);
                }
                Err(e) => {
                    log::warn!(
                        "Dropping unreadable ledger line {} in {}: {}",
                        line_no + 1,
                        path.display(),
                        e
                    );
                    dropped += 1;
                }
            }
        }

        let mut ledger = Self { path, records };
        let torn_tail = !content.is_empty() && !content.ends_with(b"\n");
        if dropped > 0 || torn_tail {
            ledger.compact().await?;
        }

        log::debug!(
            "Opened ledger {} with {} record(s)",
            ledger.path.display(),
            ledger.records.len()
        );
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Exact-match lookup of a successful record
    pub fn is_processed(&self, fingerprint: &Fingerprint) -> bool {
        self.records.contains_key(fingerprint)
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&ProcessedRecord> {
        self.records.get(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, oldest first
    pub fn records(&self) -> Vec<&ProcessedRecord> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_by(|a, b| {
            a.processed_at
                .cmp(&b.processed_at)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        records
    }

    /// Durably record a fingerprint as processed.
    ///
    /// Returns `false` without touching the file when the fingerprint is already
    /// recorded. The record is only visible through `is_processed` once it has
    /// been flushed to disk.
    pub async fn mark_processed(
        &mut self,
        fingerprint: &Fingerprint,
        processed_at: DateTime<Utc>,
        archive: Option<&str>,
    ) -> Result<bool> {
        if self.is_processed(fingerprint) {
            return Ok(false);
        }

        let record = ProcessedRecord {
            fingerprint: fingerprint.clone(),
            processed_at,
            outcome: RecordOutcome::Success,
            archive: archive.map(str::to_string),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let io_err = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        file.write_all(&line).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;

        self.records.insert(fingerprint.clone(), record);
        Ok(true)
    }

    /// Rewrite the file with only the readable records
    async fn compact(&mut self) -> Result<()> {
        let mut content = Vec::new();
        for record in self.records() {
            content.extend(serde_json::to_vec(record)?);
            content.push(b'\n');
        }

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || replace_file(&path, &content))
            .await
            .map_err(std::io::Error::other)
            .and_then(|written| written)
            .map_err(|source| LedgerError::Io {
                path: self.path.clone(),
                source,
            })?;

        log::info!(
            "Compacted ledger {} to {} record(s)",
            self.path.display(),
            self.records.len()
        );
        Ok(())
    }
}

/// Replace `path` with `content` through a synced temp file in the same folder
fn replace_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
