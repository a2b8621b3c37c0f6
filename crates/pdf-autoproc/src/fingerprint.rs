use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Content fingerprint of an archive: SHA-256 of its bytes, lowercase hex.
///
/// Content hashing means a renamed or re-copied archive is still recognized,
/// while an archive replaced under the same name is processed again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self::from_digest(Sha256::digest(bytes).as_slice())
    }

    /// Hash a file without loading it into memory at once
    pub async fn of_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut file = std::fs::File::open(&path)
                .map_err(|e| PipelineError::io("opening archive", &path, e))?;
            let mut hasher = Sha256::new();
            std::io::copy(&mut file, &mut hasher)
                .map_err(|e| PipelineError::io("reading archive", &path, e))?;
            Ok(Self::from_digest(hasher.finalize().as_slice()))
        })
        .await?
    }

    fn from_digest(digest: &[u8]) -> Self {
        Fingerprint(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for folder names and log lines.
    ///
    /// Values read back from a hand-edited ledger may not be hex; those are
    /// returned whole when 12 bytes do not end on a character boundary.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
