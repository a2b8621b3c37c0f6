//! Print capability

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Placeholder replaced by the document path in print command arguments
pub const FILE_PLACEHOLDER: &str = "{file}";

/// Sends a persisted document to a printer
#[async_trait]
pub trait Printer: Send + Sync {
    async fn print_document(&self, path: &Path) -> Result<()>;
}

/// Runs an external command per document, e.g. `lp -d office {file}`
#[derive(Debug, Clone)]
pub struct CommandPrinter {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandPrinter {
    pub fn new(command: &[String], timeout: Duration) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .filter(|(program, _)| !program.trim().is_empty())
            .ok_or_else(|| PipelineError::Configuration("print_command is empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    fn arguments(&self, path: &Path) -> Vec<String> {
        let file = path.to_string_lossy();
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(FILE_PLACEHOLDER, &file))
            .collect();
        if !self.args.iter().any(|arg| arg.contains(FILE_PLACEHOLDER)) {
            args.push(file.into_owned());
        }
        args
    }
}

#[async_trait]
impl Printer for CommandPrinter {
    async fn print_document(&self, path: &Path) -> Result<()> {
        let failure = |message: String, retryable: bool| PipelineError::Print {
            path: path.to_path_buf(),
            message,
            retryable,
        };

        let mut child = Command::new(&self.program)
            .args(self.arguments(path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                // A missing program will not appear between attempts
                let retryable = e.kind() != std::io::ErrorKind::NotFound;
                failure(format!("cannot start {}: {}", self.program, e), retryable)
            })?;

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(failure(format!("{} exited with {}", self.program, status), true)),
            Ok(Err(e)) => Err(failure(format!("cannot wait for {}: {}", self.program, e), true)),
            Err(_) => {
                // Reap the process now rather than leaving it to the drop
                let _ = child.kill().await;
                Err(failure(
                    format!("{} timed out after {:?}", self.program, self.timeout),
                    true,
                ))
            }
        }
    }
}

/// Printer used when printing is enabled without a command: logs and succeeds
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPrinter;

#[async_trait]
impl Printer for LogPrinter {
    async fn print_document(&self, path: &Path) -> Result<()> {
        log::warn!(
            "No print command configured; not printing {}",
            path.display()
        );
        Ok(())
    }
}
