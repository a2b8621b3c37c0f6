//! Channel front-end for the processing pipeline.
//!
//! A user interface sends [`PipelineCommand`]s to a background worker that owns
//! the [`Pipeline`] and receives [`PipelineUpdate`]s back, so it never blocks on
//! archive processing.

use std::path::PathBuf;
use tokio::sync::oneshot;

mod client;
mod worker;

pub use client::{WorkerClient, spawn_worker};
pub use worker::worker_task;

// Re-export types from the pipeline crate
pub use pdf_autoproc::{
    CycleReport, Pipeline, PipelineClient, PipelineError, PipelineEvent, ProcessingResult, Stage,
};

/// Commands sent from the front-end to the worker
#[derive(Debug)]
pub enum PipelineCommand {
    /// Process one archive now, replying with its result
    ProcessOne {
        archive: PathBuf,
        reply: Option<oneshot::Sender<ProcessingResult>>,
    },
    /// Run a single poll cycle
    RunCycle,
    /// Poll until a stop is requested; the worker handles nothing else meanwhile
    RunForever {
        reply: Option<oneshot::Sender<pdf_autoproc::Result<()>>>,
    },
    /// List archives waiting in the inbox
    Scan,
    CleanScratch,
    Shutdown,
}

/// Updates sent from the worker to the front-end
#[derive(Debug, Clone)]
pub enum PipelineUpdate {
    /// Progress forwarded from the pipeline
    Event(PipelineEvent),
    CycleComplete {
        report: CycleReport,
    },
    Pending {
        archives: Vec<PathBuf>,
    },
    ScratchCleaned {
        removed: usize,
    },
    Error {
        message: String,
    },
    WorkerStopped,
}
