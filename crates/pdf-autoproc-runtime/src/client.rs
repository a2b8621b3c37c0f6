use crate::{PipelineCommand, PipelineUpdate, worker_task};
use pdf_autoproc::{
    Pipeline, PipelineClient, PipelineError, ProcessingResult, Result, ResultLog, StopHandle,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Front-end handle to a pipeline running on a background worker.
///
/// Stop requests and result snapshots bypass the command queue, so they work
/// while the worker is busy inside `run_forever`.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    commands: mpsc::UnboundedSender<PipelineCommand>,
    stop: StopHandle,
    results: ResultLog,
}

/// Move `pipeline` onto a worker task.
///
/// Returns the client, the update stream and the worker's join handle.
pub fn spawn_worker(
    pipeline: Pipeline,
) -> (
    WorkerClient,
    mpsc::UnboundedReceiver<PipelineUpdate>,
    JoinHandle<()>,
) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (update_tx, update_rx) = mpsc::unbounded_channel();

    let client = WorkerClient {
        commands: command_tx,
        stop: pipeline.stop_handle(),
        results: pipeline.result_log(),
    };
    let handle = tokio::spawn(worker_task(Arc::new(pipeline), command_rx, update_tx));
    (client, update_rx, handle)
}

impl WorkerClient {
    /// Queue a command; returns `false` if the worker has exited
    pub fn send(&self, command: PipelineCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn run_cycle(&self) -> bool {
        self.send(PipelineCommand::RunCycle)
    }

    pub fn scan(&self) -> bool {
        self.send(PipelineCommand::Scan)
    }

    pub fn clean_scratch(&self) -> bool {
        self.send(PipelineCommand::CleanScratch)
    }

    /// Ask the worker to exit after the current command
    pub fn shutdown(&self) {
        self.stop.request_stop();
        let _ = self.commands.send(PipelineCommand::Shutdown);
    }
}

impl PipelineClient for WorkerClient {
    async fn process_one(&self, archive: &Path) -> ProcessingResult {
        let (reply, response) = oneshot::channel();
        // A refused command drops the reply sender, which ends the wait below
        self.send(PipelineCommand::ProcessOne {
            archive: archive.to_path_buf(),
            reply: Some(reply),
        });
        response.await.unwrap_or_else(|_| {
            ProcessingResult::failure(archive, None, Vec::new(), &PipelineError::WorkerStopped)
        })
    }

    async fn run_forever(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        if !self.send(PipelineCommand::RunForever { reply: Some(reply) }) {
            return Err(PipelineError::WorkerStopped);
        }
        response.await.unwrap_or(Err(PipelineError::WorkerStopped))
    }

    fn request_stop(&self) {
        self.stop.request_stop();
    }

    fn last_results(&self) -> Vec<ProcessingResult> {
        self.results.snapshot()
    }
}
