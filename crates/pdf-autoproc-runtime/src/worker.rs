use crate::{PipelineCommand, PipelineUpdate};
use pdf_autoproc::{Pipeline, PipelineEvent};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Async worker task that runs pipeline commands and sends updates
pub async fn worker_task(
    pipeline: Arc<Pipeline>,
    mut command_rx: mpsc::UnboundedReceiver<PipelineCommand>,
    update_tx: mpsc::UnboundedSender<PipelineUpdate>,
) {
    let forwarder = tokio::spawn(forward_events(pipeline.subscribe(), update_tx.clone()));

    while let Some(cmd) = command_rx.recv().await {
        if !process_command(cmd, &pipeline, &mut command_rx, &update_tx).await {
            break;
        }
    }

    forwarder.abort();
    log::debug!("Pipeline worker stopped");
    let _ = update_tx.send(PipelineUpdate::WorkerStopped);
}

/// Handle one command; returns `false` once the worker should exit
async fn process_command(
    cmd: PipelineCommand,
    pipeline: &Pipeline,
    command_rx: &mut mpsc::UnboundedReceiver<PipelineCommand>,
    update_tx: &mpsc::UnboundedSender<PipelineUpdate>,
) -> bool {
    match cmd {
        PipelineCommand::ProcessOne { archive, reply } => {
            let result = pipeline.process_one(&archive).await;
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        }
        PipelineCommand::RunCycle => {
            // Collapse queued cycle requests into this one
            let mut deferred = Vec::new();
            while let Ok(next_cmd) = command_rx.try_recv() {
                if let PipelineCommand::RunCycle = next_cmd {
                    log::debug!("Discarding queued cycle request");
                } else {
                    deferred.push(next_cmd);
                }
            }

            match pipeline.run_cycle().await {
                Ok(report) => {
                    let _ = update_tx.send(PipelineUpdate::CycleComplete { report });
                }
                Err(e) => {
                    let _ = update_tx.send(PipelineUpdate::Error {
                        message: format!("Poll cycle failed: {}", e),
                    });
                }
            }

            for next_cmd in deferred {
                if !Box::pin(process_command(next_cmd, pipeline, command_rx, update_tx)).await {
                    return false;
                }
            }
        }
        PipelineCommand::RunForever { reply } => {
            let outcome = pipeline.run_forever().await;
            if let Err(e) = &outcome {
                let _ = update_tx.send(PipelineUpdate::Error {
                    message: format!("Watch loop failed: {}", e),
                });
            }
            if let Some(reply) = reply {
                let _ = reply.send(outcome);
            }
        }
        PipelineCommand::Scan => match pipeline.pending_archives().await {
            Ok(items) => {
                let archives = items.into_iter().map(|item| item.source_path).collect();
                let _ = update_tx.send(PipelineUpdate::Pending { archives });
            }
            Err(e) => {
                let _ = update_tx.send(PipelineUpdate::Error {
                    message: format!("Failed to scan inbox: {}", e),
                });
            }
        },
        PipelineCommand::CleanScratch => match pipeline.clean_scratch().await {
            Ok(removed) => {
                let _ = update_tx.send(PipelineUpdate::ScratchCleaned { removed });
            }
            Err(e) => {
                let _ = update_tx.send(PipelineUpdate::Error {
                    message: format!("Failed to clean scratch: {}", e),
                });
            }
        },
        PipelineCommand::Shutdown => return false,
    }
    true
}

async fn forward_events(
    mut events: broadcast::Receiver<PipelineEvent>,
    update_tx: mpsc::UnboundedSender<PipelineUpdate>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if update_tx.send(PipelineUpdate::Event(event)).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                log::warn!("Front-end fell behind; dropped {} pipeline event(s)", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
