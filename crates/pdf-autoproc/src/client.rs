use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::work::ProcessingResult;
use std::future::Future;
use std::path::Path;

/// What a front-end needs from the pipeline.
///
/// Implemented directly by [`Pipeline`] and by channel-based adapters that
/// keep a user interface responsive while processing blocks on I/O.
pub trait PipelineClient: Send + Sync {
    /// Process one archive now, ignoring whether it was processed before
    fn process_one(&self, archive: &Path) -> impl Future<Output = ProcessingResult> + Send;

    /// Poll the inbox until a stop is requested
    fn run_forever(&self) -> impl Future<Output = Result<()>> + Send;

    fn request_stop(&self);

    /// Recent results, most recent first
    fn last_results(&self) -> Vec<ProcessingResult>;
}

impl PipelineClient for Pipeline {
    async fn process_one(&self, archive: &Path) -> ProcessingResult {
        Pipeline::process_one(self, archive).await
    }

    async fn run_forever(&self) -> Result<()> {
        Pipeline::run_forever(self).await
    }

    fn request_stop(&self) {
        Pipeline::request_stop(self)
    }

    fn last_results(&self) -> Vec<ProcessingResult> {
        Pipeline::last_results(self)
    }
}
