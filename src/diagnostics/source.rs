use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;

use super::model::{
    Pipeline, PipelineSummary, Step, StepLog, TestCase, TestCaseReason, TestReport,
};

/// Capacity of the line channel between a log producer and its consumer.
pub const LOG_STREAM_CAPACITY: usize = 1024;

/// A live step log: lines arrive on `lines`, and `done` resolves once the
/// producer has finished, carrying the error if it stopped early.
pub struct LogStream {
    pub lines: mpsc::Receiver<String>,
    pub done: oneshot::Receiver<Result<()>>,
}

/// Producer half of a [`LogStream`].
pub struct LogStreamSender {
    pub lines: mpsc::Sender<String>,
    pub done: oneshot::Sender<Result<()>>,
}

impl LogStream {
    pub fn channel() -> (LogStreamSender, LogStream) {
        let (line_tx, line_rx) = mpsc::channel(LOG_STREAM_CAPACITY);
        let (done_tx, done_rx) = oneshot::channel();
        (
            LogStreamSender {
                lines: line_tx,
                done: done_tx,
            },
            LogStream {
                lines: line_rx,
                done: done_rx,
            },
        )
    }
}

/// Read access to a hosted pipeline service.
///
/// The diagnostics engine only talks to the service through this trait.
#[async_trait]
pub trait PipelineSource: Send + Sync {
    /// Most recent pipelines, newest first, at most `window` entries.
    async fn list_pipelines(&self, window: usize) -> Result<Vec<PipelineSummary>>;

    async fn get_pipeline(&self, pipeline_id: &str) -> Result<Pipeline>;

    async fn list_steps(&self, pipeline_id: &str) -> Result<Vec<Step>>;

    async fn get_step_log(&self, pipeline_id: &str, step_id: &str) -> Result<StepLog>;

    async fn stream_step_log(&self, pipeline_id: &str, step_id: &str) -> Result<LogStream>;

    async fn get_test_reports(&self, pipeline_id: &str, step_id: &str)
        -> Result<Vec<TestReport>>;

    async fn get_test_cases(&self, pipeline_id: &str, step_id: &str) -> Result<Vec<TestCase>>;

    async fn get_test_case_reasons(
        &self,
        pipeline_id: &str,
        step_id: &str,
        case_id: &str,
    ) -> Result<Vec<TestCaseReason>>;
}
