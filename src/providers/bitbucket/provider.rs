mod streaming;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};

use crate::auth::Token;
use crate::diagnostics::{
    LogStream, Pipeline, PipelineSource, PipelineSummary, Step, StepLog, TestCase,
    TestCaseReason, TestReport,
};
use crate::error::Result;

use super::client::BitbucketClient;
use super::links;

/// How often a followed log is re-read for new bytes.
pub const DEFAULT_LOG_POLL_INTERVAL: Duration = Duration::from_secs(2);

const TEST_SUITE_NAME: &str = "all tests";

/// Bitbucket Pipelines as a [`PipelineSource`].
///
/// Reads pipelines, steps, logs and test reports of one repository through
/// the Bitbucket Cloud REST API. Live logs are followed by re-reading the
/// step log with byte ranges until the step finishes.
pub struct BitbucketProvider {
    client: Arc<BitbucketClient>,
    pub workspace: String,
    pub repo: String,
    log_poll_interval: Duration,
}

impl BitbucketProvider {
    pub fn new(
        base_url: &str,
        workspace: String,
        repo: String,
        token: Option<Token>,
    ) -> Result<Self> {
        let client = BitbucketClient::new(base_url, &workspace, &repo, token)?;

        Ok(Self {
            client: Arc::new(client),
            workspace,
            repo,
            log_poll_interval: DEFAULT_LOG_POLL_INTERVAL,
        })
    }

    #[must_use]
    pub fn with_log_poll_interval(mut self, interval: Duration) -> Self {
        self.log_poll_interval = interval;
        self
    }

    pub fn pipeline_url(&self, ordinal: u64) -> String {
        links::pipeline_url(&self.workspace, &self.repo, ordinal)
    }

    pub fn step_url(&self, ordinal: u64, step_id: &str) -> String {
        links::step_url(&self.workspace, &self.repo, ordinal, step_id)
    }
}

#[async_trait]
impl PipelineSource for BitbucketProvider {
    async fn list_pipelines(&self, window: usize) -> Result<Vec<PipelineSummary>> {
        info!(
            "Listing the {window} most recent pipelines of {}/{}",
            self.workspace, self.repo
        );
        let pipelines = self.client.list_pipelines(window).await?;
        Ok(pipelines.iter().map(PipelineSummary::from).collect())
    }

    async fn get_pipeline(&self, pipeline_id: &str) -> Result<Pipeline> {
        Ok(self.client.get_pipeline(pipeline_id).await?.into())
    }

    async fn list_steps(&self, pipeline_id: &str) -> Result<Vec<Step>> {
        let steps = self.client.list_steps(pipeline_id).await?;
        Ok(steps.into_iter().map(Step::from).collect())
    }

    async fn get_step_log(&self, pipeline_id: &str, step_id: &str) -> Result<StepLog> {
        self.client.get_step_log(pipeline_id, step_id).await
    }

    async fn stream_step_log(&self, pipeline_id: &str, step_id: &str) -> Result<LogStream> {
        debug!("Starting log stream for step {step_id}");
        let (sender, stream) = LogStream::channel();

        tokio::spawn(streaming::produce(
            Arc::clone(&self.client),
            pipeline_id.to_string(),
            step_id.to_string(),
            self.log_poll_interval,
            sender,
        ));

        Ok(stream)
    }

    async fn get_test_reports(&self, pipeline_id: &str, step_id: &str) -> Result<Vec<TestReport>> {
        let report = self.client.get_test_report(pipeline_id, step_id).await?;
        Ok(report
            .map(|report| report.into_report(TEST_SUITE_NAME))
            .into_iter()
            .collect())
    }

    async fn get_test_cases(&self, pipeline_id: &str, step_id: &str) -> Result<Vec<TestCase>> {
        let cases = self.client.list_test_cases(pipeline_id, step_id).await?;
        Ok(cases.into_iter().map(TestCase::from).collect())
    }

    async fn get_test_case_reasons(
        &self,
        pipeline_id: &str,
        step_id: &str,
        case_id: &str,
    ) -> Result<Vec<TestCaseReason>> {
        let reasons = self
            .client
            .list_test_case_reasons(pipeline_id, step_id, case_id)
            .await?;
        Ok(reasons.into_iter().map(TestCaseReason::from).collect())
    }
}
