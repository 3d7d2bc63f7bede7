//! Scripted in-memory [`PipelineSource`] for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{PipeLensError, Result};

use super::model::{
    Pipeline, PipelineState, PipelineSummary, Status, Step, StepLog, Target, TestCase,
    TestCaseReason, TestReport, Timing,
};
use super::source::{LogStream, PipelineSource};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_pipelines: usize,
    pub get_pipeline: usize,
    pub list_steps: usize,
    pub get_step_log: usize,
    pub stream_step_log: usize,
    pub get_test_reports: usize,
    pub get_test_cases: usize,
    pub get_test_case_reasons: usize,
}

#[derive(Default)]
pub struct ScriptedSource {
    listing: Vec<PipelineSummary>,
    // Successive `get_pipeline` answers; the last one repeats. `None` is a
    // fetch failure.
    pipelines: Vec<Option<Pipeline>>,
    step_listings: Vec<Vec<Step>>,
    logs: HashMap<String, String>,
    failing_logs: HashSet<String>,
    streams: HashMap<String, (Vec<String>, Option<String>)>,
    test_reports: HashMap<String, Vec<TestReport>>,
    test_cases: HashMap<String, Vec<TestCase>>,
    failing_test_cases: HashSet<String>,
    reasons: HashMap<String, Vec<TestCaseReason>>,
    failing_reasons: HashSet<String>,
    calls: Mutex<CallCounts>,
    streamed: Mutex<Vec<String>>,
}

pub fn pipeline(id: &str, ordinal: u64, state: PipelineState) -> Pipeline {
    Pipeline {
        ordinal,
        id: id.to_string(),
        status: Status::new(state),
        timing: Timing::default(),
        target: Target {
            ref_name: Some("main".to_string()),
            commit: Some("abc1234".to_string()),
        },
    }
}

pub fn step(id: &str, name: &str, state: PipelineState) -> Step {
    Step {
        id: id.to_string(),
        name: name.to_string(),
        status: Status::new(state),
        timing: Timing::default(),
    }
}

pub fn failing_case(id: &str, name: &str) -> TestCase {
    TestCase {
        id: id.to_string(),
        name: name.to_string(),
        suite: Some("unit".to_string()),
        status: "FAILED".to_string(),
        duration_seconds: Some(0.1),
    }
}

fn scripted_failure(what: &str) -> PipeLensError {
    PipeLensError::Api {
        status: 500,
        message: format!("scripted {what} failure"),
    }
}

impl ScriptedSource {
    pub fn with_listing(mut self, entries: Vec<(u64, String, PipelineState)>) -> Self {
        self.listing = entries
            .into_iter()
            .map(|(ordinal, id, state)| PipelineSummary { ordinal, id, state })
            .collect();
        self
    }

    pub fn with_pipelines(mut self, pipelines: Vec<Pipeline>) -> Self {
        self.pipelines = pipelines.into_iter().map(Some).collect();
        self
    }

    /// Makes the `n`-th (0-based) `get_pipeline` call fail.
    pub fn with_pipeline_failure_at(mut self, n: usize) -> Self {
        let filler = self.pipelines.last().cloned().flatten();
        while self.pipelines.len() <= n {
            self.pipelines.push(filler.clone());
        }
        self.pipelines[n] = None;
        self
    }

    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.step_listings = vec![steps];
        self
    }

    pub fn with_step_listings(mut self, listings: Vec<Vec<Step>>) -> Self {
        self.step_listings = listings;
        self
    }

    pub fn with_log(mut self, step_id: &str, text: &str) -> Self {
        self.logs.insert(step_id.to_string(), text.to_string());
        self
    }

    pub fn with_failing_log(mut self, step_id: &str) -> Self {
        self.failing_logs.insert(step_id.to_string());
        self
    }

    pub fn with_stream(mut self, step_id: &str, lines: &[&str]) -> Self {
        self.streams.insert(
            step_id.to_string(),
            (lines.iter().map(ToString::to_string).collect(), None),
        );
        self
    }

    pub fn with_broken_stream(mut self, step_id: &str, lines: &[&str], error: &str) -> Self {
        self.streams.insert(
            step_id.to_string(),
            (
                lines.iter().map(ToString::to_string).collect(),
                Some(error.to_string()),
            ),
        );
        self
    }

    pub fn with_test_reports(mut self, step_id: &str, reports: Vec<TestReport>) -> Self {
        self.test_reports.insert(step_id.to_string(), reports);
        self
    }

    pub fn with_test_cases(mut self, step_id: &str, cases: Vec<TestCase>) -> Self {
        self.test_cases.insert(step_id.to_string(), cases);
        self
    }

    pub fn with_failing_test_cases(mut self, step_id: &str) -> Self {
        self.failing_test_cases.insert(step_id.to_string());
        self
    }

    pub fn with_reasons(mut self, case_id: &str, messages: Vec<&str>) -> Self {
        self.reasons.insert(
            case_id.to_string(),
            messages
                .into_iter()
                .map(|message| TestCaseReason {
                    message: message.to_string(),
                    detail: None,
                })
                .collect(),
        );
        self
    }

    pub fn with_failing_reasons(mut self, case_id: &str) -> Self {
        self.failing_reasons.insert(case_id.to_string());
        self
    }

    pub fn calls(&self) -> CallCounts {
        *self.calls.lock().unwrap()
    }

    /// Step ids in the order their streams were opened.
    pub fn streamed_steps(&self) -> Vec<String> {
        self.streamed.lock().unwrap().clone()
    }

    fn count(&self, bump: impl FnOnce(&mut CallCounts) -> &mut usize) -> usize {
        let mut calls = self.calls.lock().unwrap();
        let counter = bump(&mut calls);
        *counter += 1;
        *counter - 1
    }
}

#[async_trait]
impl PipelineSource for ScriptedSource {
    async fn list_pipelines(&self, window: usize) -> Result<Vec<PipelineSummary>> {
        self.count(|c| &mut c.list_pipelines);
        Ok(self.listing.iter().take(window).cloned().collect())
    }

    async fn get_pipeline(&self, pipeline_id: &str) -> Result<Pipeline> {
        let call = self.count(|c| &mut c.get_pipeline);
        let index = call.min(self.pipelines.len().saturating_sub(1));
        match self.pipelines.get(index) {
            Some(Some(pipeline)) => Ok(pipeline.clone()),
            Some(None) => Err(scripted_failure("pipeline fetch")),
            None => Err(PipeLensError::Api {
                status: 404,
                message: format!("pipeline {pipeline_id} not found"),
            }),
        }
    }

    async fn list_steps(&self, _pipeline_id: &str) -> Result<Vec<Step>> {
        let call = self.count(|c| &mut c.list_steps);
        let index = call.min(self.step_listings.len().saturating_sub(1));
        Ok(self.step_listings.get(index).cloned().unwrap_or_default())
    }

    async fn get_step_log(&self, _pipeline_id: &str, step_id: &str) -> Result<StepLog> {
        self.count(|c| &mut c.get_step_log);
        if self.failing_logs.contains(step_id) {
            return Err(scripted_failure("log fetch"));
        }
        Ok(match self.logs.get(step_id) {
            Some(text) => StepLog::Available(text.clone()),
            None => StepLog::Unavailable(format!("no log for step {step_id}")),
        })
    }

    async fn stream_step_log(&self, _pipeline_id: &str, step_id: &str) -> Result<LogStream> {
        self.count(|c| &mut c.stream_step_log);
        self.streamed.lock().unwrap().push(step_id.to_string());

        let (lines, error) = self.streams.get(step_id).cloned().unwrap_or_default();
        let (sender, stream) = LogStream::channel();

        tokio::spawn(async move {
            for line in lines {
                if sender.lines.send(line).await.is_err() {
                    return;
                }
            }
            drop(sender.lines);
            let outcome = match error {
                Some(message) => Err(PipeLensError::Stream(message)),
                None => Ok(()),
            };
            let _ = sender.done.send(outcome);
        });

        Ok(stream)
    }

    async fn get_test_reports(&self, _pipeline_id: &str, step_id: &str) -> Result<Vec<TestReport>> {
        self.count(|c| &mut c.get_test_reports);
        Ok(self.test_reports.get(step_id).cloned().unwrap_or_default())
    }

    async fn get_test_cases(&self, _pipeline_id: &str, step_id: &str) -> Result<Vec<TestCase>> {
        self.count(|c| &mut c.get_test_cases);
        if self.failing_test_cases.contains(step_id) {
            return Err(scripted_failure("test case listing"));
        }
        Ok(self.test_cases.get(step_id).cloned().unwrap_or_default())
    }

    async fn get_test_case_reasons(
        &self,
        _pipeline_id: &str,
        _step_id: &str,
        case_id: &str,
    ) -> Result<Vec<TestCaseReason>> {
        self.count(|c| &mut c.get_test_case_reasons);
        if self.failing_reasons.contains(case_id) {
            return Err(scripted_failure("test case reasons"));
        }
        Ok(self.reasons.get(case_id).cloned().unwrap_or_default())
    }
}
