use chrono::{DateTime, Utc};
use log::warn;
use serde::Deserialize;

use crate::diagnostics::{
    Pipeline, PipelineState, PipelineSummary, Status, Step, Target, TestCase, TestCaseReason,
    TestReport, Timing,
};

/// Bitbucket's paginated collection envelope.
#[derive(Debug, Deserialize)]
pub struct Paginated<T> {
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Named {
    pub name: String,
}

/// `state` object shared by pipelines and steps, e.g.
/// `{"name": "COMPLETED", "result": {"name": "FAILED"}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StateDto {
    pub name: String,
    pub result: Option<Named>,
}

impl StateDto {
    pub fn to_status(&self) -> Status {
        let result = self.result.as_ref().map(|result| result.name.clone());
        Status {
            state: map_state(&self.name, result.as_deref()),
            result,
        }
    }
}

/// Maps a Bitbucket state/result pair to a [`PipelineState`].
///
/// Unknown completed results are treated as errors so that a watch session
/// still terminates.
pub fn map_state(name: &str, result: Option<&str>) -> PipelineState {
    match name.to_ascii_uppercase().as_str() {
        "PENDING" | "PARSING" | "READY" => PipelineState::Pending,
        "IN_PROGRESS" | "RUNNING" => PipelineState::InProgress,
        "COMPLETED" => match result.map(str::to_ascii_uppercase).as_deref() {
            Some("SUCCESSFUL") => PipelineState::Successful,
            Some("FAILED") => PipelineState::Failed,
            Some("ERROR") => PipelineState::Error,
            Some("STOPPED" | "EXPIRED") => PipelineState::Stopped,
            other => {
                warn!("Unknown pipeline result {other:?}, treating it as an error");
                PipelineState::Error
            }
        },
        "HALTED" | "PAUSED" => PipelineState::Stopped,
        other => {
            warn!("Unknown pipeline state '{other}', treating it as an error");
            PipelineState::Error
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDto {
    pub hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetDto {
    pub ref_name: Option<String>,
    pub commit: Option<CommitDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineDto {
    pub uuid: String,
    pub build_number: u64,
    pub state: StateDto,
    pub created_on: Option<DateTime<Utc>>,
    pub completed_on: Option<DateTime<Utc>>,
    pub duration_in_seconds: Option<u64>,
    pub target: Option<TargetDto>,
}

impl From<PipelineDto> for Pipeline {
    fn from(dto: PipelineDto) -> Self {
        let target = dto.target.map_or_else(Target::default, |target| Target {
            ref_name: target.ref_name,
            commit: target.commit.map(|commit| commit.hash),
        });

        Self {
            ordinal: dto.build_number,
            status: dto.state.to_status(),
            timing: Timing {
                created_on: dto.created_on,
                started_on: None,
                completed_on: dto.completed_on,
                duration_seconds: dto.duration_in_seconds,
            },
            target,
            id: dto.uuid,
        }
    }
}

impl From<&PipelineDto> for PipelineSummary {
    fn from(dto: &PipelineDto) -> Self {
        Self {
            ordinal: dto.build_number,
            id: dto.uuid.clone(),
            state: dto.state.to_status().state,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepDto {
    pub uuid: String,
    pub name: Option<String>,
    pub state: StateDto,
    pub started_on: Option<DateTime<Utc>>,
    pub completed_on: Option<DateTime<Utc>>,
    pub duration_in_seconds: Option<u64>,
}

impl From<StepDto> for Step {
    fn from(dto: StepDto) -> Self {
        Self {
            name: dto.name.unwrap_or_else(|| dto.uuid.clone()),
            status: dto.state.to_status(),
            timing: Timing {
                created_on: None,
                started_on: dto.started_on,
                completed_on: dto.completed_on,
                duration_seconds: dto.duration_in_seconds,
            },
            id: dto.uuid,
        }
    }
}

/// Per-step test report summary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TestReportDto {
    pub number_of_test_cases: u64,
    pub number_of_successful_test_cases: u64,
    pub number_of_failed_test_cases: u64,
    pub number_of_error_test_cases: u64,
    pub number_of_skipped_test_cases: u64,
}

impl TestReportDto {
    pub fn into_report(self, suite: &str) -> TestReport {
        TestReport {
            suite: suite.to_string(),
            total: self.number_of_test_cases,
            passed: self.number_of_successful_test_cases,
            failed: self.number_of_failed_test_cases,
            skipped: self.number_of_skipped_test_cases,
            errored: self.number_of_error_test_cases,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestCaseDto {
    pub uuid: String,
    pub name: String,
    pub package_name: Option<String>,
    pub status: String,
    pub duration_in_seconds: Option<f64>,
}

impl From<TestCaseDto> for TestCase {
    fn from(dto: TestCaseDto) -> Self {
        Self {
            id: dto.uuid,
            name: dto.name,
            suite: dto.package_name,
            status: dto.status,
            duration_seconds: dto.duration_in_seconds,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestCaseReasonDto {
    pub message: Option<String>,
    pub stack_trace: Option<String>,
}

impl From<TestCaseReasonDto> for TestCaseReason {
    fn from(dto: TestCaseReasonDto) -> Self {
        Self {
            message: dto.message.unwrap_or_default(),
            detail: dto.stack_trace,
        }
    }
}
