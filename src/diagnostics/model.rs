use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution state of a pipeline or a step.
///
/// `Pending` and `InProgress` are the only watchable states; everything else
/// is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Pending,
    InProgress,
    Successful,
    Failed,
    Error,
    Stopped,
}

pub type StepState = PipelineState;

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::InProgress)
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Pending => "⏳",
            Self::InProgress => "🔄",
            Self::Successful => "✅",
            Self::Failed => "❌",
            Self::Error => "⚠️",
            Self::Stopped => "⏹️",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State plus the raw provider result name, once execution has completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub state: PipelineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl Status {
    pub fn new(state: PipelineState) -> Self {
        Self {
            state,
            result: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub created_on: Option<DateTime<Utc>>,
    pub started_on: Option<DateTime<Utc>>,
    pub completed_on: Option<DateTime<Utc>>,
    pub duration_seconds: Option<u64>,
}

impl Timing {
    /// Elapsed seconds: the reported duration when present, otherwise the
    /// distance from start (or creation) to completion (or `now`).
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        if let Some(duration) = self.duration_seconds {
            return duration;
        }
        let Some(start) = self.started_on.or(self.created_on) else {
            return 0;
        };
        let end = self.completed_on.unwrap_or(now);
        u64::try_from((end - start).num_seconds()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub ref_name: Option<String>,
    pub commit: Option<String>,
}

/// Entry of the recent-pipelines listing used for ordinal lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub ordinal: u64,
    pub id: String,
    pub state: PipelineState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub ordinal: u64,
    pub id: String,
    pub status: Status,
    pub timing: Timing,
    pub target: Target,
}

impl Pipeline {
    pub fn state(&self) -> PipelineState {
        self.status.state
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub status: Status,
    pub timing: Timing,
}

impl Step {
    pub fn state(&self) -> StepState {
        self.status.state
    }
}

/// Result of a one-shot log fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepLog {
    Available(String),
    Unavailable(String),
}

/// Test-report summary for one suite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub suite: String,
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub errored: u64,
}

impl TestReport {
    pub fn failures(&self) -> u64 {
        self.failed + self.errored
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub name: String,
    pub suite: Option<String>,
    pub status: String,
    pub duration_seconds: Option<f64>,
}

impl TestCase {
    pub fn is_failure(&self) -> bool {
        matches!(
            self.status.to_ascii_uppercase().as_str(),
            "FAILED" | "FAILURE" | "ERROR" | "ERRORED"
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseReason {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
