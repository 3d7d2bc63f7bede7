use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::model::{TestCase, TestCaseReason, TestReport};
use super::source::PipelineSource;

pub const NO_DIAGNOSTIC_DATA: &str = "no diagnostic data available";

/// A failing test case with whatever failure narrative could be fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTestCase {
    #[serde(flatten)]
    pub case: TestCase,
    pub reasons: Vec<TestCaseReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestDiagnostics {
    pub reports: Vec<TestReport>,
    pub failed_cases: Vec<FailedTestCase>,
    /// Detail that could not be retrieved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl TestDiagnostics {
    pub fn total_failures(&self) -> u64 {
        self.reports.iter().map(TestReport::failures).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.total_failures() > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackOutcome {
    Tests(TestDiagnostics),
    NoData(String),
}

/// Structured test results as a substitute for raw logs.
///
/// Never fails: missing or unreachable data ends up as notes or as
/// [`FallbackOutcome::NoData`].
pub struct TestResultFallback<'a, S: PipelineSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: PipelineSource + ?Sized> TestResultFallback<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    pub async fn collect(&self, pipeline_id: &str, step_id: &str) -> FallbackOutcome {
        let reports = match self.source.get_test_reports(pipeline_id, step_id).await {
            Ok(reports) => reports,
            Err(e) if e.is_unavailable() => {
                debug!("No test reports for step {step_id}: {e}");
                return FallbackOutcome::NoData(NO_DIAGNOSTIC_DATA.to_string());
            }
            Err(e) => {
                warn!("Failed to fetch test reports for step {step_id}: {e}");
                return FallbackOutcome::NoData(format!("{NO_DIAGNOSTIC_DATA} ({e})"));
            }
        };

        if reports.is_empty() {
            return FallbackOutcome::NoData(NO_DIAGNOSTIC_DATA.to_string());
        }

        let mut diagnostics = TestDiagnostics {
            reports,
            ..TestDiagnostics::default()
        };

        if !diagnostics.has_failures() {
            return FallbackOutcome::Tests(diagnostics);
        }

        info!(
            "Step {step_id} has {} failing tests, fetching test case detail",
            diagnostics.total_failures()
        );

        let cases = match self.source.get_test_cases(pipeline_id, step_id).await {
            Ok(cases) => cases,
            Err(e) => {
                warn!("Failed to fetch test cases for step {step_id}: {e}");
                diagnostics
                    .notes
                    .push(format!("test case detail unavailable: {e}"));
                return FallbackOutcome::Tests(diagnostics);
            }
        };

        let failing: Vec<TestCase> = cases.into_iter().filter(TestCase::is_failure).collect();

        let reasons = join_all(failing.iter().map(|case| {
            self.source
                .get_test_case_reasons(pipeline_id, step_id, &case.id)
        }))
        .await;

        diagnostics.failed_cases = failing
            .into_iter()
            .zip(reasons)
            .map(|(case, reasons)| match reasons {
                Ok(reasons) => FailedTestCase {
                    case,
                    reasons,
                    note: None,
                },
                Err(e) => {
                    warn!("Failed to fetch failure reasons for test {}: {e}", case.name);
                    FailedTestCase {
                        case,
                        reasons: Vec::new(),
                        note: Some(format!("failure reasons unavailable: {e}")),
                    }
                }
            })
            .collect();

        FallbackOutcome::Tests(diagnostics)
    }
}
