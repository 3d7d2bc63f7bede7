use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{PipeLensError, Result};

use super::analyzer::{AnalyzerOptions, LogAnalysisResult, LogAnalyzer, DEFAULT_CONTEXT_LINES};
use super::fallback::{FallbackOutcome, TestDiagnostics, TestResultFallback};
use super::model::{Pipeline, Step, StepLog};
use super::patterns::PatternTable;
use super::source::PipelineSource;
use super::step_filter::{filter_steps, select_step};

/// What could be learned about one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum StepDiagnosis {
    Log {
        analysis: LogAnalysisResult,
    },
    Tests {
        tests: TestDiagnostics,
        #[serde(skip_serializing_if = "Option::is_none")]
        log_note: Option<String>,
    },
    NoData {
        note: String,
    },
}

impl StepDiagnosis {
    pub fn has_errors(&self) -> bool {
        match self {
            Self::Log { analysis } => analysis.has_errors(),
            Self::Tests { tests, .. } => tests.has_failures(),
            Self::NoData { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: Step,
    pub diagnosis: StepDiagnosis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisReport {
    pub pipeline: Pipeline,
    pub steps: Vec<StepReport>,
    pub generated_at: DateTime<Utc>,
}

impl DiagnosisReport {
    pub fn has_errors(&self) -> bool {
        self.steps.iter().any(|report| report.diagnosis.has_errors())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnoseOptions {
    pub step: Option<String>,
    pub failed_only: bool,
    pub errors_only: bool,
    pub context_lines: usize,
}

impl Default for DiagnoseOptions {
    fn default() -> Self {
        Self {
            step: None,
            failed_only: false,
            errors_only: false,
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }
}

impl DiagnoseOptions {
    fn analyzer_options(&self) -> AnalyzerOptions {
        AnalyzerOptions {
            context_lines: self.context_lines,
            record_warnings: !self.errors_only,
        }
    }
}

/// One-shot diagnosis of a pipeline: steps are fetched once and each
/// selected step is analyzed independently.
///
/// Per-step failures never abort the report; only the pipeline and step
/// listings are required.
pub struct Diagnoser<'a, S: PipelineSource + ?Sized> {
    source: &'a S,
    table: &'a PatternTable,
}

impl<'a, S: PipelineSource + ?Sized> Diagnoser<'a, S> {
    pub fn new(source: &'a S, table: &'a PatternTable) -> Self {
        Self { source, table }
    }

    /// Analyzes step logs, falling back to test reports when a log can't be
    /// fetched.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline or its step listing cannot be
    /// fetched, or if the step filter matches nothing.
    pub async fn diagnose(
        &self,
        pipeline_id: &str,
        options: &DiagnoseOptions,
    ) -> Result<DiagnosisReport> {
        let (pipeline, steps) = self.fetch(pipeline_id, options).await?;

        info!("Analyzing {} steps of pipeline #{}", steps.len(), pipeline.ordinal);

        let diagnoses = join_all(
            steps
                .iter()
                .map(|step| self.diagnose_step(pipeline_id, step, options)),
        )
        .await;

        Ok(Self::assemble(pipeline, steps, diagnoses))
    }

    /// Test reports only, skipping log analysis.
    ///
    /// # Errors
    ///
    /// Same as [`diagnose`](Self::diagnose).
    pub async fn test_results(
        &self,
        pipeline_id: &str,
        options: &DiagnoseOptions,
    ) -> Result<DiagnosisReport> {
        let (pipeline, steps) = self.fetch(pipeline_id, options).await?;
        let fallback = TestResultFallback::new(self.source);

        let diagnoses = join_all(steps.iter().map(|step| async {
            match fallback.collect(pipeline_id, &step.id).await {
                FallbackOutcome::Tests(tests) => StepDiagnosis::Tests {
                    tests,
                    log_note: None,
                },
                FallbackOutcome::NoData(note) => StepDiagnosis::NoData { note },
            }
        }))
        .await;

        Ok(Self::assemble(pipeline, steps, diagnoses))
    }

    pub async fn diagnose_step(
        &self,
        pipeline_id: &str,
        step: &Step,
        options: &DiagnoseOptions,
    ) -> StepDiagnosis {
        let log_note = match self.source.get_step_log(pipeline_id, &step.id).await {
            Ok(StepLog::Available(text)) => {
                let analysis =
                    LogAnalyzer::analyze_text(self.table, &text, options.analyzer_options());
                let analysis = if options.errors_only {
                    analysis.filter_errors_only()
                } else {
                    analysis
                };
                return StepDiagnosis::Log { analysis };
            }
            Ok(StepLog::Unavailable(reason)) => reason,
            Err(e) => {
                warn!("Failed to fetch log for step '{}': {e}", step.name);
                format!("log fetch failed: {e}")
            }
        };

        info!(
            "Log unavailable for step '{}', falling back to test reports",
            step.name
        );

        match TestResultFallback::new(self.source)
            .collect(pipeline_id, &step.id)
            .await
        {
            FallbackOutcome::Tests(tests) => StepDiagnosis::Tests {
                tests,
                log_note: Some(log_note),
            },
            FallbackOutcome::NoData(note) => StepDiagnosis::NoData { note },
        }
    }

    async fn fetch(
        &self,
        pipeline_id: &str,
        options: &DiagnoseOptions,
    ) -> Result<(Pipeline, Vec<Step>)> {
        let pipeline = self.source.get_pipeline(pipeline_id).await?;
        let steps = self.source.list_steps(pipeline_id).await?;

        if let Some(filter) = options.step.as_deref() {
            if select_step(&steps, filter).is_none() {
                return Err(PipeLensError::StepNotFound {
                    filter: filter.to_string(),
                    available: steps
                        .iter()
                        .map(|step| step.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
        }

        let selected = filter_steps(&steps, options.step.as_deref(), options.failed_only)
            .into_iter()
            .cloned()
            .collect();

        Ok((pipeline, selected))
    }

    fn assemble(
        pipeline: Pipeline,
        steps: Vec<Step>,
        diagnoses: Vec<StepDiagnosis>,
    ) -> DiagnosisReport {
        DiagnosisReport {
            pipeline,
            steps: steps
                .into_iter()
                .zip(diagnoses)
                .map(|(step, diagnosis)| StepReport { step, diagnosis })
                .collect(),
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::model::{PipelineState, TestReport};
    use crate::diagnostics::testing::{pipeline, step, ScriptedSource};

    fn source() -> ScriptedSource {
        ScriptedSource::default()
            .with_pipelines(vec![pipeline("{p}", 7, PipelineState::Failed)])
            .with_steps(vec![
                step("{lint}", "Lint", PipelineState::Successful),
                step("{test}", "Unit tests", PipelineState::Failed),
            ])
    }

    #[tokio::test]
    async fn analyzes_each_step_log() {
        let source = source()
            .with_log("{lint}", "INFO: lint ok\nwarning: deprecated rule\n")
            .with_log("{test}", "INFO: start\nerror: compile failed\nINFO: done\n");
        let table = PatternTable::builtin();

        let report = Diagnoser::new(&source, &table)
            .diagnose("{p}", &DiagnoseOptions::default())
            .await
            .unwrap();

        assert_eq!(report.steps.len(), 2);
        assert!(report.has_errors());

        let StepDiagnosis::Log { analysis } = &report.steps[1].diagnosis else {
            panic!("expected log analysis");
        };
        assert_eq!(analysis.error_count, 1);
        assert_eq!(analysis.errors[0].line_number, 2);

        let StepDiagnosis::Log { analysis } = &report.steps[0].diagnosis else {
            panic!("expected log analysis");
        };
        assert_eq!(analysis.warning_count, 1);
        // Warnings are listed unless errors-only is requested.
        assert_eq!(analysis.errors.len(), 1);
    }

    #[tokio::test]
    async fn errors_only_drops_warning_entries() {
        let source = source().with_log("{lint}", "warning: deprecated rule\n");
        let table = PatternTable::builtin();
        let options = DiagnoseOptions {
            step: Some("lint".into()),
            errors_only: true,
            ..DiagnoseOptions::default()
        };

        let report = Diagnoser::new(&source, &table)
            .diagnose("{p}", &options)
            .await
            .unwrap();

        let StepDiagnosis::Log { analysis } = &report.steps[0].diagnosis else {
            panic!("expected log analysis");
        };
        assert_eq!(analysis.warning_count, 1);
        assert!(analysis.errors.is_empty());
    }

    #[tokio::test]
    async fn failed_log_with_passing_tests_reports_no_errors() {
        let source = source().with_failing_log("{test}").with_test_reports(
            "{test}",
            vec![TestReport {
                suite: "unit".into(),
                total: 4,
                passed: 4,
                ..TestReport::default()
            }],
        );
        let table = PatternTable::builtin();
        let options = DiagnoseOptions {
            step: Some("unit".into()),
            ..DiagnoseOptions::default()
        };

        let report = Diagnoser::new(&source, &table)
            .diagnose("{p}", &options)
            .await
            .unwrap();

        assert!(!report.has_errors());
        match &report.steps[0].diagnosis {
            StepDiagnosis::Tests { tests, log_note } => {
                assert!(!tests.has_failures());
                assert!(log_note.is_some());
            }
            other => panic!("expected test fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_everything_is_no_data() {
        let source = source();
        let table = PatternTable::builtin();

        let report = Diagnoser::new(&source, &table)
            .diagnose("{p}", &DiagnoseOptions::default())
            .await
            .unwrap();

        for step in &report.steps {
            assert!(matches!(step.diagnosis, StepDiagnosis::NoData { .. }));
        }
    }

    #[tokio::test]
    async fn one_failing_step_does_not_hide_another() {
        let source = source()
            .with_failing_log("{lint}")
            .with_log("{test}", "error: compile failed\n");
        let table = PatternTable::builtin();

        let report = Diagnoser::new(&source, &table)
            .diagnose("{p}", &DiagnoseOptions::default())
            .await
            .unwrap();

        assert!(matches!(
            report.steps[0].diagnosis,
            StepDiagnosis::NoData { .. }
        ));
        assert!(report.steps[1].diagnosis.has_errors());
    }

    #[tokio::test]
    async fn unknown_step_filter_is_an_error() {
        let source = source();
        let table = PatternTable::builtin();
        let options = DiagnoseOptions {
            step: Some("deploy".into()),
            ..DiagnoseOptions::default()
        };

        let err = Diagnoser::new(&source, &table)
            .diagnose("{p}", &options)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Lint, Unit tests"));
    }

    #[tokio::test]
    async fn failed_only_skips_green_steps() {
        let source = source().with_log("{test}", "error: x\n");
        let table = PatternTable::builtin();
        let options = DiagnoseOptions {
            failed_only: true,
            ..DiagnoseOptions::default()
        };

        let report = Diagnoser::new(&source, &table)
            .diagnose("{p}", &options)
            .await
            .unwrap();

        assert_eq!(report.steps.len(), 1);
        assert_eq!(report.steps[0].step.name, "Unit tests");
        assert_eq!(source.calls().get_step_log, 1);
    }
}
