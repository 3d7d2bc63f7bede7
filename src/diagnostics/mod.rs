mod analyzer;
mod fallback;
mod identifier;
mod model;
mod monitor;
mod patterns;
mod report;
mod source;
mod step_filter;

#[cfg(test)]
pub(crate) mod testing;

pub use analyzer::{
    AnalyzerOptions, ExtractedError, LogAnalysisResult, LogAnalyzer, DEFAULT_CONTEXT_LINES,
};
pub use fallback::{FailedTestCase, TestDiagnostics, NO_DIAGNOSTIC_DATA};
pub use identifier::{PipelineIdentifierResolver, DEFAULT_SEARCH_WINDOW};
pub use model::{
    Pipeline, PipelineState, PipelineSummary, Status, Step, StepLog, Target, TestCase,
    TestCaseReason, TestReport, Timing,
};
pub use monitor::{MonitorLoop, WatchEvent, WatchOptions, WatchOutcome, WatchSink, WatchUpdate};
pub use patterns::{Category, PatternSpec, PatternTable, Severity};
pub use report::{DiagnoseOptions, Diagnoser, DiagnosisReport, StepDiagnosis, StepReport};
pub use source::{LogStream, LogStreamSender, PipelineSource};
