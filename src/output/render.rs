use std::collections::HashMap;
use std::fmt::Write;

use anyhow::Result;
use comfy_table::Cell;
use serde::Serialize;

use crate::config::OutputFormat;
use crate::diagnostics::{
    DiagnosisReport, ExtractedError, LogAnalysisResult, StepDiagnosis, StepReport,
    TestDiagnostics, NO_DIAGNOSTIC_DATA,
};

use super::styling::{
    bright, bright_green, bright_red, bright_yellow, cyan, dim, severity_styled, state_styled,
};
use super::tables::{create_table, cyan_header, failure_count_cell, severity_cell, state_cell};

pub const NO_ERRORS_FOUND: &str = "no errors found";

/// Web links shown next to the pipeline and each step in table output.
#[derive(Debug, Clone, Default)]
pub struct ReportLinks {
    pub pipeline: String,
    /// Keyed by step id.
    pub steps: HashMap<String, String>,
}

/// Renders a diagnosis in the requested format.
///
/// Tables are meant for a terminal; JSON and YAML carry the full report,
/// context lines included.
pub fn render_report(
    report: &DiagnosisReport,
    format: OutputFormat,
    pretty: bool,
    links: &ReportLinks,
) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(report, links)),
        OutputFormat::Json | OutputFormat::Yaml => serialize(report, format, pretty),
    }
}

pub fn serialize<T: Serialize>(value: &T, format: OutputFormat, pretty: bool) -> Result<String> {
    Ok(match format {
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Json | OutputFormat::Table if pretty => serde_json::to_string_pretty(value)?,
        OutputFormat::Json | OutputFormat::Table => serde_json::to_string(value)?,
    })
}

/// `1h 2m 3s`, `4m 5s` or `6s`.
pub fn format_duration(seconds: u64) -> String {
    let (hours, minutes, secs) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

/// Per-category error counts, e.g. `build 2, test 1`.
pub fn category_breakdown(analysis: &LogAnalysisResult) -> String {
    analysis
        .summary
        .iter()
        .map(|(category, count)| format!("{category} {count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn render_table(report: &DiagnosisReport, links: &ReportLinks) -> String {
    let mut output = String::new();
    let pipeline = &report.pipeline;

    add_section_header(
        &mut output,
        "📋",
        &format!("Pipeline #{}", pipeline.ordinal),
    );
    let _ = writeln!(
        output,
        "  {} {} {}",
        dim("State:"),
        pipeline.state().icon(),
        state_styled(pipeline.state())
    );
    if let Some(ref_name) = &pipeline.target.ref_name {
        let commit = pipeline.target.commit.as_deref().unwrap_or("unknown");
        let short = commit.get(..7).unwrap_or(commit);
        let _ = writeln!(output, "  {} {} @ {}", dim("Ref:"), cyan(ref_name), dim(short));
    }
    let _ = writeln!(
        output,
        "  {} {}",
        dim("Duration:"),
        format_duration(pipeline.timing.elapsed_seconds(report.generated_at))
    );
    let _ = writeln!(output, "  {} {}\n", dim("Link:"), cyan(&links.pipeline));

    if report.steps.is_empty() {
        let _ = writeln!(output, "  {}\n", bright_yellow("No steps selected."));
    } else {
        let mut overview = create_table();
        overview.set_header(cyan_header(&["Step", "State", "Findings"]));
        for step_report in &report.steps {
            overview.add_row(vec![
                Cell::new(&step_report.step.name),
                state_cell(step_report.step.state()),
                Cell::new(findings(&step_report.diagnosis)),
            ]);
        }
        let _ = writeln!(output, "{overview}\n");
    }

    for step_report in &report.steps {
        render_step(&mut output, step_report, links.steps.get(&step_report.step.id));
    }

    add_section_header(&mut output, "🩺", "Verdict");
    if report.has_errors() {
        let failing = report
            .steps
            .iter()
            .filter(|step| step.diagnosis.has_errors())
            .count();
        let _ = writeln!(
            output,
            "  ❌ {}",
            bright_red(format!(
                "{failing} of {} steps reported errors",
                report.steps.len()
            ))
        );
    } else {
        let _ = writeln!(output, "  ✅ {}", bright_green(NO_ERRORS_FOUND));
    }

    output
}

fn findings(diagnosis: &StepDiagnosis) -> String {
    match diagnosis {
        StepDiagnosis::Log { analysis } => summary_sentence(analysis),
        StepDiagnosis::Tests { tests, .. } if tests.has_failures() => {
            format!("{} failed tests", tests.total_failures())
        }
        StepDiagnosis::Tests { .. } => NO_ERRORS_FOUND.to_string(),
        StepDiagnosis::NoData { .. } => NO_DIAGNOSTIC_DATA.to_string(),
    }
}

fn render_step(output: &mut String, step_report: &StepReport, link: Option<&String>) {
    let step = &step_report.step;

    add_section_header(output, "🔎", &format!("Step: {}", step.name));
    let _ = writeln!(
        output,
        "  {} {} {}",
        dim("State:"),
        step.state().icon(),
        state_styled(step.state())
    );
    if let Some(link) = link {
        let _ = writeln!(output, "  {} {}", dim("Link:"), cyan(link));
    }

    match &step_report.diagnosis {
        StepDiagnosis::Log { analysis } => render_analysis(output, analysis),
        StepDiagnosis::Tests { tests, log_note } => {
            if let Some(note) = log_note {
                let _ = writeln!(
                    output,
                    "  {}",
                    dim(format!("Log unavailable ({note}), showing test results"))
                );
            }
            render_tests(output, tests);
        }
        StepDiagnosis::NoData { note } if note == NO_DIAGNOSTIC_DATA => {
            let _ = writeln!(output, "  ℹ️  {}", bright_yellow(NO_DIAGNOSTIC_DATA));
        }
        StepDiagnosis::NoData { note } => {
            let _ = writeln!(output, "  ℹ️  {}", bright_yellow(note));
        }
    }

    output.push('\n');
}

fn render_analysis(output: &mut String, analysis: &LogAnalysisResult) {
    let errors = if analysis.has_errors() {
        bright_red(analysis.error_count)
    } else {
        bright_green(analysis.error_count)
    };
    let _ = writeln!(
        output,
        "  {} {}  {} {}  {} {}",
        dim("Lines:"),
        bright(analysis.total_lines),
        dim("Errors:"),
        errors,
        dim("Warnings:"),
        bright_yellow(analysis.warning_count)
    );
    if !analysis.summary.is_empty() {
        let _ = writeln!(
            output,
            "  {} {}",
            dim("By category:"),
            category_breakdown(analysis)
        );
    }

    if !analysis.has_errors() {
        let _ = writeln!(output, "  ✅ {}", bright_green(NO_ERRORS_FOUND));
    }
    if analysis.errors.is_empty() {
        return;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&["Line", "Severity", "Category", "Excerpt"]));
    for entry in &analysis.errors {
        table.add_row(vec![
            Cell::new(entry.line_number),
            severity_cell(entry.severity),
            Cell::new(entry.category),
            Cell::new(excerpt(entry)),
        ]);
    }
    let _ = writeln!(output, "{table}");
}

/// Flagged line marked with `>` between its context lines.
fn excerpt(entry: &ExtractedError) -> String {
    entry
        .lines_before()
        .iter()
        .map(|line| format!("  {line}"))
        .chain(std::iter::once(format!("> {}", entry.content)))
        .chain(entry.lines_after().iter().map(|line| format!("  {line}")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_tests(output: &mut String, tests: &TestDiagnostics) {
    let mut reports = create_table();
    reports.set_header(cyan_header(&[
        "Suite", "Total", "Passed", "Failed", "Errored", "Skipped",
    ]));
    for report in &tests.reports {
        reports.add_row(vec![
            Cell::new(&report.suite),
            Cell::new(report.total),
            Cell::new(report.passed),
            failure_count_cell(report.failed),
            failure_count_cell(report.errored),
            Cell::new(report.skipped),
        ]);
    }
    let _ = writeln!(output, "{reports}");

    if tests.has_failures() {
        let mut cases = create_table();
        cases.set_header(cyan_header(&["Test", "Status", "Reason"]));
        for failed in &tests.failed_cases {
            let name = match &failed.case.suite {
                Some(suite) => format!("{suite}::{}", failed.case.name),
                None => failed.case.name.clone(),
            };
            let reason = failed
                .reasons
                .first()
                .map(|reason| reason.message.clone())
                .or_else(|| failed.note.clone())
                .unwrap_or_else(|| "-".to_string());
            cases.add_row(vec![
                Cell::new(name),
                Cell::new(&failed.case.status).fg(comfy_table::Color::Red),
                Cell::new(reason),
            ]);
        }
        if !tests.failed_cases.is_empty() {
            let _ = writeln!(output, "{cases}");
        }
    } else {
        let _ = writeln!(output, "  ✅ {}", bright_green(NO_ERRORS_FOUND));
    }

    for note in &tests.notes {
        let _ = writeln!(output, "  ⚠️  {}", dim(note));
    }
}

/// One-line rendering of a step summary, shared with the watch printer.
pub fn summary_sentence(analysis: &LogAnalysisResult) -> String {
    if !analysis.has_errors() {
        return format!(
            "{NO_ERRORS_FOUND} in {} lines ({} warnings)",
            analysis.total_lines, analysis.warning_count
        );
    }
    format!(
        "{} errors, {} warnings in {} lines ({})",
        analysis.error_count,
        analysis.warning_count,
        analysis.total_lines,
        category_breakdown(analysis)
    )
}

/// Severity label for inline (non-table) output.
pub fn severity_label(severity: crate::diagnostics::Severity) -> String {
    severity_styled(severity).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::testing::{failing_case, pipeline, step};
    use crate::diagnostics::{
        AnalyzerOptions, FailedTestCase, LogAnalyzer, PatternTable, PipelineState, TestReport,
    };
    use chrono::Utc;

    fn report(diagnosis: StepDiagnosis) -> DiagnosisReport {
        DiagnosisReport {
            pipeline: pipeline("{p}", 42, PipelineState::Failed),
            steps: vec![StepReport {
                step: step("{s}", "Build", PipelineState::Failed),
                diagnosis,
            }],
            generated_at: Utc::now(),
        }
    }

    fn links() -> ReportLinks {
        ReportLinks {
            pipeline: "https://bitbucket.org/acme/shop/pipelines/results/42".into(),
            steps: HashMap::from([(
                "{s}".to_string(),
                "https://bitbucket.org/acme/shop/pipelines/results/42/steps/s".to_string(),
            )]),
        }
    }

    fn analysis(text: &str) -> LogAnalysisResult {
        LogAnalyzer::analyze_text(
            &PatternTable::builtin(),
            text,
            AnalyzerOptions::with_context(1),
        )
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(300), "5m 0s");
        assert_eq!(format_duration(3723), "1h 2m 3s");
    }

    #[test]
    fn test_table_shows_flagged_line_with_context() {
        let report = report(StepDiagnosis::Log {
            analysis: analysis("INFO: start\nerror: compile failed\nINFO: done\n"),
        });

        let output = render_report(&report, OutputFormat::Table, false, &links()).unwrap();

        assert!(output.contains("Pipeline #42"));
        assert!(output.contains("results/42/steps/s"));
        assert!(output.contains("> error: compile failed"));
        assert!(output.contains("  INFO: start"));
        assert!(output.contains("build 1"));
        assert!(output.contains("1 of 1 steps reported errors"));
    }

    #[test]
    fn test_clean_log_says_no_errors_found() {
        let report = report(StepDiagnosis::Log {
            analysis: analysis("INFO: all good\n"),
        });

        let output = render_report(&report, OutputFormat::Table, false, &ReportLinks::default()).unwrap();

        assert!(output.contains(NO_ERRORS_FOUND));
        assert!(!output.contains("steps reported errors"));
    }

    #[test]
    fn test_passing_tests_say_no_errors_found() {
        let report = report(StepDiagnosis::Tests {
            tests: TestDiagnostics {
                reports: vec![TestReport {
                    suite: "unit".into(),
                    total: 4,
                    passed: 4,
                    ..TestReport::default()
                }],
                ..TestDiagnostics::default()
            },
            log_note: Some("log fetch failed".into()),
        });

        let output = render_report(&report, OutputFormat::Table, false, &ReportLinks::default()).unwrap();

        assert!(output.contains(NO_ERRORS_FOUND));
        assert!(output.contains("log fetch failed"));
    }

    #[test]
    fn test_failed_cases_are_listed() {
        let report = report(StepDiagnosis::Tests {
            tests: TestDiagnostics {
                reports: vec![TestReport {
                    suite: "unit".into(),
                    total: 2,
                    passed: 1,
                    failed: 1,
                    ..TestReport::default()
                }],
                failed_cases: vec![FailedTestCase {
                    case: failing_case("c1", "parses_input"),
                    reasons: Vec::new(),
                    note: Some("reasons unavailable".into()),
                }],
                notes: Vec::new(),
            },
            log_note: None,
        });

        let output = render_report(&report, OutputFormat::Table, false, &ReportLinks::default()).unwrap();

        assert!(output.contains("unit::parses_input"));
        assert!(output.contains("reasons unavailable"));
    }

    #[test]
    fn test_no_data_notice() {
        let report = report(StepDiagnosis::NoData {
            note: "no test reports".into(),
        });

        let output = render_report(&report, OutputFormat::Table, false, &ReportLinks::default()).unwrap();

        assert!(output.contains(NO_DIAGNOSTIC_DATA));
        assert!(output.contains(NO_ERRORS_FOUND));
    }

    #[test]
    fn test_json_output_is_tagged() {
        let report = report(StepDiagnosis::NoData {
            note: "nothing".into(),
        });

        let json = render_report(&report, OutputFormat::Json, false, &ReportLinks::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["pipeline"]["ordinal"], 42);
        assert_eq!(value["steps"][0]["diagnosis"]["source"], "no_data");
    }

    #[test]
    fn test_yaml_output() {
        let report = report(StepDiagnosis::Log {
            analysis: analysis("error: boom\n"),
        });

        let yaml = render_report(&report, OutputFormat::Yaml, false, &ReportLinks::default()).unwrap();

        assert!(yaml.contains("error_count: 1"));
    }

    #[test]
    fn test_summary_sentence() {
        assert!(summary_sentence(&analysis("INFO\n")).starts_with(NO_ERRORS_FOUND));
        assert_eq!(
            summary_sentence(&analysis("error: a\nFAILED b\n")),
            "2 errors, 0 warnings in 2 lines (build 1, test 1)"
        );
    }
}
