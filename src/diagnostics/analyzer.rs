use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::patterns::{Category, PatternTable, Severity};

/// Default number of context lines on each side of a flagged line.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzerOptions {
    /// Context size K: up to K lines before and K lines after each entry.
    pub context_lines: usize,
    /// Also record warning matches as entries. Counts are unaffected.
    pub record_warnings: bool,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            context_lines: DEFAULT_CONTEXT_LINES,
            record_warnings: false,
        }
    }
}

impl AnalyzerOptions {
    pub fn with_context(context_lines: usize) -> Self {
        Self {
            context_lines,
            ..Self::default()
        }
    }
}

/// A flagged log line with its surrounding raw lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedError {
    /// 1-based line number in the analyzed stream.
    pub line_number: usize,
    pub category: Category,
    pub severity: Severity,
    pub content: String,
    /// Lines around the flagged one, in stream order, excluding the flagged
    /// line itself.
    pub context: Vec<String>,
    /// How many entries of `context` precede the flagged line.
    pub context_before: usize,
}

impl ExtractedError {
    pub fn lines_before(&self) -> &[String] {
        &self.context[..self.context_before]
    }

    pub fn lines_after(&self) -> &[String] {
        &self.context[self.context_before..]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogAnalysisResult {
    pub total_lines: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub errors: Vec<ExtractedError>,
    pub summary: BTreeMap<Category, usize>,
    pub processed_at: DateTime<Utc>,
}

impl LogAnalysisResult {
    /// New result keeping only error and critical entries. Counts, summary
    /// and timestamp are carried over untouched.
    #[must_use]
    pub fn filter_errors_only(&self) -> Self {
        Self {
            total_lines: self.total_lines,
            error_count: self.error_count,
            warning_count: self.warning_count,
            errors: self
                .errors
                .iter()
                .filter(|entry| entry.severity.is_error())
                .cloned()
                .collect(),
            summary: self.summary.clone(),
            processed_at: self.processed_at,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Equality on everything but `processed_at`.
    #[cfg(test)]
    pub fn same_findings(&self, other: &Self) -> bool {
        self.total_lines == other.total_lines
            && self.error_count == other.error_count
            && self.warning_count == other.warning_count
            && self.errors == other.errors
            && self.summary == other.summary
    }
}

/// Classification of a single line, returned as lines are fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMatch {
    pub line_number: usize,
    pub category: Category,
    pub severity: Severity,
}

/// Incremental log classifier.
///
/// Feed lines as they arrive with [`feed_line`](Self::feed_line) and call
/// [`finish`](Self::finish) at end of stream. Entries whose following
/// context is still incomplete at that point keep the lines they got.
pub struct LogAnalyzer<'a> {
    table: &'a PatternTable,
    options: AnalyzerOptions,
    window: VecDeque<String>,
    // (index into `errors`, following lines still wanted)
    pending: Vec<(usize, usize)>,
    total_lines: usize,
    error_count: usize,
    warning_count: usize,
    errors: Vec<ExtractedError>,
    summary: BTreeMap<Category, usize>,
}

impl<'a> LogAnalyzer<'a> {
    pub fn new(table: &'a PatternTable, options: AnalyzerOptions) -> Self {
        Self {
            table,
            options,
            window: VecDeque::with_capacity(options.context_lines + 1),
            pending: Vec::new(),
            total_lines: 0,
            error_count: 0,
            warning_count: 0,
            errors: Vec::new(),
            summary: BTreeMap::new(),
        }
    }

    pub fn feed_line(&mut self, line: &str) -> Option<LineMatch> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        self.total_lines += 1;
        let line_number = self.total_lines;

        let errors = &mut self.errors;
        self.pending.retain_mut(|(index, remaining)| {
            errors[*index].context.push(line.to_string());
            *remaining -= 1;
            *remaining > 0
        });

        let matched = self.table.classify(line).map(|pattern| LineMatch {
            line_number,
            category: pattern.category,
            severity: pattern.severity,
        });

        if let Some(m) = matched {
            let record = match m.severity {
                Severity::Error | Severity::Critical => {
                    self.error_count += 1;
                    *self.summary.entry(m.category).or_insert(0) += 1;
                    true
                }
                Severity::Warning => {
                    self.warning_count += 1;
                    self.options.record_warnings
                }
                Severity::Info => false,
            };
            if record {
                self.record(m, line);
            }
        }

        let k = self.options.context_lines;
        if k > 0 {
            self.window.push_back(line.to_string());
            if self.window.len() > k {
                self.window.pop_front();
            }
        }

        matched
    }

    fn record(&mut self, m: LineMatch, line: &str) {
        let context: Vec<String> = self.window.iter().cloned().collect();
        let context_before = context.len();
        self.errors.push(ExtractedError {
            line_number: m.line_number,
            category: m.category,
            severity: m.severity,
            content: line.to_string(),
            context,
            context_before,
        });
        if self.options.context_lines > 0 {
            self.pending
                .push((self.errors.len() - 1, self.options.context_lines));
        }
    }

    pub fn finish(self) -> LogAnalysisResult {
        let mut errors = self.errors;
        errors.sort_by_key(|entry| entry.line_number);

        LogAnalysisResult {
            total_lines: self.total_lines,
            error_count: self.error_count,
            warning_count: self.warning_count,
            errors,
            summary: self.summary,
            processed_at: Utc::now(),
        }
    }

    /// Analyzes a fully buffered log.
    pub fn analyze_text(
        table: &PatternTable,
        text: &str,
        options: AnalyzerOptions,
    ) -> LogAnalysisResult {
        let mut analyzer = LogAnalyzer::new(table, options);
        for line in text.lines() {
            analyzer.feed_line(line);
        }
        analyzer.finish()
    }

    /// Analyzes a batch of already split lines.
    pub fn analyze_lines<I, L>(table: &PatternTable, lines: I, options: AnalyzerOptions) -> LogAnalysisResult
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
    {
        let mut analyzer = LogAnalyzer::new(table, options);
        for line in lines {
            analyzer.feed_line(line.as_ref());
        }
        analyzer.finish()
    }
}
