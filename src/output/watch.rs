use std::io::Write;

use chrono::Local;
use log::warn;

use crate::config::OutputFormat;
use crate::diagnostics::{WatchEvent, WatchSink, WatchUpdate};

use super::render::{format_duration, serialize, severity_label, summary_sentence};
use super::styling::{bright, bright_red, bright_yellow, cyan, dim, state_styled};

/// Writes watch records as they arrive.
///
/// Every record is rendered into one buffer and written with a single
/// `write_all`, so concurrent writers to the same terminal never split a
/// line. Tables print human-readable lines, JSON prints one object per
/// line and YAML prints one `---` document per record.
pub struct WatchPrinter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> WatchPrinter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    fn record(&self, event: &WatchEvent) -> Option<String> {
        match self.format {
            OutputFormat::Table => Some(human_line(event)),
            OutputFormat::Json => match serialize(event, OutputFormat::Json, false) {
                Ok(json) => Some(format!("{json}\n")),
                Err(e) => {
                    warn!("Failed to serialize watch event: {e}");
                    None
                }
            },
            OutputFormat::Yaml => match serialize(event, OutputFormat::Yaml, false) {
                Ok(yaml) => Some(format!("---\n{yaml}")),
                Err(e) => {
                    warn!("Failed to serialize watch event: {e}");
                    None
                }
            },
        }
    }
}

impl<W: Write> WatchSink for WatchPrinter<W> {
    fn emit(&mut self, event: &WatchEvent) {
        let Some(record) = self.record(event) else {
            return;
        };
        if let Err(e) = self
            .out
            .write_all(record.as_bytes())
            .and_then(|()| self.out.flush())
        {
            warn!("Failed to write watch output: {e}");
        }
    }
}

fn human_line(event: &WatchEvent) -> String {
    let body = match event {
        WatchEvent::Final {
            ordinal,
            state,
            elapsed_seconds,
        } => format!(
            "{} Pipeline #{ordinal} already finished: {} after {}",
            state.icon(),
            state_styled(*state),
            format_duration(*elapsed_seconds)
        ),
        WatchEvent::Update(update) => update_line(update),
        WatchEvent::StateChanged { from, to } => format!(
            "{} State changed: {} → {}",
            to.icon(),
            state_styled(*from),
            state_styled(*to)
        ),
        WatchEvent::StepObserved { step, state } => format!(
            "{} Step {} is {}",
            state.icon(),
            cyan(step),
            state_styled(*state)
        ),
        WatchEvent::StepFlagged {
            step,
            line_number,
            category,
            severity,
            content,
        } => format!(
            "🚩 {} line {line_number} [{} {category}]: {}",
            cyan(step),
            severity_label(*severity),
            content.trim_end()
        ),
        WatchEvent::StepSummary { step, analysis } => {
            let sentence = summary_sentence(analysis);
            let sentence = if analysis.has_errors() {
                bright_red(sentence)
            } else {
                dim(sentence)
            };
            format!("📊 {} log: {sentence}", cyan(step))
        }
        WatchEvent::StreamFailed { step, message } => format!(
            "⚠️  {} log stream failed: {}",
            cyan(step),
            bright_yellow(message)
        ),
        WatchEvent::Completed {
            ordinal,
            state,
            elapsed_seconds,
            polls,
        } => format!(
            "{} Pipeline #{ordinal} finished: {} after {} ({polls} polls)",
            state.icon(),
            bright(state_styled(*state)),
            format_duration(*elapsed_seconds)
        ),
    };

    format!("{} {body}\n", dim(format!("[{}]", Local::now().format("%H:%M:%S"))))
}

fn update_line(update: &WatchUpdate) -> String {
    let active = if update.active_steps.is_empty() {
        String::new()
    } else {
        format!(" running: {}", update.active_steps.join(", "))
    };
    format!(
        "{} #{} {} {} steps {}/{}{active}",
        dim(format!("poll {}", update.poll)),
        update.ordinal,
        state_styled(update.state),
        format_duration(update.elapsed_seconds),
        update.completed_steps,
        update.total_steps
    )
}
