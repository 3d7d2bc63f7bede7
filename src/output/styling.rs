use console::style;

use crate::diagnostics::{PipelineState, Severity};

/// Styling helpers for terminal output
pub fn bright_yellow(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright().yellow()
}

pub fn bright_green(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright().green()
}

pub fn bright_red(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright().red()
}

pub fn cyan(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).cyan()
}

pub fn dim(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).dim()
}

pub fn bright(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright()
}

pub fn magenta_bold(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

/// Pipeline or step state, colored by outcome.
pub fn state_styled(state: PipelineState) -> console::StyledObject<String> {
    match state {
        PipelineState::Successful => bright_green(state),
        PipelineState::Failed | PipelineState::Error => bright_red(state),
        PipelineState::Pending | PipelineState::InProgress => bright_yellow(state),
        PipelineState::Stopped => dim(state),
    }
}

pub fn severity_styled(severity: Severity) -> console::StyledObject<String> {
    match severity {
        Severity::Critical => bright_red(severity).bold(),
        Severity::Error => bright_red(severity),
        Severity::Warning => bright_yellow(severity),
        Severity::Info => dim(severity),
    }
}
