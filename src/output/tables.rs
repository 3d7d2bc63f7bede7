use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::diagnostics::{PipelineState, Severity};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

pub fn severity_cell(severity: Severity) -> Cell {
    let color = match severity {
        Severity::Critical | Severity::Error => TableColor::Red,
        Severity::Warning => TableColor::Yellow,
        Severity::Info => TableColor::DarkGrey,
    };
    Cell::new(severity).fg(color)
}

pub fn state_cell(state: PipelineState) -> Cell {
    let color = match state {
        PipelineState::Successful => TableColor::Green,
        PipelineState::Failed | PipelineState::Error => TableColor::Red,
        PipelineState::Pending | PipelineState::InProgress => TableColor::Yellow,
        PipelineState::Stopped => TableColor::DarkGrey,
    };
    Cell::new(format!("{} {state}", state.icon())).fg(color)
}

/// Red when anything failed, green otherwise.
pub fn failure_count_cell(count: u64) -> Cell {
    if count > 0 {
        Cell::new(count).fg(TableColor::Red)
    } else {
        Cell::new(count).fg(TableColor::Green)
    }
}
