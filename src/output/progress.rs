use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_red, bright_yellow};

/// Progress tracking for the two phases of a one-shot diagnosis
pub struct PhaseProgress {
    pb: ProgressBar,
}

impl PhaseProgress {
    pub fn start_resolving(identifier: &str) -> Self {
        eprintln!("{}  {}", bright("⚙️"), bright("Phases").underlined());
        let pb = create_spinner(
            bright_yellow(format!("Phase 1/2: Resolving pipeline {identifier}")).to_string(),
        );
        Self { pb }
    }

    pub fn finish_resolving_start_fetching(self, pipeline_id: &str) -> Self {
        self.pb.finish_with_message(
            bright_green(format!("Phase 1/2: Resolved pipeline {pipeline_id} ✓")).to_string(),
        );
        let pb = create_spinner(
            bright_yellow("Phase 2/2: Fetching and analyzing steps").to_string(),
        );
        Self { pb }
    }

    pub fn finish_fetching(self, steps: usize) {
        self.pb.finish_with_message(
            bright_green(format!("Phase 2/2: Analyzed {steps} steps ✓")).to_string(),
        );
        eprintln!();
    }

    pub fn fail(self) {
        self.pb
            .abandon_with_message(bright_red("Failed ✗").to_string());
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {msg} {spinner}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
