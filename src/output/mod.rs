mod progress;
mod render;
mod styling;
mod tables;
mod watch;

use std::path::Path;

use anyhow::{Context, Result};
use log::info;

pub use progress::PhaseProgress;
pub use render::{render_report, ReportLinks};
use styling::{dim, magenta_bold};
pub use watch::WatchPrinter;

/// Prints the `PipeLens` banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🔍 PipeLens"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Bitbucket Pipelines failure diagnosis")
    );
}

/// Writes rendered output to `path`, or to stdout when no path is given.
pub fn write_output(content: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            info!("Report written to: {}", path.display());
        }
        None => println!("{}", content.trim_end()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_output_to_file() {
        let file = NamedTempFile::new().unwrap();

        write_output("{\"ok\":true}", Some(file.path())).unwrap();

        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "{\"ok\":true}");
    }
}
