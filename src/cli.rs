use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::Token;
use crate::config::{Config, OutputFormat};
use crate::diagnostics::{
    DiagnoseOptions, Diagnoser, DiagnosisReport, MonitorLoop, PipelineIdentifierResolver,
    WatchOptions, WatchOutcome,
};
use crate::output::{render_report, write_output, PhaseProgress, ReportLinks, WatchPrinter};
use crate::providers::BitbucketProvider;

#[derive(Parser)]
#[command(name = "pipelens")]
#[command(author, version, about = "Bitbucket Pipelines failure diagnosis", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format [default: table, or the configured one]
    #[arg(short, long, global = true, value_enum)]
    format: Option<OutputFormat>,

    /// Pretty-print JSON output
    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,

    /// Write output to a file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Bitbucket workspace slug
    #[arg(short, long, global = true)]
    workspace: Option<String>,

    /// Repository slug
    #[arg(short, long, global = true)]
    repo: Option<String>,

    /// Repository, project or workspace access token
    #[arg(short, long, global = true, env = "BITBUCKET_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Bitbucket API base URL
    #[arg(short, long, global = true)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the logs of a finished (or running) pipeline
    Diagnose {
        /// Pipeline UUID or build number (`42` or `#42`)
        id: String,

        /// Only analyze the step whose name matches
        #[arg(short, long)]
        step: Option<String>,

        /// Hide warning entries
        #[arg(short, long, default_value_t = false)]
        errors_only: bool,

        /// Context lines around each flagged line
        #[arg(long)]
        context: Option<usize>,

        /// Only analyze failed steps
        #[arg(long, default_value_t = false)]
        failed_only: bool,
    },

    /// Poll a pipeline until it finishes
    Watch {
        /// Pipeline UUID or build number (`42` or `#42`)
        id: String,

        /// Stream and analyze step logs while steps run
        #[arg(long, default_value_t = false)]
        follow: bool,

        /// Only follow the step whose name matches
        #[arg(short, long)]
        step: Option<String>,

        /// Context lines around each flagged line
        #[arg(long)]
        context: Option<usize>,

        /// Only follow steps that failed
        #[arg(long, default_value_t = false)]
        failed_only: bool,

        /// Seconds between two polls
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show test-report results only
    Tests {
        /// Pipeline UUID or build number (`42` or `#42`)
        id: String,

        /// Only show the step whose name matches
        #[arg(short, long)]
        step: Option<String>,
    },
}

impl Cli {
    /// Configuration file values with command-line flags applied on top.
    fn settings(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(format) = self.format {
            config.output.format = format;
        }
        if self.pretty {
            config.output.pretty = true;
        }
        if let Some(workspace) = &self.workspace {
            config.bitbucket.workspace = Some(workspace.clone());
        }
        if let Some(repo) = &self.repo {
            config.bitbucket.repo = Some(repo.clone());
        }
        if let Some(token) = &self.token {
            config.bitbucket.token = Some(token.clone());
        }
        if let Some(url) = &self.url {
            config.bitbucket.base_url = url.clone();
        }

        Ok(config)
    }

    fn provider(config: &Config) -> Result<BitbucketProvider> {
        let workspace = config.bitbucket.workspace.clone().context(
            "No workspace given: pass --workspace or set bitbucket.workspace in the config file",
        )?;
        let repo = config
            .bitbucket
            .repo
            .clone()
            .context("No repository given: pass --repo or set bitbucket.repo in the config file")?;
        let token = config.bitbucket.token.as_deref().map(Token::from);

        let log_poll_interval =
            Duration::from_secs(config.diagnostics.log_poll_interval_secs.max(1));

        Ok(
            BitbucketProvider::new(&config.bitbucket.base_url, workspace, repo, token)?
                .with_log_poll_interval(log_poll_interval),
        )
    }

    async fn resolve(provider: &BitbucketProvider, config: &Config, id: &str) -> Result<String> {
        let pipeline_id = PipelineIdentifierResolver::new(provider)
            .with_window(config.diagnostics.search_window)
            .resolve(id)
            .await?;
        Ok(pipeline_id)
    }

    fn print_report(
        &self,
        config: &Config,
        provider: &BitbucketProvider,
        report: &DiagnosisReport,
    ) -> Result<()> {
        let ordinal = report.pipeline.ordinal;
        let links = ReportLinks {
            pipeline: provider.pipeline_url(ordinal),
            steps: report
                .steps
                .iter()
                .map(|step| (step.step.id.clone(), provider.step_url(ordinal, &step.step.id)))
                .collect(),
        };

        let content = render_report(
            report,
            config.output.format,
            config.output.pretty,
            &links,
        )?;
        write_output(&content, self.output.as_deref())
    }

    async fn execute_diagnose(
        &self,
        id: &str,
        mut options: DiagnoseOptions,
        context: Option<usize>,
        tests_only: bool,
    ) -> Result<()> {
        let config = self.settings()?;
        let provider = Self::provider(&config)?;
        let table = config.diagnostics.pattern_table()?;
        options.context_lines = context.unwrap_or(config.diagnostics.context_lines);

        info!(
            "Diagnosing pipeline {id} of {}/{}",
            provider.workspace, provider.repo
        );

        let progress = PhaseProgress::start_resolving(id);
        let pipeline_id = match Self::resolve(&provider, &config, id).await {
            Ok(pipeline_id) => pipeline_id,
            Err(e) => {
                progress.fail();
                return Err(e);
            }
        };

        let progress = progress.finish_resolving_start_fetching(&pipeline_id);
        let diagnoser = Diagnoser::new(&provider, &table);
        let result = if tests_only {
            diagnoser.test_results(&pipeline_id, &options).await
        } else {
            diagnoser.diagnose(&pipeline_id, &options).await
        };
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                progress.fail();
                return Err(e.into());
            }
        };
        progress.finish_fetching(report.steps.len());

        self.print_report(&config, &provider, &report)
    }

    async fn execute_watch(
        &self,
        id: &str,
        mut options: WatchOptions,
        interval: Option<u64>,
        context: Option<usize>,
    ) -> Result<()> {
        let config = self.settings()?;
        let provider = Self::provider(&config)?;
        let table = config.diagnostics.pattern_table()?;

        options.poll_interval =
            Duration::from_secs(interval.unwrap_or(config.diagnostics.poll_interval_secs).max(1));
        options.context_lines = context.unwrap_or(config.diagnostics.context_lines);

        let pipeline_id = Self::resolve(&provider, &config, id).await?;

        info!(
            "Watching pipeline {pipeline_id} every {}s",
            options.poll_interval.as_secs()
        );

        let out: Box<dyn Write> = match &self.output {
            Some(path) => Box::new(
                File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?,
            ),
            None => Box::new(io::stdout()),
        };
        let mut printer = WatchPrinter::new(out, config.output.format);

        let cancel = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        let outcome = MonitorLoop::new(&provider, &table, options)
            .run(&pipeline_id, &mut printer, cancel)
            .await?;

        match outcome {
            WatchOutcome::Completed(state) => info!("Watch finished: pipeline is {state}"),
            WatchOutcome::Cancelled => eprintln!("Watch cancelled"),
        }

        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Diagnose {
                id,
                step,
                errors_only,
                context,
                failed_only,
            } => {
                let options = DiagnoseOptions {
                    step: step.clone(),
                    failed_only: *failed_only,
                    errors_only: *errors_only,
                    ..DiagnoseOptions::default()
                };
                self.execute_diagnose(id, options, *context, false).await
            }
            Commands::Watch {
                id,
                follow,
                step,
                context,
                failed_only,
                interval,
            } => {
                let options = WatchOptions {
                    follow: *follow,
                    step: step.clone(),
                    failed_only: *failed_only,
                    ..WatchOptions::default()
                };
                self.execute_watch(id, options, *interval, *context).await
            }
            Commands::Tests { id, step } => {
                let options = DiagnoseOptions {
                    step: step.clone(),
                    ..DiagnoseOptions::default()
                };
                self.execute_diagnose(id, options, None, true).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_diagnose_flags() {
        let cli = Cli::try_parse_from([
            "pipelens",
            "--workspace",
            "acme",
            "diagnose",
            "#42",
            "--step",
            "build",
            "--errors-only",
            "--context",
            "5",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.workspace.as_deref(), Some("acme"));
        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Commands::Diagnose {
                id,
                step,
                errors_only,
                context,
                failed_only,
            } => {
                assert_eq!(id, "#42");
                assert_eq!(step.as_deref(), Some("build"));
                assert!(errors_only);
                assert_eq!(context, Some(5));
                assert!(!failed_only);
            }
            _ => panic!("expected diagnose"),
        }
    }

    #[test]
    fn test_parse_watch_flags() {
        let cli =
            Cli::try_parse_from(["pipelens", "watch", "7", "--follow", "--interval", "10"]).unwrap();

        match cli.command {
            Commands::Watch {
                follow, interval, ..
            } => {
                assert!(follow);
                assert_eq!(interval, Some(10));
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli::try_parse_from([
            "pipelens",
            "--config",
            "does-not-exist.toml",
            "tests",
            "1",
        ])
        .unwrap();
        assert!(cli.settings().is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let mut config_file = NamedTempFile::with_suffix(".toml").unwrap();
        config_file
            .write_all(
                br#"
[bitbucket]
workspace = "acme"
repo = "from-file"
base-url = "https://bitbucket.example.com/2.0"

[output]
format = "json"
pretty = true
"#,
            )
            .unwrap();

        let cli = Cli::try_parse_from([
            "pipelens",
            "--config",
            config_file.path().to_str().unwrap(),
            "--repo",
            "shop",
            "--format",
            "yaml",
            "tests",
            "1",
        ])
        .unwrap();
        let config = cli.settings().unwrap();

        assert_eq!(config.bitbucket.workspace.as_deref(), Some("acme"));
        assert_eq!(config.bitbucket.repo.as_deref(), Some("shop"));
        assert_eq!(config.bitbucket.base_url, "https://bitbucket.example.com/2.0");
        assert_eq!(config.output.format, OutputFormat::Yaml);
        assert!(config.output.pretty);
    }

    #[test]
    fn test_missing_workspace_is_reported() {
        let config = Config::default();
        let err = Cli::provider(&config).err().unwrap();
        assert!(err.to_string().contains("--workspace"));
    }
}
