use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::diagnostics::{PatternSpec, PatternTable, DEFAULT_CONTEXT_LINES, DEFAULT_SEARCH_WINDOW};

const CONFIG_CANDIDATES: [&str; 4] = [
    "pipelens.toml",
    "pipelens.json",
    "pipelens.yaml",
    "pipelens.yml",
];

/// Configuration file structure for `PipeLens`.
///
/// Holds connection defaults and diagnosis tuning so they don't have to be
/// repeated on every run. Command-line flags override anything set here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Bitbucket connection defaults
    #[serde(default)]
    pub bitbucket: BitbucketConfig,

    /// Output format preferences
    #[serde(default)]
    pub output: OutputConfig,

    /// Log analysis and watch parameters
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BitbucketConfig {
    /// Repository, project or workspace access token
    pub token: Option<String>,

    /// Bitbucket API base URL
    #[serde(default = "default_bitbucket_base_url")]
    pub base_url: String,

    /// Workspace slug
    pub workspace: Option<String>,

    /// Repository slug
    pub repo: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Default output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiagnosticsConfig {
    /// Context lines kept on each side of a flagged log line
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    /// Seconds between two polls while watching a pipeline
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Seconds between two reads of a followed step log
    #[serde(default = "default_log_poll_interval_secs")]
    pub log_poll_interval_secs: u64,

    /// How many recent pipelines are searched to resolve a build number
    #[serde(default = "default_search_window")]
    pub search_window: usize,

    /// Extra error patterns, checked before the built-in ones
    #[serde(default)]
    pub patterns: Vec<PatternSpec>,
}

impl Default for BitbucketConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_bitbucket_base_url(),
            workspace: None,
            repo: None,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            context_lines: default_context_lines(),
            poll_interval_secs: default_poll_interval_secs(),
            log_poll_interval_secs: default_log_poll_interval_secs(),
            search_window: default_search_window(),
            patterns: Vec::new(),
        }
    }
}

fn default_bitbucket_base_url() -> String {
    "https://api.bitbucket.org/2.0".to_string()
}

fn default_context_lines() -> usize {
    DEFAULT_CONTEXT_LINES
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_log_poll_interval_secs() -> u64 {
    2
}

fn default_search_window() -> usize {
    DEFAULT_SEARCH_WINDOW
}

impl DiagnosticsConfig {
    /// Built-in pattern table extended with the configured patterns.
    pub fn pattern_table(&self) -> Result<PatternTable> {
        if self.patterns.is_empty() {
            return Ok(PatternTable::builtin());
        }
        PatternTable::with_custom(&self.patterns).context("Invalid pattern in configuration")
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./pipelens.toml
    /// 3. ./pipelens.json
    /// 4. ./pipelens.yaml
    /// 5. ./pipelens.yml
    /// 6. `<config dir>/pipelens/config.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        for candidate in &CONFIG_CANDIDATES {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        if let Some(path) = user_config_path().filter(|path| path.exists()) {
            return Self::load_from_path(&path);
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pipelens").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Category, Severity};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bitbucket.base_url, "https://api.bitbucket.org/2.0");
        assert_eq!(config.output.format, OutputFormat::Table);
        assert_eq!(config.diagnostics.context_lines, 3);
        assert_eq!(config.diagnostics.poll_interval_secs, 5);
        assert_eq!(config.diagnostics.log_poll_interval_secs, 2);
        assert_eq!(config.diagnostics.search_window, 100);
        assert!(config.diagnostics.patterns.is_empty());
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[bitbucket]
token = "bb-test-token"
workspace = "acme"
repo = "shop"

[output]
format = "yaml"

[diagnostics]
context-lines = 5
poll-interval-secs = 10

[[diagnostics.patterns]]
category = "network"
severity = "critical"
regex = "artifactory is down"
"#;
        write!(temp_file, "{toml_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.bitbucket.token, Some("bb-test-token".to_string()));
        assert_eq!(config.bitbucket.workspace.as_deref(), Some("acme"));
        assert_eq!(config.bitbucket.base_url, "https://api.bitbucket.org/2.0");
        assert_eq!(config.output.format, OutputFormat::Yaml);
        assert_eq!(config.diagnostics.context_lines, 5);
        assert_eq!(config.diagnostics.poll_interval_secs, 10);
        assert_eq!(config.diagnostics.search_window, 100);
        assert_eq!(config.diagnostics.patterns[0].category, Category::Network);
        assert_eq!(config.diagnostics.patterns[0].severity, Severity::Critical);
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "bitbucket": {
    "base-url": "https://bitbucket.example.com/2.0",
    "repo": "shop"
  },
  "output": {
    "format": "json",
    "pretty": true
  }
}"#;
        write!(temp_file, "{json_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.bitbucket.base_url, "https://bitbucket.example.com/2.0");
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.pretty);
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(
            temp_file,
            "diagnostics:\n  search-window: 250\n  context-lines: 0\n"
        )
        .unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.diagnostics.search_window, 250);
        assert_eq!(config.diagnostics.context_lines, 0);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let result = Config::load(Some(Path::new("does-not-exist.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_custom_pattern_is_reported() {
        let config = DiagnosticsConfig {
            patterns: vec![PatternSpec {
                category: Category::Build,
                severity: Severity::Error,
                regex: "unclosed (group".to_string(),
            }],
            ..DiagnosticsConfig::default()
        };

        let err = config.pattern_table().unwrap_err();
        assert!(err.to_string().contains("Invalid pattern"));
    }

    #[test]
    fn test_custom_patterns_come_first() {
        let config = DiagnosticsConfig {
            patterns: vec![PatternSpec {
                category: Category::Network,
                severity: Severity::Critical,
                regex: "error: registry unreachable".to_string(),
            }],
            ..DiagnosticsConfig::default()
        };

        let table = config.pattern_table().unwrap();
        let pattern = table.classify("error: registry unreachable").unwrap();
        assert_eq!(pattern.category, Category::Network);
    }
}
