use std::fmt;

use regex::{RegexBuilder, RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{PipeLensError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Build,
    Test,
    Container,
    Runtime,
    Network,
    Generic,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Test => "test",
            Self::Container => "container",
            Self::Runtime => "runtime",
            Self::Network => "network",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Error and critical matches are what gets counted and reported.
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error | Self::Critical)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the decision list.
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    pub category: Category,
    pub severity: Severity,
}

/// Declarative pattern definition, as found in the built-in table and in
/// the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub category: Category,
    pub severity: Severity,
    pub regex: String,
}

/// Built-in decision list. Order is priority: runtime crashes, build
/// errors, test failures, container errors, network errors, then generic
/// tokens.
const BUILTIN_PATTERNS: &[(Category, Severity, &str)] = &[
    // Runtime
    (Category::Runtime, Severity::Critical, r"\bpanicked at\b|^\s*panic:"),
    (Category::Runtime, Severity::Critical, r"segmentation fault|\bSIGSEGV\b|core dumped"),
    (Category::Runtime, Severity::Critical, r"out of memory|\bOOMKilled\b|java\.lang\.OutOfMemoryError"),
    (Category::Runtime, Severity::Critical, r"stack overflow|fatal runtime error|^\s*fatal error:"),
    (Category::Runtime, Severity::Critical, r"killed by signal|\bkilled\b.*\bsignal 9\b"),
    (Category::Runtime, Severity::Error, r"Traceback \(most recent call last\)|unhandled (promise )?(exception|rejection)|exception in thread"),
    // Build
    (Category::Build, Severity::Error, r"^\s*error(\[[A-Z]?\d+\])?:"),
    (Category::Build, Severity::Error, r":\d+(:\d+)?: (fatal )?error:"),
    (Category::Build, Severity::Error, r"compil(e|ation) (failed|error)|could not compile|build failed|BUILD FAILURE"),
    (Category::Build, Severity::Error, r"\berror (TS|CS)\d+\b|undefined reference to|cannot find (symbol|module|package)"),
    (Category::Build, Severity::Error, r"\bsyntax ?error\b|^\s*npm ERR!|make(\[\d+\])?: \*\*\*"),
    (Category::Build, Severity::Warning, r"^\s*warning(\[[A-Z]?\d+\])?:|\bdeprecat(ed|ion)\b"),
    // Test
    (Category::Test, Severity::Error, r"^\s*(--- )?FAIL(ED)?\b|test result: FAILED|\btests? failed\b"),
    (Category::Test, Severity::Error, r"assertion ?(failed|error)|AssertionError|assert(_eq|_ne)?!? failed"),
    (Category::Test, Severity::Error, r"Tests run:.*(Failures|Errors): [1-9]|\b[1-9]\d* (failed|failing)\b"),
    (Category::Test, Severity::Error, r"expected .+ (but )?(got|was|received)\b"),
    // Container
    (Category::Container, Severity::Error, r"error response from daemon|docker: Error|Cannot connect to the Docker daemon"),
    (Category::Container, Severity::Error, r"ErrImagePull|ImagePullBackOff|failed to pull image|pull access denied|manifest unknown"),
    (Category::Container, Severity::Error, r"container .* exited with (code|status) [1-9]|no such (image|container)"),
    // Network
    (Category::Network, Severity::Error, r"connection (refused|reset|timed out)|\bE(CONNREFUSED|CONNRESET|TIMEDOUT|NOTFOUND)\b"),
    (Category::Network, Severity::Error, r"could not resolve host|name or service not known|temporary failure in name resolution"),
    (Category::Network, Severity::Error, r"network is unreachable|TLS handshake (timeout|failed)|\b50[234] (Bad Gateway|Service Unavailable|Gateway Time-?out)\b"),
    // Generic
    (Category::Generic, Severity::Critical, r"\b(FATAL|CRITICAL)\b"),
    // `error` but not `error.rs` or `error::tests`; `failed` only as a status, never as a count.
    (Category::Generic, Severity::Error, r"\berror($|[^\w.:]|\.($|\W)|:($|[^:]))|\b(failed|failure)\b(\s*[:!]|\s+(to|with|due|because|while|on|in|at)\b|\s*$)|exit (code|status) [1-9]"),
    (Category::Generic, Severity::Warning, r"\bwarn(ing)?\b"),
];

/// Ordered, immutable first-match-wins decision list.
///
/// Compiled once into a [`RegexSet`]; the lowest matching index wins, so a
/// line is scanned in a single pass regardless of table size.
#[derive(Debug, Clone)]
pub struct PatternTable {
    patterns: Vec<ErrorPattern>,
    set: RegexSet,
}

impl PatternTable {
    /// Compiles `specs` in order.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first invalid expression.
    pub fn from_specs(specs: &[PatternSpec]) -> Result<Self> {
        let mut patterns = Vec::with_capacity(specs.len());
        for spec in specs {
            validate(&spec.regex)?;
            patterns.push(ErrorPattern {
                category: spec.category,
                severity: spec.severity,
            });
        }

        let set = RegexSetBuilder::new(specs.iter().map(|spec| spec.regex.as_str()))
            .case_insensitive(true)
            .multi_line(false)
            .build()
            .map_err(|e| PipeLensError::Config(format!("invalid pattern table: {e}")))?;

        Ok(Self { patterns, set })
    }

    /// Built-in table with `custom` patterns evaluated first.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a custom expression does not compile.
    pub fn with_custom(custom: &[PatternSpec]) -> Result<Self> {
        let specs: Vec<PatternSpec> = custom
            .iter()
            .cloned()
            .chain(builtin_specs())
            .collect();
        Self::from_specs(&specs)
    }

    pub fn builtin() -> Self {
        // Static expressions, covered by `builtin_table_compiles`.
        Self::from_specs(&builtin_specs()).expect("built-in patterns compile")
    }

    /// First matching pattern for `line`, if any.
    pub fn classify(&self, line: &str) -> Option<&ErrorPattern> {
        self.set
            .matches(line)
            .iter()
            .next()
            .map(|index| &self.patterns[index])
    }
}

impl Default for PatternTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_specs() -> Vec<PatternSpec> {
    BUILTIN_PATTERNS
        .iter()
        .map(|&(category, severity, regex)| PatternSpec {
            category,
            severity,
            regex: regex.to_string(),
        })
        .collect()
}

fn validate(expression: &str) -> Result<()> {
    RegexBuilder::new(expression)
        .case_insensitive(true)
        .build()
        .map(drop)
        .map_err(|e| PipeLensError::Config(format!("invalid pattern '{expression}': {e}")))
}
