use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipeLensError {
    #[error("Invalid pipeline identifier '{0}': expected a pipeline UUID or a positive build number")]
    InvalidIdentifier(String),

    #[error(
        "Pipeline #{ordinal} not found in the {window} most recent pipelines (it may be older than the searchable window)"
    )]
    NotFound { ordinal: u64, window: usize },

    #[error("No step matches '{filter}' (available: {available})")]
    StepNotFound { filter: String, available: String },

    #[error("Data unavailable: {0}")]
    Unavailable(String),

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Log stream failed: {0}")]
    Stream(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipeLensError {
    /// Whether the error means the requested data simply isn't there, as
    /// opposed to the request itself failing.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_)) || matches!(self, Self::Api { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, PipeLensError>;
