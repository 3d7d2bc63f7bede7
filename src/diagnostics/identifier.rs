use log::{debug, info};

use crate::error::{PipeLensError, Result};

use super::source::PipelineSource;

/// Number of recent pipelines scanned when resolving an ordinal.
pub const DEFAULT_SEARCH_WINDOW: usize = 100;

const SEPARATORS: &[char] = &['-', '{'];
const ORDINAL_MARKER: char = '#';

/// A parsed, not yet resolved, pipeline identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineRef {
    /// Opaque canonical id, used verbatim.
    Canonical(String),
    /// Build number, always > 0.
    Ordinal(u64),
}

impl PipelineRef {
    /// Parses user input without touching the network.
    ///
    /// Signed integers (`-3`, `#-3`) are parsed as ordinals so that negative
    /// numbers are rejected instead of being mistaken for canonical ids.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let number = input.strip_prefix(ORDINAL_MARKER).unwrap_or(input);

        if let Ok(value) = number.parse::<i64>() {
            return match u64::try_from(value) {
                Ok(ordinal) if ordinal > 0 => Ok(Self::Ordinal(ordinal)),
                _ => Err(PipeLensError::InvalidIdentifier(input.to_string())),
            };
        }

        if input.contains(SEPARATORS) {
            return Ok(Self::Canonical(input.to_string()));
        }

        Err(PipeLensError::InvalidIdentifier(input.to_string()))
    }
}

/// Turns identifiers into canonical pipeline ids.
pub struct PipelineIdentifierResolver<'a, S: PipelineSource + ?Sized> {
    source: &'a S,
    window: usize,
}

impl<'a, S: PipelineSource + ?Sized> PipelineIdentifierResolver<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            window: DEFAULT_SEARCH_WINDOW,
        }
    }

    #[must_use]
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Resolves `input` to a canonical id.
    ///
    /// # Errors
    ///
    /// - `InvalidIdentifier` when the input is neither a canonical id nor a
    ///   positive ordinal
    /// - `NotFound` when the ordinal is not among the `window` most recent
    ///   pipelines
    /// - any error from the pipeline listing
    pub async fn resolve(&self, input: &str) -> Result<String> {
        match PipelineRef::parse(input)? {
            PipelineRef::Canonical(id) => {
                debug!("Using canonical pipeline id {id}");
                Ok(id)
            }
            PipelineRef::Ordinal(ordinal) => self.resolve_ordinal(ordinal).await,
        }
    }

    async fn resolve_ordinal(&self, ordinal: u64) -> Result<String> {
        info!(
            "Searching the {} most recent pipelines for #{ordinal}",
            self.window
        );

        let pipelines = self.source.list_pipelines(self.window).await?;

        pipelines
            .into_iter()
            .find(|pipeline| pipeline.ordinal == ordinal)
            .map(|pipeline| pipeline.id)
            .ok_or(PipeLensError::NotFound {
                ordinal,
                window: self.window,
            })
    }
}
