use thiserror::Error;

/// Errors surfaced by the search engine.
///
/// Malformed numeric request inputs are not represented here: they are
/// coerced to defaults during canonicalization and only logged.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The passage source is missing, unreadable, or malformed. Fatal at startup.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// An external provider (embedder, vector backend, cross-encoder, rewriter) failed.
    #[error("{provider} provider failed: {source:#}")]
    Provider {
        provider: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The lexical index engine failed.
    #[error("lexical index error: {0}")]
    Index(#[from] tantivy::TantivyError),
}

impl SearchError {
    /// Build a closure that wraps a provider failure, for use with `map_err`.
    pub fn provider(provider: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| SearchError::Provider { provider, source }
    }

    pub fn is_provider(&self) -> bool {
        matches!(self, SearchError::Provider { .. })
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_names_provider() {
        let err = SearchError::provider("cross_encoder")(anyhow::anyhow!("connection refused"));
        assert!(err.is_provider());
        let msg = err.to_string();
        assert!(msg.contains("cross_encoder"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_initialization_error_is_not_provider() {
        let err = SearchError::Initialization("chunks.json not found".to_string());
        assert!(!err.is_provider());
    }
}
