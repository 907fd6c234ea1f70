//! Error types for RewardScope

use thiserror::Error;

/// Result type alias for RewardScope operations
pub type Result<T> = std::result::Result<T, ScopeError>;

/// Main error type for RewardScope
#[derive(Error, Debug)]
pub enum ScopeError {
    /// No metrics store is attached, or it could not be reached
    #[error("{0}")]
    AdapterUnavailable(String),

    /// A read against the metrics store failed or timed out
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A record could not be turned into a wire message
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// The live transport is gone (peer disconnected or send failed)
    #[error("Transport closed: {0}")]
    TransportClosed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScopeError {
    /// The error reported when the dashboard runs without a collector database
    pub fn no_collector() -> Self {
        ScopeError::AdapterUnavailable("No data collector initialized".to_string())
    }

    /// Whether this error ends the live session that hit it.
    ///
    /// Only transport failures do; everything else skips one tick.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, ScopeError::TransportClosed(_))
    }

    /// Short machine-readable kind, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            ScopeError::AdapterUnavailable(_) => "adapter_unavailable",
            ScopeError::QueryFailed(_) => "query_failed",
            ScopeError::SerializationFailed(_) => "serialization_failed",
            ScopeError::TransportClosed(_) => "transport_closed",
            ScopeError::Config(_) => "config",
            ScopeError::Io(_) => "io",
        }
    }
}

impl From<rusqlite::Error> for ScopeError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            // JSON text columns that do not decode are malformed records
            rusqlite::Error::FromSqlConversionFailure(idx, _, ref source)
                if source.is::<serde_json::Error>() =>
            {
                ScopeError::SerializationFailed(format!(
                    "malformed record in column {}: {}",
                    idx, source
                ))
            }
            err => ScopeError::QueryFailed(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ScopeError {
    fn from(err: serde_json::Error) -> Self {
        ScopeError::SerializationFailed(err.to_string())
    }
}
