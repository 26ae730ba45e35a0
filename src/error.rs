use thiserror::Error;

/// Application-wide error type.
///
/// Variants split into the taxonomy the pipeline relies on:
///
/// - **Transient network** (`SparqlError`, `ConnectionFailed`,
///   `MalformedResponse`): the paged fetcher cools down and retries these
///   at the same cursor position.
/// - **Fatal setup** (`IoSetup`, `CsvSplit`, `Scratch`): abort the run.
/// - **`Cancelled`**: operator interrupt; follows the same graceful
///   shutdown path as success and exits with code 0.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Endpoint ──────────────────────────────────────────────────────────────
    #[error("SPARQL endpoint error: {0}")]
    SparqlError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Malformed endpoint response: {0}")]
    MalformedResponse(String),

    #[error("Invalid query parameter: {0}")]
    InvalidQuery(String),

    // ── File / CSV ────────────────────────────────────────────────────────────
    #[error("Record write failed: {0}")]
    RecordWrite(String),

    #[error("CSV split error: {0}")]
    CsvSplit(String),

    #[error("Scratch file error: {0}")]
    Scratch(String),

    #[error("I/O setup failed: {0}")]
    IoSetup(String),

    // ── Control flow ──────────────────────────────────────────────────────────
    #[error("Operation cancelled")]
    Cancelled,

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for failures the paged fetcher treats as transient and retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::SparqlError(_)
                | AppError::ConnectionFailed(_)
                | AppError::MalformedResponse(_)
        )
    }

    /// Process exit code for this error.
    ///
    /// An operator interrupt is a graceful stop, not a failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Cancelled => 0,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_covers_network_errors() {
        assert!(AppError::SparqlError("HTTP 503".into()).is_transient());
        assert!(AppError::ConnectionFailed("timeout".into()).is_transient());
        assert!(AppError::MalformedResponse("bad json".into()).is_transient());

        assert!(!AppError::IoSetup("cannot create dir".into()).is_transient());
        assert!(!AppError::CsvSplit("missing column".into()).is_transient());
        assert!(!AppError::Cancelled.is_transient());
    }

    #[test]
    fn cancelled_exits_zero_everything_else_nonzero() {
        assert_eq!(AppError::Cancelled.exit_code(), 0);
        assert_eq!(AppError::IoSetup("x".into()).exit_code(), 1);
        assert_eq!(AppError::SparqlError("x".into()).exit_code(), 1);
    }
}
