use thiserror::Error;

use crate::types::RetrieverType;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid retriever type: {0}")]
    InvalidRetrieverType(RetrieverType),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing embedding for source id: {0}")]
    MissingEmbedding(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("All {0} lookups failed: {1}")]
    AllLookupsFailed(usize, String),

    #[error("Backend error: {0}")]
    Backend(#[source] BoxError),

    #[error("Unexpected backend data: {0}")]
    Decode(String),
}

impl Error {
    /// Wraps a backend error without altering it.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Backend(Box::new(err))
    }

    /// Caller errors are never worth retrying; backend errors may be, at the
    /// caller's discretion.
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, Error::Backend(_) | Error::Decode(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_keep_their_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline exceeded");
        let err = Error::backend(io);
        assert!(!err.is_caller_error());
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("deadline exceeded"));
    }

    #[test]
    fn unsupported_mode_is_a_caller_error() {
        assert!(Error::InvalidRetrieverType(RetrieverType::Graph).is_caller_error());
        assert!(Error::MissingEmbedding("s1".into()).is_caller_error());
    }
}
