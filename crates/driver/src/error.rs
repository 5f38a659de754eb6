use chainio::ChainError;
use registry::RegistryError;
use thiserror::Error;

/// Failure classes of the indexing engine.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Upstream rate limiting. The batch is retried after the backoff window.
    #[error("throttled by upstream: {0}")]
    Throttled(String),
    /// Failure of one unit of work; the surrounding work continues.
    #[error("transient failure: {0}")]
    Transient(String),
    /// The engine cannot start.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl IndexerError {
    /// Whether this is upstream throttling.
    pub const fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }
}

impl From<ChainError> for IndexerError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Throttled(msg) => Self::Throttled(msg),
            ChainError::Unavailable(msg) => Self::Transient(msg),
        }
    }
}

impl From<RegistryError> for IndexerError {
    fn from(err: RegistryError) -> Self {
        Self::Fatal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_errors_keep_their_class() {
        assert!(IndexerError::from(ChainError::Throttled("429".into())).is_throttled());
        assert!(matches!(
            IndexerError::from(ChainError::Unavailable("reset".into())),
            IndexerError::Transient(_)
        ));
        assert!(matches!(
            IndexerError::from(RegistryError::NotFound("X".into())),
            IndexerError::Fatal(_)
        ));
    }
}
