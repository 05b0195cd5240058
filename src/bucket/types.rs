use thiserror::Error;

/// Boxed error returned by batch processors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during bucket processing.
#[derive(Debug, Error)]
pub enum BucketError {
    /// A processor failed with an error.
    ///
    /// Preserves the source error for debugging.
    #[error("processor failed: {0}")]
    ProcessorError(#[source] BoxError),

    /// A worker stopped because its processor call failed.
    #[error("worker {id}: {source}")]
    Worker {
        id: usize,
        #[source]
        source: Box<BucketError>,
    },

    /// The bucket was closed before the item could be queued.
    #[error("channel closed")]
    ChannelClosed,

    /// Processing was cancelled via the cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// A worker task panicked or was aborted.
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl BucketError {
    /// Wraps any processor-side error.
    pub fn processor(err: impl Into<BoxError>) -> Self {
        BucketError::ProcessorError(err.into())
    }

    /// Strips worker wrapping and returns the underlying error.
    pub fn root(&self) -> &BucketError {
        match self {
            BucketError::Worker { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_processor_error_preserves_source() {
        let source = std::io::Error::other("test error");
        let bucket_err = BucketError::ProcessorError(Box::new(source));

        assert!(bucket_err.source().is_some());
        assert_eq!(bucket_err.to_string(), "processor failed: test error");
    }

    #[test]
    fn test_error_display() {
        let err = BucketError::ChannelClosed;
        assert_eq!(err.to_string(), "channel closed");

        let err = BucketError::Cancelled;
        assert_eq!(err.to_string(), "operation cancelled");
    }

    #[test]
    fn test_worker_error_wraps_and_unwraps() {
        let err = BucketError::Worker {
            id: 3,
            source: Box::new(BucketError::processor("disk full")),
        };

        assert_eq!(err.to_string(), "worker 3: processor failed: disk full");
        assert!(err.source().is_some());
        assert!(matches!(err.root(), BucketError::ProcessorError(_)));
    }
}
