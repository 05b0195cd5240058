use crate::bucket::{BoxError, BucketError};

/// Errors returned by [`ETL::run`](super::ETL::run) and
/// [`ETLPipelineManager::run_all`](super::ETLPipelineManager::run_all).
///
/// Every variant names the stage it came from.
#[derive(Debug, thiserror::Error)]
pub enum ETLError {
    #[error("pre-process failed: {0}")]
    PreProcess(#[source] BoxError),

    #[error("extract failed: {0}")]
    Extract(#[source] BoxError),

    #[error("load failed: {0}")]
    Load(#[source] BucketError),

    #[error("post-process failed: {0}")]
    PostProcess(#[source] BoxError),

    #[error("cancellation requested")]
    Cancelled,

    #[error("no pipelines registered")]
    NoPipelines,

    #[error("pipeline '{name}' failed: {source}")]
    Pipeline {
        name: String,
        #[source]
        source: Box<ETLError>,
    },

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ETLError {
    /// Name of the failing pipeline, for errors returned by the manager.
    pub fn pipeline(&self) -> Option<&str> {
        match self {
            ETLError::Pipeline { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The stage error with any pipeline wrapping removed.
    pub fn stage(&self) -> &ETLError {
        match self {
            ETLError::Pipeline { source, .. } => source.stage(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_stage_tagged_messages() {
        assert_eq!(
            ETLError::PreProcess("no schema".into()).to_string(),
            "pre-process failed: no schema"
        );
        assert_eq!(
            ETLError::Extract("cursor died".into()).to_string(),
            "extract failed: cursor died"
        );
        assert_eq!(
            ETLError::PostProcess("sync failed".into()).to_string(),
            "post-process failed: sync failed"
        );
        assert_eq!(ETLError::NoPipelines.to_string(), "no pipelines registered");
    }

    #[test]
    fn test_pipeline_error_wraps_stage() {
        let err = ETLError::Pipeline {
            name: "users".to_string(),
            source: Box::new(ETLError::Load(BucketError::processor("insert failed"))),
        };

        assert_eq!(err.pipeline(), Some("users"));
        assert!(matches!(err.stage(), ETLError::Load(_)));
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "pipeline 'users' failed: load failed: processor failed: insert failed"
        );
    }
}
