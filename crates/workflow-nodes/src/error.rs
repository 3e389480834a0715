//! Error types for node implementations

use thiserror::Error;
use workflow_engine::WorkflowError;

/// Result type alias using NodeError
pub type Result<T> = std::result::Result<T, NodeError>;

/// Failures of the collaborators behind agent, service and tool nodes
#[derive(Debug, Error)]
pub enum NodeError {
    /// HTTP transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Endpoint answered with an unexpected body
    #[error("Unexpected response: {0}")]
    BadResponse(String),

    /// No model registered under the requested config name
    #[error("No model config named '{0}'")]
    MissingModel(String),

    /// The model type does not serve the requested use (chat or images)
    #[error("Model config '{config_name}' has type '{model_type}', which cannot be used for {usage}")]
    UnsupportedModel {
        usage: &'static str,
        config_name: String,
        model_type: String,
    },

    /// External process could not run to completion
    #[error("Process error: {0}")]
    Process(String),

    /// External process exceeded its time budget
    #[error("Process timed out after {0}s")]
    Timeout(u64),

    /// Image decoding, encoding or format detection failed
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Font file could not be parsed
    #[error("Invalid font '{path}': {message}")]
    Font { path: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<NodeError> for WorkflowError {
    fn from(err: NodeError) -> Self {
        WorkflowError::Collaborator(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::error::Error;

    #[test]
    fn test_converts_to_collaborator_error() {
        let err: WorkflowError = NodeError::Timeout(30).into();
        assert!(matches!(err, WorkflowError::Collaborator(ref cause) if cause.to_string().contains("30s")));
    }

    #[test]
    fn test_conversion_keeps_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked");
        let err: WorkflowError = NodeError::from(io).into();

        let node = err.source().and_then(|s| s.downcast_ref::<NodeError>());
        assert!(matches!(node, Some(NodeError::Io(_))));
        let io = node.and_then(|n| n.source()).and_then(|s| s.downcast_ref::<std::io::Error>());
        assert_eq!(io.map(|e| e.kind()), Some(std::io::ErrorKind::PermissionDenied));
    }
}
