//! Error types for the workflow engine

use thiserror::Error;

/// Result type alias using WorkflowError
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Underlying cause of a collaborator failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while building or running a workflow
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The config names a node type outside the known set
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// The node type is known but no factory was registered for it
    #[error("No factory registered for node type '{0}'")]
    UnregisteredNodeType(String),

    /// A connection or element refers to an id missing from the config
    #[error("Node '{node_id}' depends on missing node '{dependency}'")]
    MissingDependency { node_id: String, dependency: String },

    /// The participating subgraph (or an element chain) is cyclic
    #[error("The provided configuration does not form a DAG (cycle through {0:?})")]
    CycleDetected(Vec<String>),

    /// Composite received a dependency count outside its allowed arity
    #[error("{kind} node '{node_id}' expects {expected} dependencies, got {actual}")]
    InvalidArity {
        node_id: String,
        kind: String,
        expected: String,
        actual: usize,
    },

    /// Switch dependency count does not line up with its case labels
    #[error("Switch node '{node_id}' has {dependencies} dependencies for {cases} cases")]
    CaseCountMismatch {
        node_id: String,
        cases: usize,
        dependencies: usize,
    },

    /// A broadcast scope found something that is neither agent nor pipeline
    #[error("MsgHub node '{node_id}' cannot include '{participant}' as a participant")]
    InvalidParticipant { node_id: String, participant: String },

    /// Missing or ill-typed node argument
    #[error("Invalid argument '{key}' for node '{node_id}': {message}")]
    InvalidArgument {
        node_id: String,
        key: String,
        message: String,
    },

    /// Structurally malformed configuration document
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Condition operator outside the supported vocabulary
    #[error("Invalid condition operator: {0}")]
    UnknownCondition(String),

    /// Condition operator cannot be applied to the value
    #[error("Cannot apply condition '{operator}': {message}")]
    InvalidCondition { operator: String, message: String },

    /// No Start node among the participating roots
    #[error("No start node found")]
    NoStartNode,

    /// Tool output did not have the expected shape
    #[error("Node '{node_id}' produced an unreadable result: {message}")]
    ValueExtraction { node_id: String, message: String },

    /// Operator failure, localized to the node that raised it
    #[error("Node '{node_id}' failed: {source}")]
    NodeFailed {
        node_id: String,
        #[source]
        source: Box<WorkflowError>,
    },

    /// Failure reported by an external collaborator (model, tool, agent)
    #[error("Collaborator error: {0}")]
    Collaborator(#[source] BoxError),

    /// Generic execution failure
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkflowError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Collaborator failure from an error value or a plain message
    pub fn collaborator(err: impl Into<BoxError>) -> Self {
        Self::Collaborator(err.into())
    }

    /// Wrap an operator error with the id of the node that raised it
    pub fn at_node(node_id: impl Into<String>, source: WorkflowError) -> Self {
        Self::NodeFailed {
            node_id: node_id.into(),
            source: Box::new(source),
        }
    }

    pub fn invalid_argument(
        node_id: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            node_id: node_id.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// The id of the node a run error is attributed to, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeFailed { node_id, .. } | Self::ValueExtraction { node_id, .. } => {
                Some(node_id)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_failed_display_includes_cause() {
        let err = WorkflowError::at_node("7", WorkflowError::failed("boom"));
        assert_eq!(err.to_string(), "Node '7' failed: Execution failed: boom");
        assert_eq!(err.node_id(), Some("7"));
    }

    #[test]
    fn test_collaborator_keeps_cause() {
        use std::error::Error;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "notes.txt");
        let err = WorkflowError::collaborator(io);
        assert_eq!(err.to_string(), "Collaborator error: notes.txt");
        let cause = err.source().and_then(|s| s.downcast_ref::<std::io::Error>());
        assert_eq!(cause.map(|e| e.kind()), Some(std::io::ErrorKind::NotFound));

        let plain = WorkflowError::collaborator("script exhausted");
        assert_eq!(plain.to_string(), "Collaborator error: script exhausted");
    }

    #[test]
    fn test_node_id_absent_for_build_errors() {
        let err = WorkflowError::UnknownNodeType("Nope".to_string());
        assert!(err.node_id().is_none());
    }
}
