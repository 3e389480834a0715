//! Event types for observing workflow runs
//!
//! The executor reports run and node lifecycle through an [`EventSink`];
//! operators report what they speak. Events are the transcript of a run:
//! the engine itself returns no value.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::Msg;

/// Trait for sending workflow events
///
/// This abstracts over the transport (log, channel, collector), allowing
/// the engine to be embedded in different hosts.
pub trait EventSink: Send + Sync {
    /// Returns an error if the event could not be delivered
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone, Error)]
#[error("Event error: {message}")]
pub struct EventError {
    pub message: String,
}

/// Events emitted during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    #[serde(rename_all = "camelCase")]
    RunStarted { run_id: String },

    #[serde(rename_all = "camelCase")]
    RunCompleted { run_id: String },

    #[serde(rename_all = "camelCase")]
    RunFailed { run_id: String, error: String },

    #[serde(rename_all = "camelCase")]
    NodeStarted { run_id: String, node_id: String },

    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        run_id: String,
        node_id: String,
        output: serde_json::Value,
    },

    #[serde(rename_all = "camelCase")]
    NodeFailed {
        run_id: String,
        node_id: String,
        error: String,
    },

    /// An operator spoke a message
    #[serde(rename_all = "camelCase")]
    MessageSpoken { run_id: String, message: Msg },
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Forwards events to the `log` facade
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        match &event {
            WorkflowEvent::MessageSpoken { message, .. } => {
                log::info!("{}: {}", message.name, message.text());
            }
            WorkflowEvent::RunFailed { run_id, error } => {
                log::error!("Run {} failed: {}", run_id, error);
            }
            WorkflowEvent::NodeFailed { node_id, error, .. } => {
                log::error!("Node {} failed: {}", node_id, error);
            }
            WorkflowEvent::NodeCompleted {
                node_id, output, ..
            } => {
                log::debug!("node_id: {}\nout_values: {}", node_id, output);
            }
            other => log::debug!("{:?}", other),
        }
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    /// Node ids in the order they completed
    pub fn completed_nodes(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::NodeCompleted { node_id, .. } => Some(node_id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Node ids in the order they started
    pub fn started_nodes(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::NodeStarted { node_id, .. } => Some(node_id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Output recorded for a node, if it completed
    pub fn output_of(&self, node: &str) -> Option<serde_json::Value> {
        self.events.lock().iter().find_map(|e| match e {
            WorkflowEvent::NodeCompleted {
                node_id, output, ..
            } if node_id == node => Some(output.clone()),
            _ => None,
        })
    }

    /// Messages spoken during the run
    pub fn spoken(&self) -> Vec<Msg> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::MessageSpoken { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Role;

    #[test]
    fn test_vec_event_sink() {
        let sink = VecEventSink::new();

        sink.send(WorkflowEvent::NodeStarted {
            run_id: "r".into(),
            node_id: "1".into(),
        })
        .unwrap();
        sink.send(WorkflowEvent::NodeCompleted {
            run_id: "r".into(),
            node_id: "1".into(),
            output: serde_json::json!("x"),
        })
        .unwrap();

        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.started_nodes(), vec!["1"]);
        assert_eq!(sink.output_of("1"), Some(serde_json::json!("x")));
        assert!(sink.output_of("2").is_none());

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = WorkflowEvent::MessageSpoken {
            run_id: "r".into(),
            message: Msg::new("Host", "Welcome!", Role::System),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "messageSpoken");
        assert_eq!(json["runId"], "r");
        assert_eq!(json["message"]["content"], "Welcome!");
    }

    #[test]
    fn test_null_and_log_sinks_accept_events() {
        NullEventSink
            .send(WorkflowEvent::RunStarted { run_id: "r".into() })
            .unwrap();
        LogEventSink
            .send(WorkflowEvent::RunCompleted { run_id: "r".into() })
            .unwrap();
    }
}
