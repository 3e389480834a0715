//! Workflow Nodes
//!
//! Agent, service and tool nodes for the workflow engine, plus the chat
//! model clients agents talk to. Every node type here submits its factory
//! through `inventory`, so linking this crate is enough for
//! `NodeRegistry::with_builtins()` to construct it.
//!
//! # Categories
//!
//! - **Agents**: dialog, dict dialog, user, ReAct, broadcast and
//!   text-to-image agents
//! - **Services**: file reading and writing, Python execution; also usable
//!   as ReAct tools
//! - **Tools**: HTTP POST, Python code and image composition nodes
//! - **Models**: OpenAI-compatible and generic POST chat clients, DALL-E
//!   style and DashScope image clients
//!
//! Search, audio, text-to-image service and video node types are known to
//! the engine but have no factory here; configs using them fail to build
//! with `UnregisteredNodeType`.

pub mod agents;
pub mod error;
pub mod model;
pub mod python;
pub mod services;
pub mod tools;

#[cfg(test)]
mod testing;

pub use error::{NodeError, Result};
pub use model::{chat_model_for, image_model_for};

use workflow_engine::{NodeKind, NodeRegistry};

/// Node types with no factory in `registry`
///
/// Binaries call this at startup; it also keeps this crate's
/// registrations linked in.
pub fn missing_kinds(registry: &NodeRegistry) -> Vec<NodeKind> {
    NodeKind::all().filter(|kind| !registry.has_kind(*kind)).collect()
}
