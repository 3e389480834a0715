//! Agent collaborator contract
//!
//! Agents are leaf participants: they reply to an input and observe
//! messages spoken by others while inside a broadcast scope. Concrete
//! agents live outside the engine; the engine only sees this trait.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::kind::NodeKind;
use crate::operator::{Operator, Outcome, Scope};
use crate::value::{FlowValue, Msg};

#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a reply. Implementations speak through `scope` themselves.
    async fn reply(&self, input: FlowValue, scope: &Scope<'_>) -> Result<Msg>;

    /// Receive a message spoken by another participant
    fn observe(&self, msg: &Msg);
}

/// Append-only conversation memory shared by agent implementations
///
/// A message already held (same id) is not added twice; inside a broadcast
/// scope an agent can both observe a reply and receive it as input.
#[derive(Debug, Default)]
pub struct Memory {
    messages: Mutex<Vec<Msg>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, msg: Msg) {
        let mut messages = self.messages.lock();
        if !messages.iter().any(|m| m.id == msg.id) {
            messages.push(msg);
        }
    }

    pub fn extend(&self, msgs: impl IntoIterator<Item = Msg>) {
        for msg in msgs {
            self.add(msg);
        }
    }

    pub fn snapshot(&self) -> Vec<Msg> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

/// Operator adapter around an [`Agent`]
pub struct AgentOperator {
    node_id: String,
    kind: NodeKind,
    agent: Arc<dyn Agent>,
}

impl AgentOperator {
    pub fn new(node_id: impl Into<String>, kind: NodeKind, agent: Arc<dyn Agent>) -> Self {
        Self {
            node_id: node_id.into(),
            kind,
            agent,
        }
    }
}

#[async_trait]
impl Operator for AgentOperator {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn agent(&self) -> Option<Arc<dyn Agent>> {
        Some(self.agent.clone())
    }

    async fn invoke(&self, input: FlowValue, scope: &Scope<'_>) -> Result<Outcome> {
        let reply = self.agent.reply(input, scope).await?;
        Ok(FlowValue::from(reply).into())
    }
}
