//! Operators and the operator arena
//!
//! Every constructed node owns (or, for Copy nodes, aliases) an operator
//! stored in an [`OperatorTable`]. Composite operators refer to their
//! children by [`OperatorId`] and invoke them through the [`Scope`] of the
//! current run, so two graph positions can share one operator without
//! sharing ownership.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::agent::Agent;
use crate::error::{Result, WorkflowError};
use crate::events::{EventSink, WorkflowEvent};
use crate::kind::{NodeCategory, NodeKind};
use crate::value::{FlowValue, Msg};

/// Handle into an [`OperatorTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OperatorId(usize);

impl OperatorId {
    #[cfg(test)]
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of invoking an operator
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub value: FlowValue,
    /// Branch taken by a Conditional node; `None` for everything else
    pub branch: Option<bool>,
}

impl Outcome {
    pub fn branch(value: FlowValue, taken: bool) -> Self {
        Self {
            value,
            branch: Some(taken),
        }
    }
}

impl From<FlowValue> for Outcome {
    fn from(value: FlowValue) -> Self {
        Self {
            value,
            branch: None,
        }
    }
}

/// The runtime object built for a node
#[async_trait]
pub trait Operator: Send + Sync {
    fn node_id(&self) -> &str;

    fn kind(&self) -> NodeKind;

    fn category(&self) -> NodeCategory {
        self.kind().category()
    }

    /// Stable variable name, unique per node id
    fn var_name(&self) -> String {
        format!("{}_{}", self.category(), self.node_id())
    }

    /// Child operators, in invocation order
    fn children(&self) -> Vec<OperatorId> {
        Vec::new()
    }

    /// The operator this one stands in for (Copy nodes)
    fn alias_of(&self) -> Option<OperatorId> {
        None
    }

    /// The agent behind this operator, for broadcast scopes
    fn agent(&self) -> Option<Arc<dyn Agent>> {
        None
    }

    async fn invoke(&self, input: FlowValue, scope: &Scope<'_>) -> Result<Outcome>;
}

/// Arena of constructed operators
#[derive(Default, Clone)]
pub struct OperatorTable {
    operators: Vec<Arc<dyn Operator>>,
}

impl OperatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operator: Arc<dyn Operator>) -> OperatorId {
        self.operators.push(operator);
        OperatorId(self.operators.len() - 1)
    }

    pub fn get(&self, id: OperatorId) -> Option<&Arc<dyn Operator>> {
        self.operators.get(id.0)
    }

    pub fn try_get(&self, id: OperatorId) -> Result<&Arc<dyn Operator>> {
        self.get(id)
            .ok_or_else(|| WorkflowError::failed(format!("no operator at {}", id)))
    }

    /// Follow Copy aliases to the operator that does the work
    pub fn resolve(&self, mut id: OperatorId) -> OperatorId {
        let mut seen = HashSet::new();
        while let Some(target) = self.get(id).and_then(|op| op.alias_of()) {
            if !seen.insert(id) {
                break;
            }
            id = target;
        }
        id
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (OperatorId, &Arc<dyn Operator>)> {
        self.operators
            .iter()
            .enumerate()
            .map(|(i, op)| (OperatorId(i), op))
    }
}

impl fmt::Debug for OperatorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.operators.iter().map(|op| op.var_name()))
            .finish()
    }
}

/// One active broadcast scope
#[derive(Clone)]
pub struct HubFrame {
    pub participants: Vec<(OperatorId, Arc<dyn Agent>)>,
}

impl HubFrame {
    pub fn includes(&self, id: OperatorId) -> bool {
        self.participants.iter().any(|(pid, _)| *pid == id)
    }
}

/// Per-run invocation context handed to every operator
pub struct Scope<'a> {
    operators: &'a OperatorTable,
    events: &'a dyn EventSink,
    run_id: &'a str,
    hubs: Mutex<Vec<HubFrame>>,
}

impl<'a> Scope<'a> {
    pub fn new(operators: &'a OperatorTable, events: &'a dyn EventSink, run_id: &'a str) -> Self {
        Self {
            operators,
            events,
            run_id,
            hubs: Mutex::new(Vec::new()),
        }
    }

    pub fn run_id(&self) -> &str {
        self.run_id
    }

    pub fn operators(&self) -> &OperatorTable {
        self.operators
    }

    /// Invoke an operator and keep only its value
    pub async fn call(&self, id: OperatorId, input: FlowValue) -> Result<FlowValue> {
        Ok(self.invoke(id, input).await?.value)
    }

    /// Invoke an operator by handle
    ///
    /// Replies from agents are delivered to the other participants of every
    /// active broadcast scope that includes the speaker.
    pub async fn invoke(&self, id: OperatorId, input: FlowValue) -> Result<Outcome> {
        let operator = self.operators.try_get(id)?.clone();
        log::debug!("Invoking {} ({})", operator.var_name(), id);
        let outcome = operator.invoke(input, self).await?;
        if operator.agent().is_some() {
            if let FlowValue::Message(msg) = &outcome.value {
                self.broadcast(id, msg);
            }
        }
        Ok(outcome)
    }

    /// Emit a message to the run's transcript
    pub fn speak(&self, msg: &Msg) {
        log::debug!("{}: {}", msg.name, msg.text());
        let event = WorkflowEvent::MessageSpoken {
            run_id: self.run_id.to_string(),
            message: msg.clone(),
        };
        if let Err(e) = self.events.send(event) {
            log::warn!("Failed to deliver message event: {}", e);
        }
    }

    pub fn enter_hub(&self, frame: HubFrame) {
        self.hubs.lock().push(frame);
    }

    pub fn leave_hub(&self) {
        self.hubs.lock().pop();
    }

    pub fn active_hubs(&self) -> usize {
        self.hubs.lock().len()
    }

    fn broadcast(&self, speaker: OperatorId, msg: &Msg) {
        let recipients: Vec<Arc<dyn Agent>> = {
            let hubs = self.hubs.lock();
            let mut seen = HashSet::new();
            hubs.iter()
                .filter(|frame| frame.includes(speaker))
                .flat_map(|frame| frame.participants.iter())
                .filter(|(id, _)| *id != speaker && seen.insert(*id))
                .map(|(_, agent)| agent.clone())
                .collect()
        };
        for agent in recipients {
            agent.observe(msg);
        }
    }
}
