//! Broadcast scope
//!
//! A MsgHub wraps one pipeline. While it runs, every reply from an agent
//! inside that pipeline is observed by the other agents inside it.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::Agent;
use crate::builder::BuildContext;
use crate::error::{Result, WorkflowError};
use crate::kind::{NodeCategory, NodeKind};
use crate::operator::{HubFrame, Operator, OperatorId, OperatorTable, Outcome, Scope};
use crate::registry::NodeRequest;
use crate::value::{value_text, FlowValue, Msg, Role};

const DEFAULT_HOST: &str = "Host";
const DEFAULT_GREETING: &str = "Welcome!";

pub struct MsgHub {
    node_id: String,
    body: OperatorId,
    announcement: Msg,
    participants: Vec<(OperatorId, Arc<dyn Agent>)>,
}

impl MsgHub {
    pub fn announcement(&self) -> &Msg {
        &self.announcement
    }

    pub fn participant_names(&self) -> Vec<&str> {
        self.participants.iter().map(|(_, agent)| agent.name()).collect()
    }
}

#[async_trait]
impl Operator for MsgHub {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::MsgHub
    }

    fn children(&self) -> Vec<OperatorId> {
        vec![self.body]
    }

    async fn invoke(&self, input: FlowValue, scope: &Scope<'_>) -> Result<Outcome> {
        scope.enter_hub(HubFrame {
            participants: self.participants.clone(),
        });
        scope.speak(&self.announcement);
        for (_, agent) in &self.participants {
            agent.observe(&self.announcement);
        }
        let result = scope.call(self.body, input).await;
        scope.leave_hub();
        Ok(result?.into())
    }
}

/// Agents reachable from `root`, in first-seen order
fn collect_participants(
    node_id: &str,
    root: OperatorId,
    operators: &OperatorTable,
) -> Result<Vec<(OperatorId, Arc<dyn Agent>)>> {
    let mut participants = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        let id = operators.resolve(id);
        if !seen.insert(id) {
            continue;
        }
        let operator = operators.try_get(id)?;
        if let Some(agent) = operator.agent() {
            participants.push((id, agent));
        } else if operator.category() == NodeCategory::Pipeline {
            stack.extend(operator.children().into_iter().rev());
        } else {
            return Err(WorkflowError::InvalidParticipant {
                node_id: node_id.to_string(),
                participant: operator.node_id().to_string(),
            });
        }
    }
    Ok(participants)
}

pub(crate) fn build(
    request: &NodeRequest<'_>,
    ctx: &mut BuildContext<'_>,
) -> Result<Arc<dyn Operator>> {
    request.expect_dependencies(1, 1)?;
    let body = ctx.operators().resolve(request.dependencies[0]);
    let nested = ctx.operator(body)?;
    if nested.category() != NodeCategory::Pipeline {
        return Err(WorkflowError::InvalidParticipant {
            node_id: request.node_id.to_string(),
            participant: nested.node_id().to_string(),
        });
    }
    let participants = collect_participants(request.node_id, body, ctx.operators())?;

    let announcement = request.args().opt_object("announcement")?.unwrap_or_default();
    let name = announcement
        .get("name")
        .map(value_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let content = match announcement.get("content") {
        None | Some(Value::Null) => Value::String(DEFAULT_GREETING.to_string()),
        Some(content) => content.clone(),
    };

    log::debug!(
        "MsgHub '{}' gathers {} participants",
        request.node_id,
        participants.len()
    );
    Ok(Arc::new(MsgHub {
        node_id: request.node_id.to_string(),
        body: request.dependencies[0],
        announcement: Msg::new(name, content, Role::System),
        participants,
    }))
}
