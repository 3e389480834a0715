//! Start, model, message and IF/ELSE nodes

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::builder::BuildContext;
use crate::condition::Condition;
use crate::error::{Result, WorkflowError};
use crate::kind::NodeKind;
use crate::models::ModelConfig;
use crate::operator::{Operator, Outcome, Scope};
use crate::registry::NodeRequest;
use crate::value::{FlowValue, Msg, Role};

/// Entry point of a run; passes its input through
pub struct StartOperator {
    node_id: String,
}

#[async_trait]
impl Operator for StartOperator {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Start
    }

    async fn invoke(&self, input: FlowValue, _scope: &Scope<'_>) -> Result<Outcome> {
        Ok(input.into())
    }
}

pub(crate) fn build_start(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> Result<Arc<dyn Operator>> {
    Ok(Arc::new(StartOperator {
        node_id: request.node_id.to_string(),
    }))
}

/// A model configuration node
///
/// Construction registers the configuration; the operator itself is never
/// scheduled and passes its input through if invoked.
pub struct ModelOperator {
    node_id: String,
    kind: NodeKind,
    config_name: String,
}

impl ModelOperator {
    pub fn config_name(&self) -> &str {
        &self.config_name
    }
}

#[async_trait]
impl Operator for ModelOperator {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    async fn invoke(&self, input: FlowValue, _scope: &Scope<'_>) -> Result<Outcome> {
        Ok(input.into())
    }
}

pub(crate) fn build_model(
    request: &NodeRequest<'_>,
    ctx: &mut BuildContext<'_>,
) -> Result<Arc<dyn Operator>> {
    let mut fields = request.spec.data.args.clone();
    fields
        .entry("model_type")
        .or_insert_with(|| Value::String(request.kind.name().to_string()));
    let config: ModelConfig = serde_json::from_value(Value::Object(fields)).map_err(|e| {
        WorkflowError::invalid_argument(request.node_id, "config_name", e.to_string())
    })?;
    let config_name = config.config_name.clone();
    ctx.models_mut().register_config(config);

    Ok(Arc::new(ModelOperator {
        node_id: request.node_id.to_string(),
        kind: request.kind,
        config_name,
    }))
}

/// Speaks a fixed message and returns it
pub struct MessageOperator {
    node_id: String,
    msg: Msg,
}

impl MessageOperator {
    pub fn new(node_id: impl Into<String>, msg: Msg) -> Self {
        Self {
            node_id: node_id.into(),
            msg,
        }
    }
}

#[async_trait]
impl Operator for MessageOperator {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Message
    }

    async fn invoke(&self, _input: FlowValue, scope: &Scope<'_>) -> Result<Outcome> {
        scope.speak(&self.msg);
        Ok(FlowValue::from(self.msg.clone()).into())
    }
}

pub(crate) fn build_message(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> Result<Arc<dyn Operator>> {
    let args = request.args();
    let role_name = args.str_or("role", Role::Assistant.as_str())?;
    let role = Role::parse(&role_name).ok_or_else(|| {
        WorkflowError::invalid_argument(request.node_id, "role", format!("unknown role '{}'", role_name))
    })?;
    let content = args.literal("content")?.unwrap_or(Value::Null);
    let mut msg = Msg::new(args.str("name")?, content, role);
    if let Some(url) = args.literal("url")? {
        msg = msg.with_url(match url {
            Value::Array(items) => items.iter().map(crate::value::value_text).collect(),
            other => vec![crate::value::value_text(&other)],
        });
    }

    Ok(Arc::new(MessageOperator::new(request.node_id, msg)))
}

/// IF/ELSE node: evaluates its predicate and routes the engine's fan-out
pub struct ConditionalOperator {
    node_id: String,
    condition: Condition,
}

impl ConditionalOperator {
    pub fn new(node_id: impl Into<String>, condition: Condition) -> Self {
        Self {
            node_id: node_id.into(),
            condition,
        }
    }
}

#[async_trait]
impl Operator for ConditionalOperator {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::IfElse
    }

    async fn invoke(&self, input: FlowValue, _scope: &Scope<'_>) -> Result<Outcome> {
        let taken = self.condition.evaluate(&input)?;
        log::debug!(
            "IF/ELSE '{}': {} '{}' -> {}",
            self.node_id,
            self.condition.operator,
            self.condition.target,
            taken
        );
        Ok(Outcome::branch(input, taken))
    }
}

/// Output ports of a Conditional node: taken, then untaken
const BRANCH_PORTS: [&str; 2] = ["output_1", "output_2"];

pub(crate) fn build_conditional(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> Result<Arc<dyn Operator>> {
    let condition = required_condition(request)?;

    let mut ports: Vec<&str> = request.spec.outputs.iter().map(|p| p.name.as_str()).collect();
    ports.sort_unstable();
    if ports != BRANCH_PORTS {
        return Err(WorkflowError::InvalidConfig(format!(
            "IF/ELSE node '{}' must expose exactly the ports {}, found [{}]",
            request.node_id,
            BRANCH_PORTS.join(" and "),
            ports.join(", ")
        )));
    }
    Ok(Arc::new(ConditionalOperator::new(request.node_id, condition)))
}

/// `condition_op` / `target_value` for nodes that cannot work without them
pub(crate) fn required_condition(request: &NodeRequest<'_>) -> Result<Condition> {
    request.args().condition()?.ok_or_else(|| {
        WorkflowError::invalid_argument(request.node_id, "condition_op", "required argument is missing")
    })
}
