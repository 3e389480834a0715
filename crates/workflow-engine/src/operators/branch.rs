//! If/else and switch pipelines

use std::sync::Arc;

use async_trait::async_trait;

use super::basic::required_condition;
use crate::args::CompiledExpression;
use crate::builder::BuildContext;
use crate::condition::Condition;
use crate::error::{Result, WorkflowError};
use crate::kind::NodeKind;
use crate::operator::{Operator, OperatorId, Outcome, Scope};
use crate::registry::NodeRequest;
use crate::value::{value_text, FlowValue};

/// Runs one of two bodies depending on a predicate
pub struct IfElsePipeline {
    node_id: String,
    condition: Condition,
    if_body: OperatorId,
    else_body: Option<OperatorId>,
}

impl IfElsePipeline {
    pub fn new(
        node_id: impl Into<String>,
        condition: Condition,
        if_body: OperatorId,
        else_body: Option<OperatorId>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            condition,
            if_body,
            else_body,
        }
    }
}

#[async_trait]
impl Operator for IfElsePipeline {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::IfElsePipeline
    }

    fn children(&self) -> Vec<OperatorId> {
        std::iter::once(self.if_body).chain(self.else_body).collect()
    }

    async fn invoke(&self, input: FlowValue, scope: &Scope<'_>) -> Result<Outcome> {
        let target = if self.condition.evaluate(&input)? {
            Some(self.if_body)
        } else {
            self.else_body
        };
        match target {
            Some(body) => Ok(scope.call(body, input).await?.into()),
            None => Ok(input.into()),
        }
    }
}

pub(crate) fn build_if_else(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> Result<Arc<dyn Operator>> {
    request.expect_dependencies(1, 2)?;
    let condition = required_condition(request)?;
    Ok(Arc::new(IfElsePipeline::new(
        request.node_id,
        condition,
        request.dependencies[0],
        request.dependencies.get(1).copied(),
    )))
}

/// Dispatches on a case key extracted from the input
pub struct SwitchPipeline {
    node_id: String,
    key: CompiledExpression,
    cases: Vec<(String, OperatorId)>,
    default: Option<OperatorId>,
}

impl SwitchPipeline {
    pub fn new(
        node_id: impl Into<String>,
        key: CompiledExpression,
        cases: Vec<(String, OperatorId)>,
        default: Option<OperatorId>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            key,
            cases,
            default,
        }
    }

    fn route(&self, key: &str) -> Option<OperatorId> {
        self.cases
            .iter()
            .find(|(label, _)| label == key)
            .map(|(_, id)| *id)
            .or(self.default)
    }
}

#[async_trait]
impl Operator for SwitchPipeline {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::SwitchPipeline
    }

    fn children(&self) -> Vec<OperatorId> {
        self.cases
            .iter()
            .map(|(_, id)| *id)
            .chain(self.default)
            .collect()
    }

    async fn invoke(&self, input: FlowValue, scope: &Scope<'_>) -> Result<Outcome> {
        let key = value_text(&(self.key)(&input)?);
        match self.route(&key) {
            Some(body) => {
                log::debug!("Switch '{}' routed '{}' to {}", self.node_id, key, body);
                Ok(scope.call(body, input).await?.into())
            }
            None => Ok(input.into()),
        }
    }
}

pub(crate) fn build_switch(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> Result<Arc<dyn Operator>> {
    let args = request.args();
    let labels = args.str_list("cases")?;
    let dependencies = &request.dependencies;
    if dependencies.is_empty()
        || (dependencies.len() != labels.len() && dependencies.len() != labels.len() + 1)
    {
        return Err(WorkflowError::CaseCountMismatch {
            node_id: request.node_id.to_string(),
            cases: labels.len(),
            dependencies: dependencies.len(),
        });
    }
    let key = args.expression("condition_func")?.ok_or_else(|| {
        WorkflowError::invalid_argument(request.node_id, "condition_func", "required argument is missing")
    })?;

    let default = dependencies.get(labels.len()).copied();
    let cases = labels.into_iter().zip(dependencies.iter().copied()).collect();
    Ok(Arc::new(SwitchPipeline::new(request.node_id, key, cases, default)))
}
