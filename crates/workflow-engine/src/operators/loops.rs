//! For-loop and while-loop pipelines

use std::sync::Arc;

use async_trait::async_trait;

use crate::args::CompiledExpression;
use crate::builder::BuildContext;
use crate::condition::{is_truthy, Condition};
use crate::error::Result;
use crate::kind::NodeKind;
use crate::operator::{Operator, OperatorId, Outcome, Scope};
use crate::registry::NodeRequest;
use crate::value::FlowValue;

const DEFAULT_MAX_LOOP: u64 = 1;

/// Repeats its body, checking the break predicate after every iteration
pub struct ForLoopPipeline {
    node_id: String,
    body: OperatorId,
    max_loop: u64,
    break_on: Option<Condition>,
}

impl ForLoopPipeline {
    pub fn new(
        node_id: impl Into<String>,
        body: OperatorId,
        max_loop: u64,
        break_on: Option<Condition>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            body,
            max_loop,
            break_on,
        }
    }
}

#[async_trait]
impl Operator for ForLoopPipeline {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::ForLoopPipeline
    }

    fn children(&self) -> Vec<OperatorId> {
        vec![self.body]
    }

    async fn invoke(&self, input: FlowValue, scope: &Scope<'_>) -> Result<Outcome> {
        let mut value = input;
        for iteration in 0..self.max_loop {
            value = scope.call(self.body, value).await?;
            if let Some(condition) = &self.break_on {
                if condition.evaluate(&value)? {
                    log::debug!(
                        "For-loop '{}' broke after iteration {}",
                        self.node_id,
                        iteration + 1
                    );
                    break;
                }
            }
        }
        Ok(value.into())
    }
}

pub(crate) fn build_for_loop(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> Result<Arc<dyn Operator>> {
    request.expect_dependencies(1, 1)?;
    let args = request.args();
    let max_loop = args.opt_u64("max_loop")?.unwrap_or(DEFAULT_MAX_LOOP);
    Ok(Arc::new(ForLoopPipeline::new(
        request.node_id,
        request.dependencies[0],
        max_loop,
        args.condition()?,
    )))
}

/// Continuation test of a while-loop
#[derive(Clone)]
pub enum LoopCondition {
    Predicate(Condition),
    Expression(CompiledExpression),
}

impl LoopCondition {
    fn holds(&self, value: &FlowValue) -> Result<bool> {
        match self {
            Self::Predicate(condition) => condition.evaluate(value),
            Self::Expression(f) => Ok(is_truthy(&f(value)?)),
        }
    }
}

/// Repeats its body while the condition holds for the current value
pub struct WhileLoopPipeline {
    node_id: String,
    body: OperatorId,
    condition: Option<LoopCondition>,
    max_loop: Option<u64>,
}

impl WhileLoopPipeline {
    pub fn new(
        node_id: impl Into<String>,
        body: OperatorId,
        condition: Option<LoopCondition>,
        max_loop: Option<u64>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            body,
            condition,
            max_loop,
        }
    }
}

#[async_trait]
impl Operator for WhileLoopPipeline {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::WhileLoopPipeline
    }

    fn children(&self) -> Vec<OperatorId> {
        vec![self.body]
    }

    async fn invoke(&self, input: FlowValue, scope: &Scope<'_>) -> Result<Outcome> {
        let Some(condition) = &self.condition else {
            return Ok(input.into());
        };
        let mut value = input;
        let mut iterations = 0u64;
        while condition.holds(&value)? {
            if self.max_loop.is_some_and(|max| iterations >= max) {
                log::debug!("While-loop '{}' hit max_loop {}", self.node_id, iterations);
                break;
            }
            value = scope.call(self.body, value).await?;
            iterations += 1;
        }
        Ok(value.into())
    }
}

pub(crate) fn build_while_loop(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> Result<Arc<dyn Operator>> {
    request.expect_dependencies(1, 1)?;
    let args = request.args();
    let condition = match args.condition()? {
        Some(condition) => Some(LoopCondition::Predicate(condition)),
        None if args.contains("condition_func") => args
            .expression("condition_func")?
            .map(LoopCondition::Expression),
        None => {
            log::warn!(
                "While-loop '{}' has no condition; it will pass its input through",
                request.node_id
            );
            None
        }
    };
    Ok(Arc::new(WhileLoopPipeline::new(
        request.node_id,
        request.dependencies[0],
        condition,
        args.opt_u64("max_loop")?,
    )))
}
