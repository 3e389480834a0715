//! Node factory registry
//!
//! Maps each [`NodeKind`] to the factory that constructs its operator.
//! The engine registers the kinds it implements itself with
//! [`NodeRegistry::with_core`]; crates providing agents, services and tools
//! submit theirs at link time:
//!
//! ```ignore
//! inventory::submit!(workflow_engine::FactoryRegistration {
//!     kind: NodeKind::DialogAgent,
//!     factory: agents::dialog::build,
//! });
//! ```
//!
//! [`NodeRegistry::with_builtins`] collects both.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::args::NodeArgs;
use crate::builder::BuildContext;
use crate::config::NodeSpec;
use crate::error::{Result, WorkflowError};
use crate::kind::NodeKind;
use crate::operator::{Operator, OperatorId};

/// Everything a factory needs to construct one node
#[derive(Debug, Clone)]
pub struct NodeRequest<'a> {
    pub node_id: &'a str,
    pub kind: NodeKind,
    pub spec: &'a NodeSpec,
    /// Already-built element operators, in declaration order
    pub dependencies: Vec<OperatorId>,
}

impl<'a> NodeRequest<'a> {
    pub fn args(&self) -> NodeArgs<'a> {
        NodeArgs::new(self.node_id, &self.spec.data.args)
    }

    pub fn source(&self) -> &'a Map<String, Value> {
        &self.spec.data.source
    }

    /// Fail unless the dependency count lies in `min..=max`
    pub fn expect_dependencies(&self, min: usize, max: usize) -> Result<()> {
        let actual = self.dependencies.len();
        if (min..=max).contains(&actual) {
            return Ok(());
        }
        let expected = if min == max {
            min.to_string()
        } else if max == usize::MAX {
            format!("at least {}", min)
        } else {
            format!("{} to {}", min, max)
        };
        Err(WorkflowError::InvalidArity {
            node_id: self.node_id.to_string(),
            kind: self.kind.name().to_string(),
            expected,
            actual,
        })
    }
}

/// Constructs the operator for one node
pub type OperatorFactory =
    fn(&NodeRequest<'_>, &mut BuildContext<'_>) -> Result<Arc<dyn Operator>>;

/// A factory submitted through `inventory`
pub struct FactoryRegistration {
    pub kind: NodeKind,
    pub factory: OperatorFactory,
}

inventory::collect!(FactoryRegistration);

/// Factory table keyed by node kind
#[derive(Clone, Default)]
pub struct NodeRegistry {
    factories: HashMap<NodeKind, OperatorFactory>,
}

impl NodeRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the kinds implemented by the engine itself:
    /// start, model, message, IF/ELSE and every pipeline operator
    pub fn with_core() -> Self {
        let mut registry = Self::new();
        crate::operators::register_core(&mut registry);
        registry
    }

    /// Core kinds plus every factory submitted by linked crates
    pub fn with_builtins() -> Self {
        let mut registry = Self::with_core();
        for entry in inventory::iter::<FactoryRegistration> {
            registry.register(entry.kind, entry.factory);
        }
        registry
    }

    pub fn register(&mut self, kind: NodeKind, factory: OperatorFactory) {
        if self.factories.insert(kind, factory).is_some() {
            log::debug!("Replaced factory for node type '{}'", kind);
        }
    }

    pub fn has_kind(&self, kind: NodeKind) -> bool {
        self.factories.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<NodeKind> {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort_by_key(|k| k.name());
        kinds
    }

    /// Construct the operator for `request`
    pub fn create(
        &self,
        request: &NodeRequest<'_>,
        ctx: &mut BuildContext<'_>,
    ) -> Result<Arc<dyn Operator>> {
        let factory = self
            .factories
            .get(&request.kind)
            .ok_or_else(|| WorkflowError::UnregisteredNodeType(request.kind.name().to_string()))?;
        factory(request, ctx)
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
