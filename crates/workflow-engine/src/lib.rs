//! Workflow Engine - declarative agent workflows as operator graphs
//!
//! This crate turns a node-and-connection workflow description into a graph
//! of operators and runs it. It supports:
//!
//! - Dependency-ordered construction of nested composite nodes
//! - Cycle detection over the participating subgraph
//! - Ready-queue execution with IF/ELSE branch pruning
//! - Sequential, loop, if/else, switch and broadcast-scope composites
//!
//! # Architecture
//!
//! - `NodeKind`: the closed set of node types, each with a category
//! - `NodeRegistry`: factory table; leaf crates submit factories through
//!   `inventory`
//! - `GraphBuilder`: config to `Graph`, operators stored in an `OperatorTable`
//! - `WorkflowExecutor`: traverses a `Graph`, streaming `WorkflowEvent`s
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use workflow_engine::{GraphBuilder, LogEventSink, ModelRegistry, NodeRegistry, WorkflowExecutor};
//!
//! let registry = NodeRegistry::with_builtins();
//! let mut models = ModelRegistry::new();
//! let graph = GraphBuilder::new(&registry).build_value(config, &mut models)?;
//! WorkflowExecutor::with_random_id(Arc::new(LogEventSink)).run(&graph).await?;
//! ```

pub mod agent;
pub mod args;
pub mod builder;
pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod kind;
pub mod models;
pub mod operator;
pub mod operators;
pub mod registry;
pub mod value;

// Re-export key types
pub use agent::{Agent, AgentOperator, Memory};
pub use args::{CompiledExpression, NodeArgs};
pub use builder::{BuildContext, GraphBuilder};
pub use condition::{evaluate, Condition, ConditionOperator};
pub use config::{NodeSpec, WorkflowConfig};
pub use engine::{ExecutorOptions, WorkflowExecutor};
pub use error::{BoxError, Result, WorkflowError};
pub use events::{EventSink, LogEventSink, NullEventSink, VecEventSink, WorkflowEvent};
pub use graph::{Graph, GraphEdge, GraphNode};
pub use kind::{NodeCategory, NodeKind};
pub use models::{ChatModel, ModelConfig, ModelRegistry, ModelResponse};
pub use operator::{Operator, OperatorId, OperatorTable, Outcome, Scope};
pub use registry::{FactoryRegistration, NodeRegistry, NodeRequest, OperatorFactory};
pub use value::{FlowValue, Msg, Role};

// Re-export for leaf crates that submit factories
pub use inventory;
