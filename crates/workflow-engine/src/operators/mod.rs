//! Operators implemented by the engine
//!
//! - **basic**: start, model, message and the IF/ELSE branch node
//! - **sequential**: ordered pipelines
//! - **loops**: for-loop and while-loop pipelines
//! - **branch**: if/else and switch pipelines
//! - **hub**: broadcast scopes (MsgHub)
//! - **alias**: copy and placeholder

mod alias;
mod basic;
mod branch;
mod hub;
mod loops;
mod sequential;

pub use alias::{CopyOperator, Placeholder};
pub use basic::{ConditionalOperator, MessageOperator, ModelOperator, StartOperator};
pub use branch::{IfElsePipeline, SwitchPipeline};
pub use hub::MsgHub;
pub use loops::{ForLoopPipeline, WhileLoopPipeline};
pub use sequential::SequentialPipeline;

use crate::kind::NodeKind;
use crate::registry::NodeRegistry;

pub(crate) fn register_core(registry: &mut NodeRegistry) {
    registry.register(NodeKind::Start, basic::build_start);
    for kind in [
        NodeKind::DashScopeChat,
        NodeKind::OpenAiChat,
        NodeKind::PostApiChat,
        NodeKind::PostApiDallE,
        NodeKind::DashScopeImageSynthesis,
    ] {
        registry.register(kind, basic::build_model);
    }
    registry.register(NodeKind::Message, basic::build_message);
    registry.register(NodeKind::IfElse, basic::build_conditional);
    registry.register(NodeKind::Placeholder, alias::build_placeholder);
    registry.register(NodeKind::Copy, alias::build_copy);
    registry.register(NodeKind::SequentialPipeline, sequential::build);
    registry.register(NodeKind::ForLoopPipeline, loops::build_for_loop);
    registry.register(NodeKind::WhileLoopPipeline, loops::build_while_loop);
    registry.register(NodeKind::IfElsePipeline, branch::build_if_else);
    registry.register(NodeKind::SwitchPipeline, branch::build_switch);
    registry.register(NodeKind::MsgHub, hub::build);
}
