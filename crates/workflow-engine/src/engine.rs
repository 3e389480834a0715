//! Graph traversal
//!
//! The executor walks the participating subgraph from its Start nodes with
//! a ready queue:
//!
//! - a node runs once every participating predecessor has run, and at most
//!   once per run;
//! - its input is `Null`, the single predecessor output, or a list of
//!   predecessor outputs in edge order;
//! - a Conditional node only releases the successors wired to the port of
//!   the branch it took, so the other side of the branch never runs.
//!
//! Nodes left waiting on a predecessor that will never run (for example a
//! join behind an untaken branch) are reported and skipped once a full pass
//! over the queue makes no progress.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::{Result, WorkflowError};
use crate::events::{EventSink, WorkflowEvent};
use crate::graph::Graph;
use crate::kind::NodeCategory;
use crate::operator::Scope;
use crate::value::FlowValue;

/// Executor configuration
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Fail the run, instead of skipping them, when nodes can never
    /// become ready
    pub fail_on_blocked: bool,
}

/// Runs built graphs
pub struct WorkflowExecutor {
    run_id: String,
    event_sink: Arc<dyn EventSink>,
    options: ExecutorOptions,
}

impl WorkflowExecutor {
    pub fn new(run_id: impl Into<String>, event_sink: Arc<dyn EventSink>) -> Self {
        Self {
            run_id: run_id.into(),
            event_sink,
            options: ExecutorOptions::default(),
        }
    }

    /// Executor with a fresh random run id
    pub fn with_random_id(event_sink: Arc<dyn EventSink>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), event_sink)
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Send an event, logging delivery failures
    pub fn send_event(&self, event: WorkflowEvent) {
        if let Err(e) = self.event_sink.send(event) {
            log::warn!("Failed to deliver workflow event: {}", e);
        }
    }

    /// Execute `graph` to completion
    pub async fn run(&self, graph: &Graph) -> Result<()> {
        let starts: Vec<&str> = graph
            .roots()
            .into_iter()
            .filter(|n| n.kind.category() == NodeCategory::Start)
            .map(|n| n.id.as_str())
            .collect();
        if starts.is_empty() {
            return Err(WorkflowError::NoStartNode);
        }

        self.send_event(WorkflowEvent::RunStarted {
            run_id: self.run_id.clone(),
        });
        log::info!("Run '{}' starting from {:?}", self.run_id, starts);

        match self.traverse(graph, starts).await {
            Ok(()) => {
                self.send_event(WorkflowEvent::RunCompleted {
                    run_id: self.run_id.clone(),
                });
                Ok(())
            }
            Err(e) => {
                self.send_event(WorkflowEvent::RunFailed {
                    run_id: self.run_id.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn traverse(&self, graph: &Graph, starts: Vec<&str>) -> Result<()> {
        let scope = Scope::new(graph.operators(), self.event_sink.as_ref(), &self.run_id);
        let mut queue: VecDeque<&str> = starts.into_iter().collect();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut values: HashMap<&str, FlowValue> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();
        // consecutive requeues without a node running
        let mut stalled = 0usize;

        while let Some(id) = queue.pop_front() {
            if visited.contains(id) {
                continue;
            }
            let predecessors: Vec<&str> = graph
                .predecessors(id)
                .into_iter()
                .filter(|p| !is_model(graph, p))
                .collect();

            if predecessors.iter().any(|p| !visited.contains(p)) {
                queue.push_back(id);
                stalled += 1;
                if stalled > queue.len() {
                    self.handle_blocked(queue.iter().copied().collect())?;
                    break;
                }
                continue;
            }
            stalled = 0;

            let input = match predecessors.as_slice() {
                [] => FlowValue::Null,
                [single] => values.get(single).cloned().unwrap_or_default(),
                many => FlowValue::List(
                    many.iter()
                        .map(|p| values.get(p).cloned().unwrap_or_default())
                        .collect(),
                ),
            };

            let Some(node) = graph.node(id) else {
                continue;
            };
            self.send_event(WorkflowEvent::NodeStarted {
                run_id: self.run_id.clone(),
                node_id: id.to_string(),
            });
            log::debug!("Node '{}' ({}) input: {}", id, node.kind, input.text());

            let outcome = match scope.invoke(node.operator, input).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let error = match e {
                        WorkflowError::ValueExtraction { .. } | WorkflowError::NodeFailed { .. } => e,
                        other => WorkflowError::at_node(id, other),
                    };
                    self.send_event(WorkflowEvent::NodeFailed {
                        run_id: self.run_id.clone(),
                        node_id: id.to_string(),
                        error: error.to_string(),
                    });
                    return Err(error);
                }
            };
            log::debug!("Node '{}' output: {}", id, outcome.value.text());
            self.send_event(WorkflowEvent::NodeCompleted {
                run_id: self.run_id.clone(),
                node_id: id.to_string(),
                output: outcome.value.to_json(),
            });

            visited.insert(id);
            order.push(id);

            let successors = if node.kind.category() == NodeCategory::Conditional {
                graph.branch_successors(id, outcome.branch.unwrap_or(true))
            } else {
                graph.successors(id)
            };
            values.insert(id, outcome.value);
            queue.extend(successors.into_iter().filter(|s| !visited.contains(s)));
        }

        log::info!("Run '{}' visited {:?}", self.run_id, order);
        Ok(())
    }

    fn handle_blocked(&self, mut blocked: Vec<&str>) -> Result<()> {
        blocked.sort_unstable();
        blocked.dedup();
        if self.options.fail_on_blocked {
            return Err(WorkflowError::failed(format!(
                "nodes can never become ready: {}",
                blocked.join(", ")
            )));
        }
        log::warn!(
            "Run '{}' skipping nodes whose inputs never completed: {}",
            self.run_id,
            blocked.join(", ")
        );
        Ok(())
    }
}

fn is_model(graph: &Graph, id: &str) -> bool {
    graph
        .node(id)
        .is_some_and(|n| n.kind.category() == NodeCategory::Model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentOperator;
    use crate::builder::{BuildContext, GraphBuilder};
    use crate::events::{EventError, VecEventSink};
    use crate::kind::NodeKind;
    use crate::models::ModelRegistry;
    use crate::operator::{Operator, Outcome};
    use crate::operators::testing::Recorder;
    use crate::registry::{NodeRegistry, NodeRequest};
    use serde_json::{json, Value};

    fn echo_agent(
        request: &NodeRequest<'_>,
        _ctx: &mut BuildContext<'_>,
    ) -> Result<Arc<dyn Operator>> {
        let agent = Recorder::new(&format!("agent{}", request.node_id));
        Ok(Arc::new(AgentOperator::new(request.node_id, request.kind, agent)))
    }

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::with_core();
        registry.register(NodeKind::DialogAgent, echo_agent);
        registry
    }

    fn graph(doc: Value) -> Graph {
        let registry = registry();
        let mut models = ModelRegistry::new();
        GraphBuilder::new(&registry).build_value(doc, &mut models).unwrap()
    }

    fn link(from: &str) -> Value {
        json!({"input_1": {"connections": [{"node": from, "input": "output_1"}]}})
    }

    async fn run(doc: Value) -> (Result<()>, Arc<VecEventSink>) {
        let graph = graph(doc);
        let sink = Arc::new(VecEventSink::new());
        let result = WorkflowExecutor::new("test-run", sink.clone()).run(&graph).await;
        (result, sink)
    }

    #[tokio::test]
    async fn test_linear_agent_then_message() {
        let (result, sink) = run(json!({
            "1": {"name": "start", "data": {}},
            "2": {"name": "DialogAgent", "data": {"args": {"name": "echo"}}, "inputs": link("1")},
            "3": {"name": "Message", "data": {"args": {"name": "Host", "content": "bye"}}, "inputs": link("2")}
        }))
        .await;

        result.unwrap();
        assert_eq!(sink.completed_nodes(), vec!["1", "2", "3"]);
        let spoken: Vec<String> = sink.spoken().iter().map(|m| m.text()).collect();
        assert_eq!(spoken, vec!["agent2 heard ", "bye"]);
        assert!(matches!(sink.events().last(), Some(WorkflowEvent::RunCompleted { .. })));
    }

    /// Inputs seen by Message nodes built through `tapped_message`
    static MESSAGE_INPUTS: parking_lot::Mutex<Vec<(String, Value)>> =
        parking_lot::Mutex::new(Vec::new());

    struct TappedMessage(Arc<dyn Operator>);

    #[async_trait::async_trait]
    impl Operator for TappedMessage {
        fn node_id(&self) -> &str {
            self.0.node_id()
        }

        fn kind(&self) -> NodeKind {
            self.0.kind()
        }

        async fn invoke(&self, input: FlowValue, scope: &Scope<'_>) -> Result<Outcome> {
            MESSAGE_INPUTS
                .lock()
                .push((self.node_id().to_string(), input.to_json()));
            self.0.invoke(input, scope).await
        }
    }

    fn tapped_message(
        request: &NodeRequest<'_>,
        ctx: &mut BuildContext<'_>,
    ) -> Result<Arc<dyn Operator>> {
        let inner = NodeRegistry::with_core().create(request, ctx)?;
        Ok(Arc::new(TappedMessage(inner)))
    }

    #[tokio::test]
    async fn test_message_receives_agent_output() {
        let mut registry = registry();
        registry.register(NodeKind::Message, tapped_message);
        let mut models = ModelRegistry::new();
        let graph = GraphBuilder::new(&registry)
            .build_value(
                json!({
                    "1": {"name": "start", "data": {}},
                    "2": {"name": "DialogAgent", "data": {"args": {"name": "echo"}}, "inputs": link("1")},
                    "30": {"name": "Message", "data": {"args": {"name": "Host", "content": "bye"}}, "inputs": link("2")}
                }),
                &mut models,
            )
            .unwrap();
        let sink = Arc::new(VecEventSink::new());
        WorkflowExecutor::new("tap", sink.clone()).run(&graph).await.unwrap();

        assert_eq!(sink.completed_nodes(), vec!["1", "2", "30"]);
        let agent_output = sink.output_of("2").unwrap();
        assert_eq!(agent_output["content"], json!("agent2 heard "));
        let seen: Vec<Value> = MESSAGE_INPUTS
            .lock()
            .iter()
            .filter(|(node, _)| node == "30")
            .map(|(_, input)| input.clone())
            .collect();
        assert_eq!(seen, vec![agent_output]);
        // the node still emits its own message
        assert_eq!(sink.output_of("30").unwrap()["content"], json!("bye"));
    }

    struct ClosedSink;

    impl EventSink for ClosedSink {
        fn send(&self, _event: WorkflowEvent) -> std::result::Result<(), EventError> {
            Err(EventError {
                message: "receiver dropped".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_undeliverable_events_do_not_fail_run() {
        let graph = graph(json!({
            "1": {"name": "start", "data": {}},
            "2": {"name": "Message", "data": {"args": {"name": "Host", "content": "hi"}}, "inputs": link("1")}
        }));
        WorkflowExecutor::new("closed", Arc::new(ClosedSink))
            .run(&graph)
            .await
            .unwrap();
        assert_eq!(
            EventError { message: "receiver dropped".to_string() }.to_string(),
            "Event error: receiver dropped"
        );
    }

    #[tokio::test]
    async fn test_no_start_node_runs_nothing() {
        let (result, sink) = run(json!({
            "1": {"name": "Message", "data": {"args": {"name": "a", "content": "x"}}},
            "9": {"name": "openai_chat", "data": {"args": {"config_name": "m"}}}
        }))
        .await;

        assert!(matches!(result, Err(WorkflowError::NoStartNode)));
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_branch_prunes_untaken_side() {
        let (result, sink) = run(json!({
            "1": {"name": "Message", "data": {"args": {"name": "u", "content": "please continue"}}},
            "0": {"name": "start", "data": {}},
            "2": {"name": "IF/ELSE", "data": {"args": {"condition_op": "contains", "target_value": "continue"}},
                  "inputs": link("1"),
                  "outputs": {
                      "output_1": {"connections": [{"node": "3", "output": "input_1"}]},
                      "output_2": {"connections": [{"node": "4", "output": "input_1"}]}
                  }},
            "3": {"name": "Message", "data": {"args": {"name": "yes", "content": "taken"}}, "inputs": link("2")},
            "4": {"name": "Message", "data": {"args": {"name": "no", "content": "skipped"}}, "inputs": link("2")}
        }))
        .await;

        // "1" is a root but not a Start node, so only "0" runs
        result.unwrap();
        assert_eq!(sink.completed_nodes(), vec!["0"]);

        let (result, sink) = run(json!({
            "0": {"name": "start", "data": {}},
            "1": {"name": "Message", "data": {"args": {"name": "u", "content": "please continue"}}, "inputs": link("0")},
            "2": {"name": "IF/ELSE", "data": {"args": {"condition_op": "contains", "target_value": "continue"}},
                  "inputs": link("1"),
                  "outputs": {
                      "output_1": {"connections": [{"node": "3", "output": "input_1"}]},
                      "output_2": {"connections": [{"node": "4", "output": "input_1"}]}
                  }},
            "3": {"name": "Message", "data": {"args": {"name": "yes", "content": "taken"}}, "inputs": link("2")},
            "4": {"name": "Message", "data": {"args": {"name": "no", "content": "skipped"}}, "inputs": link("2")}
        }))
        .await;

        result.unwrap();
        assert_eq!(sink.completed_nodes(), vec!["0", "1", "2", "3"]);
        assert!(!sink.started_nodes().contains(&"4".to_string()));
    }

    #[tokio::test]
    async fn test_join_behind_pruned_branch_terminates() {
        let (result, sink) = run(json!({
            "0": {"name": "start", "data": {}},
            "1": {"name": "IF/ELSE", "data": {"args": {"condition_op": "is null", "target_value": ""}},
                  "inputs": link("0"),
                  "outputs": {
                      "output_1": {"connections": [{"node": "2", "output": "input_1"}]},
                      "output_2": {"connections": [{"node": "3", "output": "input_1"}]}
                  }},
            "2": {"name": "Placeholder", "data": {}, "inputs": link("1")},
            "3": {"name": "Placeholder", "data": {}, "inputs": link("1")},
            "4": {"name": "Placeholder", "data": {},
                  "inputs": {"input_1": {"connections": [{"node": "2"}, {"node": "3"}]}}}
        }))
        .await;

        result.unwrap();
        assert_eq!(sink.completed_nodes(), vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn test_blocked_nodes_fail_when_strict() {
        let graph = graph(json!({
            "0": {"name": "start", "data": {}},
            "1": {"name": "IF/ELSE", "data": {"args": {"condition_op": "is not null", "target_value": ""}},
                  "inputs": link("0"),
                  "outputs": {
                      "output_1": {"connections": [{"node": "2"}]},
                      "output_2": {"connections": [{"node": "3"}]}
                  }},
            "2": {"name": "Placeholder", "data": {}, "inputs": link("1")},
            "3": {"name": "Placeholder", "data": {}, "inputs": link("1")},
            "4": {"name": "Placeholder", "data": {},
                  "inputs": {"input_1": {"connections": [{"node": "2"}, {"node": "3"}]}}}
        }));
        let sink = Arc::new(VecEventSink::new());
        let strict = WorkflowExecutor::new("strict", sink.clone()).with_options(ExecutorOptions {
            fail_on_blocked: true,
        });

        let err = strict.run(&graph).await.unwrap_err();
        assert!(matches!(err, WorkflowError::ExecutionFailed(ref msg) if msg.contains('4')));
        assert_eq!(sink.completed_nodes(), vec!["0", "1", "3"]);
    }

    #[tokio::test]
    async fn test_multiple_predecessors_receive_list() {
        let (result, sink) = run(json!({
            "0": {"name": "start", "data": {}},
            "1": {"name": "Message", "data": {"args": {"name": "a", "content": "first"}}, "inputs": link("0")},
            "2": {"name": "Message", "data": {"args": {"name": "b", "content": "second"}}, "inputs": link("0")},
            "3": {"name": "Placeholder", "data": {},
                  "inputs": {"input_1": {"connections": [{"node": "1"}, {"node": "2"}, {"node": "1"}]}}}
        }))
        .await;

        result.unwrap();
        let output = sink.output_of("3").unwrap();
        let contents: Vec<&str> = output
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["content"].as_str().unwrap())
            .collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert_eq!(sink.completed_nodes().iter().filter(|n| *n == "3").count(), 1);
    }

    #[tokio::test]
    async fn test_operator_error_names_node_and_halts() {
        let (result, sink) = run(json!({
            "0": {"name": "start", "data": {}},
            "1": {"name": "IF/ELSE", "data": {"args": {"condition_op": "contains", "target_value": "x"}},
                  "inputs": link("0"),
                  "outputs": {
                      "output_1": {"connections": [{"node": "2"}]},
                      "output_2": {"connections": []}
                  }},
            "2": {"name": "Placeholder", "data": {}, "inputs": link("1")}
        }))
        .await;

        // string operators cannot be applied to the start node's null output
        let err = result.unwrap_err();
        assert_eq!(err.node_id(), Some("1"));
        assert!(matches!(err, WorkflowError::NodeFailed { ref source, .. }
            if matches!(**source, WorkflowError::InvalidCondition { .. })));
        assert!(matches!(sink.events().last(), Some(WorkflowEvent::RunFailed { .. })));
        assert!(!sink.started_nodes().contains(&"2".to_string()));
    }

    #[tokio::test]
    async fn test_hub_over_agents() {
        let (result, sink) = run(json!({
            "0": {"name": "start", "data": {}},
            "1": {"name": "MsgHub", "data": {"elements": ["2"],
                  "args": {"announcement": {"name": "Host", "content": "Welcome!"}}},
                  "inputs": link("0")},
            "2": {"name": "SequentialPipeline", "data": {"elements": ["3", "4"]}},
            "3": {"name": "DialogAgent", "data": {"args": {"name": "a"}}},
            "4": {"name": "DialogAgent", "data": {"args": {"name": "b"}}}
        }))
        .await;

        result.unwrap();
        assert_eq!(sink.completed_nodes(), vec!["0", "1"]);
        let spoken: Vec<String> = sink.spoken().iter().map(|m| m.text()).collect();
        assert_eq!(
            spoken,
            vec!["Welcome!", "agent3 heard ", "agent4 heard agent3 heard "]
        );
    }

    #[tokio::test]
    async fn test_copy_runs_source_again() {
        let (result, sink) = run(json!({
            "0": {"name": "start", "data": {}},
            "1": {"name": "DialogAgent", "data": {"args": {"name": "a"}}, "inputs": link("0")},
            "2": {"name": "CopyNode", "data": {"elements": ["1"]}, "inputs": link("1")}
        }))
        .await;

        result.unwrap();
        assert_eq!(sink.completed_nodes(), vec!["0", "1", "2"]);
        assert_eq!(sink.spoken().len(), 2);
        assert_eq!(sink.spoken()[1].text(), "agent1 heard agent1 heard ");
    }
}
