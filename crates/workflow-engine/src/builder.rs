//! Graph construction
//!
//! Turns a [`WorkflowConfig`] into a [`Graph`]:
//!
//! 1. resolve every type name against the closed [`NodeKind`] set;
//! 2. construct Model nodes first, so their configurations are registered
//!    before any agent looks them up;
//! 3. construct every other node, building its `elements` first through an
//!    explicit worklist memoized by node id;
//! 4. add edges from input connections;
//! 5. reject cycles in the participating subgraph.
//!
//! Any failure aborts the build; no partial graph is returned.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::config::WorkflowConfig;
use crate::error::{Result, WorkflowError};
use crate::graph::{Graph, GraphEdge, GraphNode};
use crate::kind::{NodeCategory, NodeKind};
use crate::models::ModelRegistry;
use crate::operator::{Operator, OperatorId, OperatorTable};
use crate::registry::{NodeRegistry, NodeRequest};

/// State threaded through node construction
pub struct BuildContext<'a> {
    config: &'a WorkflowConfig,
    models: &'a mut ModelRegistry,
    operators: OperatorTable,
}

impl<'a> BuildContext<'a> {
    pub fn new(config: &'a WorkflowConfig, models: &'a mut ModelRegistry) -> Self {
        Self {
            config,
            models,
            operators: OperatorTable::new(),
        }
    }

    pub fn config(&self) -> &'a WorkflowConfig {
        self.config
    }

    pub fn models(&self) -> &ModelRegistry {
        self.models
    }

    pub fn models_mut(&mut self) -> &mut ModelRegistry {
        self.models
    }

    pub fn operators(&self) -> &OperatorTable {
        &self.operators
    }

    pub(crate) fn operators_mut(&mut self) -> &mut OperatorTable {
        &mut self.operators
    }

    pub fn operator(&self, id: OperatorId) -> Result<&std::sync::Arc<dyn Operator>> {
        self.operators.try_get(id)
    }

    fn into_operators(self) -> OperatorTable {
        self.operators
    }
}

/// Builds graphs with a fixed node registry
pub struct GraphBuilder<'r> {
    registry: &'r NodeRegistry,
}

impl<'r> GraphBuilder<'r> {
    pub fn new(registry: &'r NodeRegistry) -> Self {
        Self { registry }
    }

    /// Parse a raw JSON document and build it
    pub fn build_value(&self, config: Value, models: &mut ModelRegistry) -> Result<Graph> {
        let config = WorkflowConfig::from_value(config)?;
        self.build(&config, models)
    }

    pub fn build(&self, config: &WorkflowConfig, models: &mut ModelRegistry) -> Result<Graph> {
        let kinds = config
            .iter()
            .map(|(id, spec)| Ok((id, NodeKind::parse(&spec.name)?)))
            .collect::<Result<HashMap<&str, NodeKind>>>()?;

        let mut ctx = BuildContext::new(config, models);
        let mut built: HashMap<String, OperatorId> = HashMap::new();
        let mut non_participating: HashSet<String> = HashSet::new();

        let (model_ids, other_ids): (Vec<&str>, Vec<&str>) = config
            .iter()
            .map(|(id, _)| id)
            .partition(|id| kinds[id].category() == NodeCategory::Model);

        for id in model_ids.into_iter().chain(other_ids) {
            self.construct(id, &kinds, &mut ctx, &mut built, &mut non_participating)?;
        }

        let mut graph = Graph::new(ctx.into_operators());
        for (id, spec) in config.iter() {
            graph.add_node(GraphNode {
                id: id.to_string(),
                kind: kinds[id],
                operator: built[id],
                outputs: spec.outputs.clone(),
                source: spec.data.source.clone(),
            });
        }
        graph.mark_non_participating(non_participating);

        for (id, spec) in config.iter() {
            for port in &spec.inputs {
                for connection in &port.connections {
                    if !config.contains(&connection.node) {
                        return Err(WorkflowError::MissingDependency {
                            node_id: id.to_string(),
                            dependency: connection.node.clone(),
                        });
                    }
                    graph.add_edge(GraphEdge {
                        source: connection.node.clone(),
                        target: id.to_string(),
                        input_port: port.name.clone(),
                    });
                }
            }
        }

        graph.detect_cycles()?;

        log::info!(
            "Built workflow graph: {} nodes, {} edges, {} absorbed into composites",
            graph.nodes().len(),
            graph.edges().len(),
            graph.non_participating().len()
        );
        Ok(graph)
    }

    /// Construct `root` and, first, every element it depends on
    fn construct(
        &self,
        root: &str,
        kinds: &HashMap<&str, NodeKind>,
        ctx: &mut BuildContext<'_>,
        built: &mut HashMap<String, OperatorId>,
        non_participating: &mut HashSet<String>,
    ) -> Result<()> {
        let config = ctx.config();
        let mut stack: Vec<(&str, bool)> = vec![(root, false)];
        let mut in_progress: HashSet<&str> = HashSet::new();

        while let Some((id, expanded)) = stack.pop() {
            if built.contains_key(id) {
                continue;
            }
            let spec = config
                .get(id)
                .ok_or_else(|| WorkflowError::InvalidConfig(format!("unknown node '{}'", id)))?;

            if !expanded {
                if !in_progress.insert(id) {
                    let mut path: Vec<String> = in_progress.iter().map(|s| s.to_string()).collect();
                    path.sort();
                    return Err(WorkflowError::CycleDetected(path));
                }
                stack.push((id, true));
                for dep in spec.data.elements.iter().rev() {
                    if !config.contains(dep) {
                        return Err(WorkflowError::MissingDependency {
                            node_id: id.to_string(),
                            dependency: dep.clone(),
                        });
                    }
                    if !built.contains_key(dep.as_str()) {
                        stack.push((dep.as_str(), false));
                    }
                }
                continue;
            }

            let kind = kinds[id];
            let dependencies = spec
                .data
                .elements
                .iter()
                .map(|dep| built[dep.as_str()])
                .collect();
            if kind != NodeKind::Copy {
                non_participating.extend(spec.data.elements.iter().cloned());
            }

            let request = NodeRequest {
                node_id: id,
                kind,
                spec,
                dependencies,
            };
            log::debug!("Constructing {} node '{}'", kind, id);
            let operator = self.registry.create(&request, ctx)?;
            let handle = ctx.operators.push(operator);
            built.insert(id.to_string(), handle);
            in_progress.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(doc: Value) -> Result<Graph> {
        let registry = NodeRegistry::with_core();
        let mut models = ModelRegistry::new();
        GraphBuilder::new(&registry).build_value(doc, &mut models)
    }

    #[test]
    fn test_elements_become_non_participating() {
        let graph = build(json!({
            "1": {"name": "start", "data": {}},
            "2": {"name": "SequentialPipeline", "data": {"elements": ["3", "4"]},
                  "inputs": {"input_1": {"connections": [{"node": "1", "input": "output_1"}]}}},
            "3": {"name": "Placeholder", "data": {}},
            "4": {"name": "Placeholder", "data": {}}
        }))
        .unwrap();

        assert!(graph.is_participating("1"));
        assert!(graph.is_participating("2"));
        assert!(!graph.is_participating("3"));
        assert!(!graph.is_participating("4"));

        let seq = graph.operators().get(graph.node("2").unwrap().operator).unwrap();
        let children = seq.children();
        assert_eq!(children, vec![graph.node("3").unwrap().operator, graph.node("4").unwrap().operator]);
    }

    #[test]
    fn test_shared_element_built_once() {
        let graph = build(json!({
            "1": {"name": "SequentialPipeline", "data": {"elements": ["3"]}},
            "2": {"name": "SequentialPipeline", "data": {"elements": ["3"]}},
            "3": {"name": "Placeholder", "data": {}}
        }))
        .unwrap();
        assert_eq!(graph.operators().len(), 3);
    }

    #[test]
    fn test_copy_source_stays_participating() {
        let graph = build(json!({
            "1": {"name": "start", "data": {}},
            "2": {"name": "Placeholder", "data": {},
                  "inputs": {"input_1": {"connections": [{"node": "1", "input": "output_1"}]}}},
            "3": {"name": "CopyNode", "data": {"elements": ["2"]},
                  "inputs": {"input_1": {"connections": [{"node": "2", "input": "output_1"}]}}}
        }))
        .unwrap();
        assert!(graph.is_participating("2"));
        assert!(graph.is_participating("3"));
        let ops = graph.operators();
        assert_eq!(
            ops.resolve(graph.node("3").unwrap().operator),
            graph.node("2").unwrap().operator
        );
    }

    #[test]
    fn test_deeply_nested_elements() {
        let mut doc = serde_json::Map::new();
        let depth = 2_000;
        for i in 0..depth {
            let elements = if i + 1 < depth { json!([(i + 1).to_string()]) } else { json!([]) };
            let name = if i + 1 < depth { "SequentialPipeline" } else { "Placeholder" };
            doc.insert(i.to_string(), json!({"name": name, "data": {"elements": elements}}));
        }
        let graph = build(Value::Object(doc)).unwrap();
        assert_eq!(graph.participating().count(), 1);
    }

    #[test]
    fn test_model_nodes_built_first() {
        let registry = NodeRegistry::with_core();
        let mut models = ModelRegistry::new();
        let graph = GraphBuilder::new(&registry)
            .build_value(
                json!({
                    "1": {"name": "start", "data": {}},
                    "9": {"name": "openai_chat", "data": {"args": {"config_name": "gpt", "model_name": "gpt-4"}}}
                }),
                &mut models,
            )
            .unwrap();
        assert_eq!(graph.node("9").unwrap().operator.index(), 0);
        assert_eq!(models.config("gpt").unwrap().model_type, "openai_chat");
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = build(json!({"1": {"name": "WeatherService", "data": {}}})).unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownNodeType(name) if name == "WeatherService"));
    }

    #[test]
    fn test_known_type_without_factory_rejected() {
        let err = build(json!({"1": {"name": "GoogleSearchService", "data": {}}})).unwrap_err();
        assert!(matches!(err, WorkflowError::UnregisteredNodeType(name) if name == "GoogleSearchService"));
    }

    fn branch_node(outputs: Value) -> Value {
        json!({
            "0": {"name": "start", "data": {}},
            "1": {"name": "IF/ELSE",
                  "data": {"args": {"condition_op": "is not null"}},
                  "inputs": {"input_1": {"connections": [{"node": "0", "input": "output_1"}]}},
                  "outputs": outputs}
        })
    }

    #[test]
    fn test_conditional_needs_exactly_two_ports() {
        let err = build(branch_node(json!({}))).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidConfig(ref msg) if msg.contains("'1'")));

        let three = json!({
            "output_1": {"connections": []},
            "output_2": {"connections": []},
            "output_3": {"connections": []}
        });
        assert!(matches!(build(branch_node(three)), Err(WorkflowError::InvalidConfig(_))));

        let renamed = json!({"output_1": {"connections": []}, "yes": {"connections": []}});
        assert!(matches!(build(branch_node(renamed)), Err(WorkflowError::InvalidConfig(_))));

        let two = json!({"output_2": {"connections": []}, "output_1": {"connections": []}});
        assert!(build(branch_node(two)).is_ok());
    }

    #[test]
    fn test_cycle_rejected() {
        let err = build(json!({
            "1": {"name": "start", "data": {}},
            "2": {"name": "Placeholder", "data": {},
                  "inputs": {"input_1": {"connections": [{"node": "1"}, {"node": "3"}]}}},
            "3": {"name": "Placeholder", "data": {},
                  "inputs": {"input_1": {"connections": [{"node": "2"}]}}}
        }))
        .unwrap_err();
        assert!(matches!(err, WorkflowError::CycleDetected(ids) if ids == vec!["2", "3"]));
    }

    #[test]
    fn test_element_cycle_rejected() {
        let err = build(json!({
            "1": {"name": "SequentialPipeline", "data": {"elements": ["2"]}},
            "2": {"name": "SequentialPipeline", "data": {"elements": ["1"]}}
        }))
        .unwrap_err();
        assert!(matches!(err, WorkflowError::CycleDetected(_)));
    }

    #[test]
    fn test_missing_element_and_connection() {
        let err = build(json!({
            "1": {"name": "SequentialPipeline", "data": {"elements": ["7"]}}
        }))
        .unwrap_err();
        assert!(matches!(err, WorkflowError::MissingDependency { dependency, .. } if dependency == "7"));

        let err = build(json!({
            "1": {"name": "Placeholder", "data": {},
                  "inputs": {"input_1": {"connections": [{"node": "8"}]}}}
        }))
        .unwrap_err();
        assert!(matches!(err, WorkflowError::MissingDependency { node_id, .. } if node_id == "1"));
    }

    #[test]
    fn test_edges_tagged_with_input_port() {
        let graph = build(json!({
            "1": {"name": "start", "data": {}},
            "2": {"name": "Placeholder", "data": {},
                  "inputs": {"input_1": {"connections": [{"node": "1", "input": "output_1"}]}}}
        }))
        .unwrap();
        assert_eq!(
            graph.edges(),
            &[GraphEdge {
                source: "1".to_string(),
                target: "2".to_string(),
                input_port: "input_1".to_string()
            }]
        );
    }
}
