use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

/// A single node of an externally executed workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub parameters: Value,
}

/// Workflow definition as owned by the automation engine.
///
/// Connections are keyed by the *source node name* and follow the engine's
/// `{"main": [[{"node": "<target>", "type": "main", "index": 0}]]}` layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub connections: HashMap<String, NodeConnections>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeConnections {
    #[serde(default)]
    pub main: Vec<Vec<ConnectionTarget>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionTarget {
    pub node: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub index: usize,
}

impl Workflow {
    /// Build a straight chain `a -> b -> c` from `(id, type)` pairs. Node names equal ids.
    pub fn linear(id: &str, name: &str, nodes: &[(&str, &str)]) -> Self {
        let nodes: Vec<WorkflowNode> = nodes
            .iter()
            .map(|(node_id, node_type)| WorkflowNode {
                id: node_id.to_string(),
                name: node_id.to_string(),
                node_type: node_type.to_string(),
                parameters: Value::Null,
            })
            .collect();

        let mut connections = HashMap::new();
        for pair in nodes.windows(2) {
            connections.insert(
                pair[0].name.clone(),
                NodeConnections {
                    main: vec![vec![ConnectionTarget {
                        node: pair[1].name.clone(),
                        kind: Some("main".to_string()),
                        index: 0,
                    }]],
                },
            );
        }

        Self {
            id: id.to_string(),
            name: name.to_string(),
            nodes,
            connections,
        }
    }

    pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    fn node_by_name(&self, name: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Ids of the nodes directly downstream of `node_id`
    pub fn next_node_ids(&self, node_id: &str) -> Vec<String> {
        let Some(node) = self.node(node_id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        if let Some(conns) = self.connections.get(&node.name) {
            for target in conns.main.iter().flatten() {
                if let Some(t) = self.node_by_name(&target.node) {
                    if !out.contains(&t.id) {
                        out.push(t.id.clone());
                    }
                }
            }
        }
        out
    }

    /// All node ids in declaration order
    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    /// Order in which nodes execute.
    ///
    /// Breadth-first over connections starting from nodes without incoming
    /// edges, ties broken by declaration order. Anything left over (cycles,
    /// unreachable nodes) is appended in declaration order.
    pub fn execution_order(&self) -> Vec<&WorkflowNode> {
        let mut indegree: HashMap<&str, usize> =
            self.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
        for node in &self.nodes {
            for next in self.next_node_ids(&node.id) {
                if let Some(d) = indegree.get_mut(next.as_str()) {
                    *d += 1;
                }
            }
        }

        let mut queue: VecDeque<&WorkflowNode> = self
            .nodes
            .iter()
            .filter(|n| indegree.get(n.id.as_str()) == Some(&0))
            .collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop_front() {
            if !seen.insert(node.id.as_str()) {
                continue;
            }
            order.push(node);
            for next_id in self.next_node_ids(&node.id) {
                if let Some(d) = indegree.get_mut(next_id.as_str()) {
                    *d = d.saturating_sub(1);
                    if *d == 0 {
                        if let Some(next) = self.node(&next_id) {
                            queue.push_back(next);
                        }
                    }
                }
            }
        }

        for node in &self.nodes {
            if !seen.contains(node.id.as_str()) {
                seen.insert(node.id.as_str());
                order.push(node);
            }
        }

        order
    }
}
