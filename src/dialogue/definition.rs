//! Dialogue Graph Definitions
//!
//! These structures are deserialized from dialogue JSON assets
//! (`"<npc_key>_<locale>.json"`), then resolved into an id-indexed graph.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// A dialogue graph as it appears in JSON
#[derive(Debug, Clone, Deserialize)]
pub struct RawGraph {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub nodes: Vec<RawNode>,
}

/// Raw node data as it appears in JSON
#[derive(Debug, Clone, Deserialize)]
pub struct RawNode {
    pub id: String,
    #[serde(rename = "type", default = "default_node_type")]
    pub node_type: String,
    pub speaker: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub outs: Vec<RawEdge>,
    #[serde(rename = "onEnter", default)]
    pub on_enter: Vec<RawActionSpec>,
    #[serde(rename = "onExit", default)]
    pub on_exit: Vec<RawActionSpec>,
}

fn default_node_type() -> String {
    "talk".to_string()
}

/// Raw outgoing edge as it appears in JSON
#[derive(Debug, Clone, Deserialize)]
pub struct RawEdge {
    #[serde(default)]
    pub to: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub when: Vec<RawCondSpec>,
    #[serde(default)]
    pub actions: Vec<RawActionSpec>,
}

/// Raw condition reference: `{"name": "flag", "args": ["met_keeper"], "op": "or"}`
#[derive(Debug, Clone, Deserialize)]
pub struct RawCondSpec {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub op: Option<String>,
}

/// Raw action reference: `{"name": "setFlag", "args": ["met_keeper"]}`
#[derive(Debug, Clone, Deserialize)]
pub struct RawActionSpec {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

// ============================================================================
// Resolved Graph Structures (after parsing)
// ============================================================================

/// Node kinds supported by the dialogue engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Presents text and the passing edges as player answers
    Talk,
    /// Follows its first satisfied edge without player input
    Auto,
    /// Terminates the session after running `on_exit`
    End,
}

impl NodeKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "talk" => Some(NodeKind::Talk),
            "auto" => Some(NodeKind::Auto),
            "end" => Some(NodeKind::End),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Talk => "talk",
            NodeKind::Auto => "auto",
            NodeKind::End => "end",
        }
    }
}

/// Boolean operator joining a condition into the running fold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondOp {
    And,
    Or,
}

impl CondOp {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "and" => Some(CondOp::And),
            "or" => Some(CondOp::Or),
            _ => None,
        }
    }
}

/// A resolved condition reference.
///
/// `op` joins this condition's result into the running fold. When absent,
/// the operator carried from the previous entry applies (initially `and`).
/// Order is semantically significant; entries are never reordered.
#[derive(Debug, Clone)]
pub struct CondSpec {
    pub name: String,
    pub args: Vec<Value>,
    pub op: Option<CondOp>,
}

impl CondSpec {
    fn from_raw(raw: &RawCondSpec) -> Result<Self, String> {
        let op = match raw.op.as_deref() {
            None => None,
            Some(s) => Some(
                CondOp::from_str(s).ok_or_else(|| format!("Invalid condition op '{}'", s))?,
            ),
        };
        Ok(Self {
            name: raw.name.clone(),
            args: raw.args.clone(),
            op,
        })
    }
}

/// A resolved action reference
#[derive(Debug, Clone)]
pub struct ActionSpec {
    pub name: String,
    pub args: Vec<Value>,
}

impl ActionSpec {
    fn from_raw(raw: &RawActionSpec) -> Self {
        Self {
            name: raw.name.clone(),
            args: raw.args.clone(),
        }
    }
}

/// A resolved outgoing edge
#[derive(Debug, Clone)]
pub struct Edge {
    /// Target node id. None ends the session when the edge is taken.
    pub to: Option<String>,
    /// Display text shown as the player answer
    pub text: Option<String>,
    pub when: Vec<CondSpec>,
    pub actions: Vec<ActionSpec>,
}

impl Edge {
    fn from_raw(raw: &RawEdge) -> Result<Self, String> {
        let when = raw
            .when
            .iter()
            .map(CondSpec::from_raw)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            to: raw.to.clone().filter(|t| !t.is_empty()),
            text: raw.text.clone(),
            when,
            actions: raw.actions.iter().map(ActionSpec::from_raw).collect(),
        })
    }
}

/// A resolved dialogue node
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub speaker: Option<String>,
    pub text: Option<String>,
    pub outs: Vec<Edge>,
    pub on_enter: Vec<ActionSpec>,
    pub on_exit: Vec<ActionSpec>,
}

impl Node {
    fn from_raw(raw: &RawNode) -> Result<Self, String> {
        let kind = NodeKind::from_str(&raw.node_type)
            .ok_or_else(|| format!("Invalid node type '{}' on node '{}'", raw.node_type, raw.id))?;
        let outs = raw
            .outs
            .iter()
            .enumerate()
            .map(|(i, e)| {
                Edge::from_raw(e).map_err(|err| format!("Node '{}' edge {}: {}", raw.id, i, err))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: raw.id.clone(),
            kind,
            speaker: raw.speaker.clone(),
            text: raw.text.clone(),
            outs,
            on_enter: raw.on_enter.iter().map(ActionSpec::from_raw).collect(),
            on_exit: raw.on_exit.iter().map(ActionSpec::from_raw).collect(),
        })
    }
}

/// A fully resolved dialogue graph for one NPC/locale
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: HashMap<String, Node>,
    start: String,
}

impl Graph {
    /// Resolve a raw JSON graph. Structural problems (no nodes, unknown
    /// node type, unknown op) fail the load; dangling references load with
    /// a warning and degrade at runtime by stopping the session.
    pub fn from_raw(raw: &RawGraph) -> Result<Self, String> {
        if raw.nodes.is_empty() {
            return Err("Graph has no nodes".to_string());
        }

        let mut nodes = HashMap::new();
        for raw_node in &raw.nodes {
            let node = Node::from_raw(raw_node)?;
            if nodes.insert(node.id.clone(), node).is_some() {
                warn!("Duplicate node id '{}', keeping the last occurrence", raw_node.id);
            }
        }

        let start = raw
            .start
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| raw.nodes[0].id.clone());
        if !nodes.contains_key(&start) {
            warn!("Declared start node '{}' not present in graph", start);
        }

        for node in nodes.values() {
            for edge in &node.outs {
                if let Some(to) = &edge.to {
                    if !nodes.contains_key(to) {
                        warn!("Node '{}' has an edge to unknown node '{}'", node.id, to);
                    }
                }
            }
        }

        Ok(Self { nodes, start })
    }

    /// Parse and resolve a graph from JSON text
    pub fn from_json(json: &str) -> Result<Self, String> {
        let raw: RawGraph =
            serde_json::from_str(json).map_err(|e| format!("Failed to parse graph JSON: {}", e))?;
        Self::from_raw(&raw)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "start": "n1",
            "nodes": [
                {
                    "id": "n1",
                    "type": "talk",
                    "speaker": "keeper",
                    "text": "Hi",
                    "outs": [
                        {
                            "to": "n2",
                            "text": "Bye",
                            "when": [{"name": "flag", "args": ["met"]}],
                            "actions": [{"name": "setFlag", "args": ["left", true]}]
                        }
                    ],
                    "onEnter": [{"name": "playSfx", "args": ["chime"]}]
                },
                {"id": "n2", "type": "end"}
            ]
        }"#
    }

    #[test]
    fn test_parse_graph() {
        let graph = Graph::from_json(sample_json()).unwrap();
        assert_eq!(graph.start(), "n1");
        assert_eq!(graph.len(), 2);

        let n1 = graph.node("n1").unwrap();
        assert_eq!(n1.kind, NodeKind::Talk);
        assert_eq!(n1.speaker.as_deref(), Some("keeper"));
        assert_eq!(n1.outs.len(), 1);
        assert_eq!(n1.outs[0].to.as_deref(), Some("n2"));
        assert_eq!(n1.outs[0].when[0].name, "flag");
        assert_eq!(n1.on_enter[0].name, "playSfx");

        assert_eq!(graph.node("n2").unwrap().kind, NodeKind::End);
    }

    #[test]
    fn test_node_type_defaults_to_talk() {
        let graph = Graph::from_json(r#"{"nodes": [{"id": "a", "text": "hi"}]}"#).unwrap();
        assert_eq!(graph.node("a").unwrap().kind, NodeKind::Talk);
    }

    #[test]
    fn test_start_defaults_to_first_node() {
        let graph = Graph::from_json(
            r#"{"nodes": [{"id": "first", "type": "talk"}, {"id": "second", "type": "end"}]}"#,
        )
        .unwrap();
        assert_eq!(graph.start(), "first");
    }

    #[test]
    fn test_empty_graph_is_rejected() {
        assert!(Graph::from_json(r#"{"nodes": []}"#).is_err());
    }

    #[test]
    fn test_unknown_node_type_is_rejected() {
        let result = Graph::from_json(r#"{"nodes": [{"id": "a", "type": "monologue"}]}"#);
        assert!(result.unwrap_err().contains("monologue"));
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        let result = Graph::from_json(
            r#"{"nodes": [{"id": "a", "outs": [{"to": "a", "when": [{"name": "flag", "args": ["x"], "op": "xor"}]}]}]}"#,
        );
        assert!(result.unwrap_err().contains("xor"));
    }

    #[test]
    fn test_dangling_edge_target_still_loads() {
        let graph =
            Graph::from_json(r#"{"nodes": [{"id": "a", "outs": [{"to": "missing"}]}]}"#).unwrap();
        assert!(graph.contains("a"));
        assert!(!graph.contains("missing"));
    }

    #[test]
    fn test_empty_edge_target_means_terminal() {
        let graph = Graph::from_json(r#"{"nodes": [{"id": "a", "outs": [{"to": ""}]}]}"#).unwrap();
        assert!(graph.node("a").unwrap().outs[0].to.is_none());
    }

    #[test]
    fn test_cond_op_parsing() {
        assert_eq!(CondOp::from_str("and"), Some(CondOp::And));
        assert_eq!(CondOp::from_str("or"), Some(CondOp::Or));
        assert_eq!(CondOp::from_str("nand"), None);
    }
}
