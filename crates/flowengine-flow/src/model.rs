use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// A conversational step. `node_type` mirrors the engine-JSON discriminator;
/// unrecognized values still parse as `Normal` via `#[serde(other)]` so a
/// minor authoring-tool addition never breaks flow loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Start,
    Normal,
    Global,
    End,
    #[serde(other)]
    Unknown,
}

impl Default for NodeType {
    fn default() -> Self {
        NodeType::Normal
    }
}

/// The prompt fields that compose a node's "sandwich" generation prompt
/// (§4.6 step 8). `custom_fields` carries authoring-tool extensions that the
/// orchestrator still runs `{{variable}}` substitution against, even though
/// it has no fixed meaning here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Prompt {
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub examples: String,
    #[serde(default)]
    pub custom_fields: HashMap<String, String>,
}

/// The declared type of a variable to extract. Purely informational for the
/// extractor's validators beyond the handful of name-pattern-driven checks
/// in §4.3 step 6 (email/phone/age); `var_type` lets an authoring tool pin
/// down intent even when the name itself doesn't hint at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    String,
    Integer,
    Boolean,
    Email,
    Phone,
    #[serde(other)]
    Other,
}

impl Default for VariableType {
    fn default() -> Self {
        VariableType::String
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableExtraction {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "bool_true")]
    pub required: bool,
    #[serde(default)]
    pub var_type: VariableType,
}

fn bool_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub node_type: NodeType,
    #[serde(default)]
    pub prompt: Prompt,
    #[serde(default)]
    pub is_start: bool,
    #[serde(default)]
    pub is_end: bool,
    #[serde(default = "bool_true")]
    pub use_llm: bool,
    #[serde(default)]
    pub is_global: bool,
    #[serde(default)]
    pub auto_return_to_previous: bool,
    #[serde(default)]
    pub extract_vars: Vec<VariableExtraction>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub skip_user_response: bool,
    #[serde(default)]
    pub loop_enabled: bool,
    #[serde(default)]
    pub loop_condition: String,
    #[serde(default = "bool_true")]
    pub overrides_global_pathway: bool,
}

fn default_temperature() -> f32 {
    0.2
}

impl Node {
    /// True when the loop evaluator should actually invoke the LLM (§4.5):
    /// both the flag and a non-blank condition are required.
    pub fn has_active_loop_condition(&self) -> bool {
        self.loop_enabled && !self.loop_condition.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub else_option: bool,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub first_node_id: String,
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub global_objective: String,
    #[serde(default)]
    pub global_tone: String,
    #[serde(default)]
    pub global_language: String,
    #[serde(default)]
    pub global_behaviour: String,
    #[serde(default)]
    pub global_values: String,
}

impl Flow {
    /// Parse and validate an "engine form" Flow JSON document.
    ///
    /// Validation (constructor-level, per the corpus's pydantic-style
    /// modeling convention): every connection's `source`/`target` must
    /// resolve to a declared node, and connection labels sharing a `source`
    /// must be distinct after case-folding.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let flow: Flow = serde_json::from_value(value)
            .map_err(|e| FlowError::Malformed(e.to_string()))?;
        flow.validate()?;
        Ok(flow)
    }

    fn validate(&self) -> Result<()> {
        let node_ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();

        let mut seen_labels: HashMap<&str, HashSet<String>> = HashMap::new();
        for conn in &self.connections {
            if !node_ids.contains(conn.source.as_str()) {
                return Err(FlowError::DanglingConnection {
                    id: conn.id.clone(),
                    node_id: conn.source.clone(),
                });
            }
            if !node_ids.contains(conn.target.as_str()) {
                return Err(FlowError::DanglingConnection {
                    id: conn.id.clone(),
                    node_id: conn.target.clone(),
                });
            }
            let folded = conn.label.to_lowercase();
            let entry = seen_labels.entry(conn.source.as_str()).or_default();
            if !entry.insert(folded.clone()) {
                return Err(FlowError::DuplicateLabel {
                    source: conn.source.clone(),
                    label: conn.label.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn get_node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// Every outgoing connection from `node_id`, plus one virtual connection
    /// per `is_global = true` node whose label is that node's own id
    /// (§4.4 candidate set).
    pub fn pathway_candidates(&self, node_id: &str) -> Vec<Connection> {
        let mut candidates: Vec<Connection> = self
            .connections
            .iter()
            .filter(|c| c.source == node_id)
            .cloned()
            .collect();

        for node in &self.nodes {
            if node.is_global && node.id != node_id {
                candidates.push(Connection {
                    id: format!("global-{}", node.id),
                    label: node.id.clone(),
                    description: format!("Global node: {}", node.id),
                    else_option: false,
                    source: node_id.to_string(),
                    target: node.id.clone(),
                });
            }
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_flow() -> serde_json::Value {
        json!({
            "first_node_id": "start",
            "nodes": [
                {"id": "start", "node_type": "start", "is_start": true},
                {"id": "end", "node_type": "end", "is_end": true}
            ],
            "connections": [
                {"id": "c1", "label": "to-end", "description": "go", "source": "start", "target": "end"}
            ]
        })
    }

    #[test]
    fn parses_minimal_flow() {
        let flow = Flow::from_json(sample_flow()).expect("should parse");
        assert_eq!(flow.first_node_id, "start");
        assert_eq!(flow.nodes.len(), 2);
    }

    #[test]
    fn rejects_dangling_connection() {
        let mut value = sample_flow();
        value["connections"][0]["target"] = json!("missing");
        let err = Flow::from_json(value).unwrap_err();
        assert!(matches!(err, FlowError::DanglingConnection { .. }));
    }

    #[test]
    fn rejects_duplicate_labels_same_source() {
        let mut value = sample_flow();
        value["connections"]
            .as_array_mut()
            .unwrap()
            .push(json!({"id": "c2", "label": "TO-END", "description": "dup", "source": "start", "target": "end"}));
        let err = Flow::from_json(value).unwrap_err();
        assert!(matches!(err, FlowError::DuplicateLabel { .. }));
    }

    #[test]
    fn pathway_candidates_include_global_nodes() {
        let mut value = sample_flow();
        value["nodes"]
            .as_array_mut()
            .unwrap()
            .push(json!({"id": "g", "node_type": "global", "is_global": true}));
        let flow = Flow::from_json(value).expect("should parse");
        let candidates = flow.pathway_candidates("start");
        assert!(candidates.iter().any(|c| c.target == "g"));
        assert!(candidates.iter().any(|c| c.target == "end"));
    }
}
