//! The Event taxonomy emitted by one orchestrator turn and fanned out to
//! realtime subscribers (§4.7).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single emitted event. `kind` carries the variant-specific payload;
/// `session_id`, `timestamp`, and `metadata` are present on every event per
/// §3's event definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub kind: EventKind,
    pub session_id: String,
    pub timestamp: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl Event {
    pub fn new(kind: EventKind, session_id: impl Into<String>) -> Self {
        Self {
            kind,
            session_id: session_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    SessionStarted,
    SessionEnded,
    NodeEntered {
        node_id: String,
    },
    NodeExited {
        node_id: String,
    },
    PathwaySelected {
        from_node_id: String,
        to_node_id: String,
        confidence_score: u8,
        candidates: Vec<String>,
        reasoning: String,
    },
    VariableExtracted {
        name: String,
        value: Value,
    },
    ResponseGenerated {
        node_id: String,
    },
    UserMessage {
        content: String,
    },
    AssistantMessage {
        content: String,
    },
    MessageProcessingComplete,
    /// Boxed: by far the largest variant, and emitted once per turn rather
    /// than per candidate, so the size cost of the small variants dominates
    /// if this one isn't boxed.
    DecisionStep(Box<DecisionStep>),
    Error {
        code: String,
        message: String,
    },
}

/// Full per-turn decision record. Restored in full from the original
/// source's event model per §9 SUPPLEMENTED FEATURES.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionStep {
    pub step_name: String,
    pub node_id: String,
    pub node_name: String,
    pub node_prompt: NodePromptSnapshot,
    pub previous_node_id: Option<String>,
    pub previous_node_name: Option<String>,
    pub available_pathways: Vec<String>,
    pub chosen_pathway: Option<String>,
    pub pathway_confidence: Option<u8>,
    pub llm_reasoning: Option<String>,
    pub variables_extracted: serde_json::Map<String, Value>,
    pub variables_status: serde_json::Map<String, Value>,
    pub assistant_response: Option<String>,
    pub timing_ms: f64,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub model_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePromptSnapshot {
    pub context: String,
    pub objective: String,
    pub notes: String,
    pub examples: String,
}

/// The single full-state snapshot sent on connect when a session is already
/// persisted (§4.7, §9). Deliberately thinner than `ChatSession`: no
/// timestamps on history entries, matching the original's trimmed view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowExecutionState {
    pub session_id: String,
    pub current_node_id: String,
    pub variables: serde_json::Map<String, Value>,
    pub message_history: Vec<HistoryEntry>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_entered_serializes_with_tag() {
        let event = Event::new(EventKind::NodeEntered { node_id: "n1".into() }, "s1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "node_entered");
        assert_eq!(json["node_id"], "n1");
        assert_eq!(json["session_id"], "s1");
    }

    #[test]
    fn decision_step_round_trips() {
        let event = Event::new(
            EventKind::DecisionStep(Box::new(DecisionStep {
                step_name: "advance".into(),
                node_id: "n2".into(),
                ..Default::default()
            })),
            "s2",
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        match back.kind {
            EventKind::DecisionStep(step) => assert_eq!(step.node_id, "n2"),
            other => panic!("expected decision_step, got {other:?}"),
        }
    }
}
