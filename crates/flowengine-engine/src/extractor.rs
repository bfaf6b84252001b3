//! Variable Extractor (§4.3): LLM-assisted structured extraction with
//! retries, sanitation, validation, and completion semantics.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use flowengine_core::config::MAX_USER_MESSAGE_CHARS;
use flowengine_flow::model::{Node, VariableExtraction, VariableType};
use flowengine_llm::{ChatMessage, LlmClient};
use flowengine_sessions::{ChatSession, Role};

const EXTRACTION_TEMPERATURE: f32 = 0.1;
const DEFAULT_MAX_RETRIES: u32 = 2;
const NOT_FOUND: &str = "NOT_FOUND";
const NOT_PROVIDED: &str = "NOT_PROVIDED";

/// Phrases that hint at a prompt-injection attempt. Logged, never rejected
/// (§4.3 step 2).
const SUSPICIOUS_PATTERNS: &[&str] = &["ignore previous", "ignore all previous", "disregard above"];

#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    /// Newly extracted values from this turn only — the orchestrator merges
    /// these into the session's accumulated `extracted_variables`.
    pub extracted: HashMap<String, Value>,
    pub attempts: u32,
    pub timing_ms: f64,
}

pub struct VariableExtractor {
    llm: Arc<dyn LlmClient>,
    max_retries: u32,
}

impl VariableExtractor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub async fn extract(&self, node: &Node, session: &ChatSession) -> ExtractionOutcome {
        let started = std::time::Instant::now();

        let Some(user_message) = last_user_message(session) else {
            return ExtractionOutcome::default();
        };

        if user_message.trim().is_empty() || user_message.chars().count() > MAX_USER_MESSAGE_CHARS {
            return ExtractionOutcome::default();
        }

        for pattern in SUSPICIOUS_PATTERNS {
            if user_message.to_lowercase().contains(pattern) {
                warn!(pattern, "suspicious pattern in user message during extraction, not rejecting");
            }
        }

        let escaped = user_message.replace('"', "\\\"");
        let system_prompt = build_system_prompt(&node.extract_vars, &session.extracted_variables);

        let mut attempts = 0;
        let mut parsed: Option<serde_json::Map<String, Value>> = None;

        while attempts <= self.max_retries {
            attempts += 1;
            let messages = vec![
                ChatMessage::system(&system_prompt),
                ChatMessage::user(format!("Mensagem do usuário: \"{escaped}\"")),
            ];
            let result = self.llm.chat(&messages, EXTRACTION_TEMPERATURE).await;

            if !result.success {
                debug!(attempts, "extraction LLM call failed, retrying if attempts remain");
                continue;
            }
            let Some(text) = result.response.filter(|t| !t.trim().is_empty()) else {
                continue;
            };
            match parse_json_object(&text) {
                Some(map) => {
                    parsed = Some(map);
                    break;
                }
                None => {
                    debug!(attempts, "extraction response failed to parse as JSON object");
                    continue;
                }
            }
        }

        let extracted = match parsed {
            Some(map) => validate_and_coerce(&node.extract_vars, map),
            None => HashMap::new(),
        };

        ExtractionOutcome {
            extracted,
            attempts,
            timing_ms: round1(started.elapsed().as_secs_f64() * 1000.0),
        }
    }
}

/// §4.3 step 7: true iff any required variable name is absent from the
/// accumulated extracted variables.
pub fn should_continue_extraction(node: &Node, accumulated: &HashMap<String, Value>) -> bool {
    node.extract_vars
        .iter()
        .filter(|v| v.required)
        .any(|v| !accumulated.contains_key(&v.name))
}

/// Descriptions of required variables still missing, for the deterministic
/// clarification reply.
pub fn missing_required_descriptions(node: &Node, accumulated: &HashMap<String, Value>) -> Vec<String> {
    node.extract_vars
        .iter()
        .filter(|v| v.required && !accumulated.contains_key(&v.name))
        .map(|v| {
            if v.description.trim().is_empty() {
                v.name.clone()
            } else {
                v.description.clone()
            }
        })
        .collect()
}

fn last_user_message(session: &ChatSession) -> Option<String> {
    session
        .history
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
}

fn build_system_prompt(
    vars: &[VariableExtraction],
    already_extracted: &HashMap<String, Value>,
) -> String {
    let mut prompt = String::from(
        "Extraia as seguintes variáveis da mensagem do usuário. \
         Responda apenas com um objeto JSON mapeando cada nome de variável ao valor encontrado. \
         Se uma variável obrigatória não for encontrada, use \"NOT_FOUND\". \
         Se uma variável opcional não for encontrada, use \"NOT_PROVIDED\".\n\nVariáveis:\n",
    );
    for v in vars {
        prompt.push_str(&format!(
            "- {} ({}): {}\n",
            v.name,
            if v.required { "obrigatória" } else { "opcional" },
            v.description
        ));
    }
    if !already_extracted.is_empty() {
        prompt.push_str("\nVariáveis já extraídas nesta conversa:\n");
        for (k, val) in already_extracted {
            prompt.push_str(&format!("- {k}: {val}\n"));
        }
    }
    prompt
}

/// Strip markdown code fences, locate the first `{` and last `}`, and parse
/// the slice as a JSON object (§4.3 step 5). Anything whose top-level value
/// isn't an object is rejected.
fn parse_json_object(raw: &str) -> Option<serde_json::Map<String, Value>> {
    let stripped = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end < start {
        return None;
    }
    let slice = &stripped[start..=end];
    match serde_json::from_str::<Value>(slice).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// §4.3 step 6: drop absent sentinels/empty values, coerce to string, run
/// type-specific validators.
fn validate_and_coerce(
    vars: &[VariableExtraction],
    mut raw: serde_json::Map<String, Value>,
) -> HashMap<String, Value> {
    let mut out = HashMap::new();
    for v in vars {
        let Some(value) = raw.remove(&v.name) else {
            continue;
        };
        let as_text = match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let trimmed = as_text.trim();
        if trimmed.is_empty() || trimmed == NOT_FOUND || trimmed == NOT_PROVIDED {
            continue;
        }
        if trimmed.chars().count() > 1000 {
            debug!(variable = %v.name, "extracted value exceeds 1000 chars, dropping");
            continue;
        }
        if !passes_type_validator(v, trimmed) {
            debug!(variable = %v.name, "extracted value failed type validation, dropping");
            continue;
        }
        out.insert(v.name.clone(), Value::String(trimmed.to_string()));
    }
    out
}

fn passes_type_validator(var: &VariableExtraction, value: &str) -> bool {
    let name_lower = var.name.to_lowercase();
    let is_email = matches!(var.var_type, VariableType::Email) || name_lower.contains("email");
    let is_phone = matches!(var.var_type, VariableType::Phone)
        || name_lower.contains("phone")
        || name_lower.contains("telefone");
    let is_age = name_lower.contains("age") || name_lower.contains("idade");

    if is_email {
        return value.contains('@') && value.contains('.');
    }
    if is_phone {
        let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
        return digits >= 8;
    }
    if is_age {
        return value.parse::<i64>().map(|n| (0..=150).contains(&n)).unwrap_or(false);
    }
    true
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, required: bool) -> VariableExtraction {
        VariableExtraction {
            name: name.to_string(),
            description: format!("the {name}"),
            required,
            var_type: VariableType::String,
        }
    }

    #[test]
    fn should_continue_when_required_missing() {
        let node = Node {
            extract_vars: vec![var("user_name", true), var("user_email", true)],
            ..sample_node()
        };
        let mut acc = HashMap::new();
        acc.insert("user_name".to_string(), Value::String("John".into()));
        assert!(should_continue_extraction(&node, &acc));
    }

    #[test]
    fn should_not_continue_when_all_required_present() {
        let node = Node {
            extract_vars: vec![var("user_name", true)],
            ..sample_node()
        };
        let mut acc = HashMap::new();
        acc.insert("user_name".to_string(), Value::String("John".into()));
        assert!(!should_continue_extraction(&node, &acc));
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"a\": \"1\"}\n```";
        let parsed = parse_json_object(raw).unwrap();
        assert_eq!(parsed.get("a").unwrap(), "1");
    }

    #[test]
    fn email_validator_rejects_missing_at() {
        let v = var("user_email", true);
        assert!(!passes_type_validator(&v, "not-an-email"));
        assert!(passes_type_validator(&v, "a@b.com"));
    }

    #[test]
    fn age_validator_rejects_out_of_range() {
        let v = var("idade", true);
        assert!(!passes_type_validator(&v, "200"));
        assert!(passes_type_validator(&v, "42"));
    }

    #[test]
    fn validate_and_coerce_drops_not_found_sentinel() {
        let vars = vec![var("user_name", true)];
        let mut map = serde_json::Map::new();
        map.insert("user_name".to_string(), Value::String("NOT_FOUND".into()));
        let out = validate_and_coerce(&vars, map);
        assert!(out.is_empty());
    }

    fn sample_node() -> Node {
        Node {
            id: "n".to_string(),
            node_type: flowengine_flow::model::NodeType::Normal,
            prompt: Default::default(),
            is_start: false,
            is_end: false,
            use_llm: true,
            is_global: false,
            auto_return_to_previous: false,
            extract_vars: Vec::new(),
            temperature: 0.2,
            skip_user_response: false,
            loop_enabled: false,
            loop_condition: String::new(),
            overrides_global_pathway: true,
        }
    }
}
