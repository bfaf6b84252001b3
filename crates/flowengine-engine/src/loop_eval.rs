//! Loop Evaluator (§4.5): decides whether a node with an active loop
//! condition should keep re-prompting instead of advancing.

use std::sync::Arc;

use tracing::debug;

use flowengine_flow::model::Node;
use flowengine_llm::{ChatMessage, LlmClient};
use flowengine_sessions::ChatSession;

const LOOP_TEMPERATURE: f32 = 0.1;
const HISTORY_WINDOW: usize = 6;

#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub should_continue_loop: bool,
    pub raw_response: Option<String>,
    pub success: bool,
    pub timing_ms: f64,
}

pub struct LoopEvaluator {
    llm: Arc<dyn LlmClient>,
}

impl LoopEvaluator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// §4.5 step 1: nodes without an active loop condition never invoke the
    /// LLM and always report `should_continue_loop = false`.
    pub async fn evaluate(&self, node: &Node, session: &ChatSession) -> LoopOutcome {
        if !node.has_active_loop_condition() {
            return LoopOutcome {
                should_continue_loop: false,
                raw_response: None,
                success: true,
                timing_ms: 0.0,
            };
        }

        let system = build_system_prompt(&node.loop_condition, session);
        let messages = vec![ChatMessage::system(system)];
        let started = std::time::Instant::now();
        let result = self.llm.chat(&messages, LOOP_TEMPERATURE).await;
        let timing_ms = round1(started.elapsed().as_secs_f64() * 1000.0);

        if !result.success {
            debug!("loop evaluation LLM call failed, defaulting to exit loop (fail-safe)");
            return LoopOutcome {
                should_continue_loop: false,
                raw_response: result.error_message,
                success: false,
                timing_ms,
            };
        }

        let text = result.response.unwrap_or_default();
        let should_continue_loop = parse_decision(&text);
        LoopOutcome {
            should_continue_loop,
            raw_response: Some(text),
            success: true,
            timing_ms,
        }
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn build_system_prompt(loop_condition: &str, session: &ChatSession) -> String {
    let mut prompt = format!(
        "Condição de repetição: {loop_condition}\n\n\
         Avalie se a condição ainda é verdadeira com base no histórico recente da conversa. \
         Responda com a palavra PROCEED se a condição foi satisfeita e o fluxo deve avançar, \
         ou com a palavra LOOP se a condição ainda não foi satisfeita e o fluxo deve repetir.\n\n\
         Histórico recente:\n"
    );
    let start = session.history.len().saturating_sub(HISTORY_WINDOW);
    for msg in &session.history[start..] {
        prompt.push_str(&format!("{:?}: {}\n", msg.role, msg.content));
    }
    if !session.extracted_variables.is_empty() {
        prompt.push_str("\nVariáveis extraídas:\n");
        for (k, v) in &session.extracted_variables {
            prompt.push_str(&format!("- {k}: {v}\n"));
        }
    }
    prompt
}

/// Case-insensitive token match, fail-safe against infinite loops: if
/// "PROCEED" appears anywhere, exit the loop regardless of "LOOP" also
/// appearing; only return true when "LOOP" appears and "PROCEED" does not.
fn parse_decision(text: &str) -> bool {
    let upper = text.to_uppercase();
    if upper.contains("PROCEED") {
        return false;
    }
    upper.contains("LOOP")
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowengine_flow::model::{NodeType, Prompt};

    fn node(loop_enabled: bool, condition: &str) -> Node {
        Node {
            id: "n".to_string(),
            node_type: NodeType::Normal,
            prompt: Prompt::default(),
            is_start: false,
            is_end: false,
            use_llm: true,
            is_global: false,
            auto_return_to_previous: false,
            extract_vars: Vec::new(),
            temperature: 0.2,
            skip_user_response: false,
            loop_enabled,
            loop_condition: condition.to_string(),
            overrides_global_pathway: true,
        }
    }

    struct Unreachable;
    #[async_trait::async_trait]
    impl LlmClient for Unreachable {
        async fn chat(&self, _messages: &[ChatMessage], _temperature: f32) -> flowengine_llm::LlmResult {
            panic!("LLM should not be called when loop condition is inactive");
        }
    }

    #[tokio::test]
    async fn inactive_loop_never_calls_llm() {
        let evaluator = LoopEvaluator::new(Arc::new(Unreachable));
        let session = ChatSession::new("s", "n");
        let outcome = evaluator.evaluate(&node(false, ""), &session).await;
        assert!(!outcome.should_continue_loop);
    }

    #[tokio::test]
    async fn enabled_but_blank_condition_never_calls_llm() {
        let evaluator = LoopEvaluator::new(Arc::new(Unreachable));
        let session = ChatSession::new("s", "n");
        let outcome = evaluator.evaluate(&node(true, "   "), &session).await;
        assert!(!outcome.should_continue_loop);
    }

    #[test]
    fn proceed_always_wins_over_loop() {
        assert!(!parse_decision("I think we should PROCEED, not LOOP"));
    }

    #[test]
    fn loop_without_proceed_returns_true() {
        assert!(parse_decision("the user should LOOP back"));
    }

    #[test]
    fn neither_token_defaults_to_false() {
        assert!(!parse_decision("unclear answer"));
    }
}
