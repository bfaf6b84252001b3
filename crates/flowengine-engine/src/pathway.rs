//! Pathway Selector (§4.4): choose the next node among a current node's
//! outgoing connections (plus any global nodes) by asking the LLM to name
//! one, then resolving its free-text answer against the candidate labels
//! with fuzzy string similarity — the LLM never reports its own confidence.

use std::sync::Arc;

use tracing::warn;

use flowengine_flow::model::{Connection, Flow};
use flowengine_llm::{ChatMessage, LlmClient};
use flowengine_sessions::{ChatSession, Role};

const SELECTION_TEMPERATURE: f32 = 0.3;
const CONFIDENCE_THRESHOLD: u8 = 80;

#[derive(Debug, Clone)]
pub struct PathwayOutcome {
    pub next_node_id: String,
    pub confidence_score: u8,
    pub raw_response: String,
    pub success: bool,
    pub low_confidence: bool,
    pub candidates: Vec<String>,
    pub timing_ms: f64,
    pub tokens_used: u64,
    pub cost_usd: f64,
}

pub struct PathwaySelector {
    llm: Arc<dyn LlmClient>,
}

impl PathwaySelector {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn select(&self, flow: &Flow, session: &ChatSession, current_node_id: &str) -> PathwayOutcome {
        let candidates = flow.pathway_candidates(current_node_id);

        if candidates.is_empty() {
            warn!(node_id = current_node_id, "pathway selector found no candidates, self-looping");
            return PathwayOutcome {
                next_node_id: current_node_id.to_string(),
                confidence_score: 0,
                raw_response: String::new(),
                success: true,
                low_confidence: false,
                candidates: Vec::new(),
                timing_ms: 0.0,
                tokens_used: 0,
                cost_usd: 0.0,
            };
        }

        let labels: Vec<String> = candidates.iter().map(|c| c.label.clone()).collect();
        let user_message = last_user_message(session).unwrap_or_default();
        let system = build_system_prompt(&candidates);
        let messages = vec![
            ChatMessage::system(system),
            ChatMessage::user(format!("Mensagem do usuário: \"{}\"", user_message.replace('"', "\\\""))),
        ];
        let started = std::time::Instant::now();
        let result = self.llm.chat(&messages, SELECTION_TEMPERATURE).await;
        let timing_ms = round1(started.elapsed().as_secs_f64() * 1000.0);

        if !result.success {
            return PathwayOutcome {
                next_node_id: current_node_id.to_string(),
                confidence_score: 0,
                raw_response: result.error_message.unwrap_or_default(),
                success: false,
                low_confidence: true,
                candidates: labels,
                timing_ms,
                tokens_used: 0,
                cost_usd: 0.0,
            };
        }

        let raw_response = result.response.unwrap_or_default();
        let (best, score) = best_match(&candidates, &raw_response);
        let low_confidence = score < CONFIDENCE_THRESHOLD;
        if low_confidence {
            warn!(
                response = %raw_response,
                score,
                "pathway selector confidence below threshold, proceeding with best candidate anyway"
            );
        }

        PathwayOutcome {
            next_node_id: best.target.clone(),
            confidence_score: score,
            raw_response,
            success: true,
            low_confidence,
            candidates: labels,
            timing_ms,
            tokens_used: result.total_tokens,
            cost_usd: result.estimated_cost_usd,
        }
    }
}

fn build_system_prompt(candidates: &[Connection]) -> String {
    let mut prompt = String::from(
        "Escolha qual das opções a seguir melhor corresponde à mensagem do usuário. \
         Responda apenas com o nome da opção escolhida, sem explicações.\n\nOpções:\n",
    );
    for (i, c) in candidates.iter().enumerate() {
        prompt.push_str(&format!("{}. Nome: {}\n   Descrição: {}\n", i + 1, c.label, c.description));
    }
    prompt
}

/// `argmax` over candidates of normalized-Levenshtein similarity with the
/// raw LLM response, scaled to an integer 0-100 (§4.4).
fn best_match<'a>(candidates: &'a [Connection], response: &str) -> (&'a Connection, u8) {
    let normalized_response = response.trim().to_lowercase();
    let mut best = &candidates[0];
    let mut best_score = 0u8;
    for c in candidates {
        let score =
            (strsim::normalized_levenshtein(&normalized_response, &c.label.to_lowercase()) * 100.0).round() as u8;
        if score > best_score {
            best_score = score;
            best = c;
        }
    }
    (best, best_score)
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn last_user_message(session: &ChatSession) -> Option<String> {
    session
        .history
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(label: &str, target: &str) -> Connection {
        Connection {
            id: format!("c-{label}"),
            label: label.to_string(),
            description: String::new(),
            else_option: false,
            source: "n1".to_string(),
            target: target.to_string(),
        }
    }

    #[test]
    fn best_match_prefers_closer_label() {
        let candidates = vec![conn("sim", "t-sim"), conn("nao", "t-nao")];
        let (best, score) = best_match(&candidates, "sim");
        assert_eq!(best.target, "t-sim");
        assert_eq!(score, 100);
    }

    #[test]
    fn best_match_is_case_insensitive() {
        let candidates = vec![conn("Sim", "t-sim"), conn("Nao", "t-nao")];
        let (best, score) = best_match(&candidates, "SIM");
        assert_eq!(best.target, "t-sim");
        assert_eq!(score, 100);
    }
}
