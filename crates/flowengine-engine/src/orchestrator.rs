//! Orchestrator (§4.6): the one-turn state machine composing the variable
//! extractor, pathway selector, and loop evaluator, emitting the full
//! lifecycle event sequence a turn produces.

use std::sync::Arc;

use serde_json::Value;

use flowengine_core::config::MAX_USER_MESSAGE_CHARS;
use flowengine_flow::model::{Flow, Node};
use flowengine_llm::LlmClient;
use flowengine_protocol::event::{DecisionStep, Event, EventKind, NodePromptSnapshot};
use flowengine_sessions::{ChatSession, Message, Role};

use crate::extractor::{missing_required_descriptions, should_continue_extraction, VariableExtractor};
use crate::loop_eval::LoopEvaluator;
use crate::pathway::PathwaySelector;
use crate::prompt::build_generation_messages;

const GENERIC_ERROR_REPLY: &str =
    "Desculpe, houve um problema ao processar sua mensagem. Por favor, tente novamente.";

#[derive(Debug, Clone, Default)]
pub struct StepTimings {
    pub total_ms: f64,
    pub extraction_ms: Option<f64>,
    pub loop_evaluation_ms: Option<f64>,
    pub pathway_ms: Option<f64>,
    pub generation_ms: Option<f64>,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub model_name: String,
}

pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    extractor: VariableExtractor,
    pathway: PathwaySelector,
    loop_eval: LoopEvaluator,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            extractor: VariableExtractor::new(llm.clone()),
            pathway: PathwaySelector::new(llm.clone()),
            loop_eval: LoopEvaluator::new(llm.clone()),
            llm,
        }
    }

    /// True when the flow's current node would cause the caller to run
    /// another `run_step` with the auto-advance sentinel (§4.6 step 11).
    /// Callers bound this to [`flowengine_core::config::MAX_AUTO_ADVANCE`]
    /// successive invocations.
    pub fn current_node_skips_user_response(&self, flow: &Flow, session: &ChatSession) -> bool {
        flow.get_node(&session.current_node_id)
            .map(|n| n.skip_user_response)
            .unwrap_or(false)
    }

    pub async fn run_step(
        &self,
        flow: &Flow,
        session: &mut ChatSession,
        user_message: &str,
    ) -> (String, StepTimings, Vec<Event>) {
        let started = std::time::Instant::now();
        let mut events = Vec::new();

        // Step 1: validate inputs.
        if user_message.trim().is_empty()
            || user_message.chars().count() > MAX_USER_MESSAGE_CHARS
            || session.current_node_id.trim().is_empty()
        {
            return (
                GENERIC_ERROR_REPLY.to_string(),
                StepTimings {
                    total_ms: 0.0,
                    model_name: "error".to_string(),
                    ..Default::default()
                },
                events,
            );
        }

        // Step 2: append user message, emit user_message.
        session.history.push(Message::new(Role::User, user_message));
        events.push(Event::new(
            EventKind::UserMessage {
                content: user_message.to_string(),
            },
            session.session_id.clone(),
        ));

        // Step 3: resolve current node.
        let Some(node) = flow.get_node(&session.current_node_id).cloned() else {
            events.push(Event::new(
                EventKind::Error {
                    code: "node_not_found".to_string(),
                    message: format!("node {} not found in flow", session.current_node_id),
                },
                session.session_id.clone(),
            ));
            return (
                GENERIC_ERROR_REPLY.to_string(),
                StepTimings {
                    total_ms: round1(started.elapsed().as_secs_f64() * 1000.0),
                    model_name: "error".to_string(),
                    ..Default::default()
                },
                events,
            );
        };

        // Step 4: variable extraction.
        if !node.extract_vars.is_empty() {
            let outcome = self.extractor.extract(&node, session).await;
            for (name, value) in &outcome.extracted {
                session.extracted_variables.insert(name.clone(), value.clone());
                events.push(Event::new(
                    EventKind::VariableExtracted {
                        name: name.clone(),
                        value: value.clone(),
                    },
                    session.session_id.clone(),
                ));
            }

            if should_continue_extraction(&node, &session.extracted_variables) {
                let missing = missing_required_descriptions(&node, &session.extracted_variables);
                let reply = clarification_reply(&missing);
                session.history.push(Message::new(Role::Assistant, &reply));
                events.push(Event::new(
                    EventKind::AssistantMessage { content: reply.clone() },
                    session.session_id.clone(),
                ));
                events.push(decision_step_event(
                    &session.session_id,
                    "awaiting_required_variables",
                    &node,
                    &session.previous_node_id,
                    None,
                    &[],
                    None,
                    None,
                    None,
                    &session.extracted_variables,
                    Some(reply.clone()),
                    outcome.timing_ms,
                    0,
                    0.0,
                    "extraction",
                ));
                return (
                    reply,
                    StepTimings {
                        total_ms: round1(started.elapsed().as_secs_f64() * 1000.0),
                        extraction_ms: Some(outcome.timing_ms),
                        model_name: "extraction".to_string(),
                        ..Default::default()
                    },
                    events,
                );
            }
        }

        // Step 5: loop evaluation.
        if node.has_active_loop_condition() {
            let loop_outcome = self.loop_eval.evaluate(&node, session).await;
            if loop_outcome.should_continue_loop {
                let messages = build_generation_messages(flow, &node, session, user_message);
                let result = self.llm.chat(&messages, node.temperature).await;
                let reply = result.response.clone().unwrap_or_else(|| GENERIC_ERROR_REPLY.to_string());

                events.push(Event::new(
                    EventKind::ResponseGenerated { node_id: node.id.clone() },
                    session.session_id.clone(),
                ));
                session.history.push(Message::new(Role::Assistant, &reply));
                events.push(Event::new(
                    EventKind::AssistantMessage { content: reply.clone() },
                    session.session_id.clone(),
                ));
                events.push(decision_step_event(
                    &session.session_id,
                    "looping",
                    &node,
                    &session.previous_node_id,
                    None,
                    &[],
                    None,
                    loop_outcome.raw_response.clone(),
                    None,
                    &session.extracted_variables,
                    Some(reply.clone()),
                    result.timing_ms,
                    result.total_tokens,
                    result.estimated_cost_usd,
                    &result.model_name,
                ));
                return (
                    reply,
                    StepTimings {
                        total_ms: round1(started.elapsed().as_secs_f64() * 1000.0),
                        loop_evaluation_ms: Some(loop_outcome.timing_ms),
                        generation_ms: Some(result.timing_ms),
                        tokens_used: result.total_tokens,
                        cost_usd: result.estimated_cost_usd,
                        model_name: result.model_name,
                        ..Default::default()
                    },
                    events,
                );
            }
        }

        // Step 6: pathway selection.
        let previous_node_id = node.id.clone();
        session.previous_node_id = Some(previous_node_id.clone());
        let pathway_outcome = self.pathway.select(flow, session, &node.id).await;

        events.push(Event::new(
            EventKind::NodeExited { node_id: previous_node_id.clone() },
            session.session_id.clone(),
        ));
        events.push(Event::new(
            EventKind::PathwaySelected {
                from_node_id: previous_node_id.clone(),
                to_node_id: pathway_outcome.next_node_id.clone(),
                confidence_score: pathway_outcome.confidence_score,
                candidates: pathway_outcome.candidates.clone(),
                reasoning: pathway_outcome.raw_response.clone(),
            },
            session.session_id.clone(),
        ));

        // Step 7: enter new node.
        session.current_node_id = pathway_outcome.next_node_id.clone();
        events.push(Event::new(
            EventKind::NodeEntered { node_id: session.current_node_id.clone() },
            session.session_id.clone(),
        ));

        let Some(next_node) = flow.get_node(&session.current_node_id).cloned() else {
            events.push(Event::new(
                EventKind::Error {
                    code: "node_not_found".to_string(),
                    message: format!("node {} not found after pathway selection", session.current_node_id),
                },
                session.session_id.clone(),
            ));
            return (
                GENERIC_ERROR_REPLY.to_string(),
                StepTimings {
                    total_ms: round1(started.elapsed().as_secs_f64() * 1000.0),
                    model_name: "error".to_string(),
                    ..Default::default()
                },
                events,
            );
        };

        // Step 8: generate the sandwiched response.
        let messages = build_generation_messages(flow, &next_node, session, user_message);
        let result = self.llm.chat(&messages, next_node.temperature).await;
        let reply = result.response.clone().unwrap_or_else(|| GENERIC_ERROR_REPLY.to_string());
        events.push(Event::new(
            EventKind::ResponseGenerated { node_id: next_node.id.clone() },
            session.session_id.clone(),
        ));

        // Step 9: append reply, emit assistant_message and decision_step.
        session.history.push(Message::new(Role::Assistant, &reply));
        events.push(Event::new(
            EventKind::AssistantMessage { content: reply.clone() },
            session.session_id.clone(),
        ));
        // tokens_used/cost_usd sum the pathway-selection and
        // response-generation LLMResults.
        let combined_tokens = pathway_outcome.tokens_used + result.total_tokens;
        let combined_cost = pathway_outcome.cost_usd + result.estimated_cost_usd;

        events.push(decision_step_event(
            &session.session_id,
            "advance",
            &next_node,
            &Some(previous_node_id.clone()),
            Some(pathway_outcome.candidates.clone()),
            &pathway_outcome.candidates,
            Some(pathway_outcome.confidence_score),
            Some(pathway_outcome.raw_response.clone()),
            Some(pathway_outcome.next_node_id.clone()),
            &session.extracted_variables,
            Some(reply.clone()),
            result.timing_ms,
            combined_tokens,
            combined_cost,
            &result.model_name,
        ));

        // Step 10: transient global-node visit.
        if next_node.auto_return_to_previous {
            if let Some(prev) = session.previous_node_id.clone() {
                session.current_node_id = prev;
            }
        }

        let timings = StepTimings {
            total_ms: round1(started.elapsed().as_secs_f64() * 1000.0),
            pathway_ms: Some(pathway_outcome.timing_ms),
            generation_ms: Some(result.timing_ms),
            tokens_used: combined_tokens,
            cost_usd: combined_cost,
            model_name: result.model_name,
            ..Default::default()
        };

        (reply, timings, events)
    }
}

fn clarification_reply(missing: &[String]) -> String {
    if missing.is_empty() {
        return GENERIC_ERROR_REPLY.to_string();
    }
    format!(
        "Antes de continuar, preciso que você me informe: {}.",
        missing.join(", ")
    )
}

#[allow(clippy::too_many_arguments)]
fn decision_step_event(
    session_id: &str,
    step_name: &str,
    node: &Node,
    previous_node_id: &Option<String>,
    available_pathways: Option<Vec<String>>,
    candidates: &[String],
    pathway_confidence: Option<u8>,
    llm_reasoning: Option<String>,
    chosen_pathway: Option<String>,
    variables: &std::collections::HashMap<String, Value>,
    assistant_response: Option<String>,
    timing_ms: f64,
    tokens_used: u64,
    cost_usd: f64,
    model_name: &str,
) -> Event {
    let mut variables_extracted = serde_json::Map::new();
    for (k, v) in variables {
        variables_extracted.insert(k.clone(), v.clone());
    }

    let step = DecisionStep {
        step_name: step_name.to_string(),
        node_id: node.id.clone(),
        node_name: node.id.clone(),
        node_prompt: NodePromptSnapshot {
            context: node.prompt.context.clone(),
            objective: node.prompt.objective.clone(),
            notes: node.prompt.notes.clone(),
            examples: node.prompt.examples.clone(),
        },
        previous_node_id: previous_node_id.clone(),
        previous_node_name: previous_node_id.clone(),
        available_pathways: available_pathways.unwrap_or_else(|| candidates.to_vec()),
        chosen_pathway,
        pathway_confidence,
        llm_reasoning,
        variables_extracted,
        variables_status: serde_json::Map::new(),
        assistant_response,
        timing_ms,
        tokens_used,
        cost_usd,
        model_name: model_name.to_string(),
    };
    Event::new(EventKind::DecisionStep(Box::new(step)), session_id.to_string())
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowengine_flow::model::{Connection, NodeType, Prompt};
    use flowengine_llm::{ChatMessage, LlmResult};

    struct ScriptedLlm {
        response: String,
    }

    #[async_trait::async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat(&self, _messages: &[ChatMessage], _temperature: f32) -> LlmResult {
            LlmResult {
                success: true,
                response: Some(self.response.clone()),
                error_message: None,
                timing_ms: 1.0,
                model_name: "scripted".to_string(),
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
                estimated_cost_usd: 0.0001,
            }
        }
    }

    fn simple_flow() -> Flow {
        Flow {
            first_node_id: "start".to_string(),
            nodes: vec![
                Node {
                    id: "start".to_string(),
                    node_type: NodeType::Start,
                    prompt: Prompt::default(),
                    is_start: true,
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
                },
                Node {
                    id: "end".to_string(),
                    node_type: NodeType::End,
                    prompt: Prompt::default(),
                    is_start: false,
                    is_end: true,
                    use_llm: true,
                    is_global: false,
                    auto_return_to_previous: false,
                    extract_vars: Vec::new(),
                    temperature: 0.2,
                    skip_user_response: false,
                    loop_enabled: false,
                    loop_condition: String::new(),
                    overrides_global_pathway: true,
                },
            ],
            connections: vec![Connection {
                id: "c1".to_string(),
                label: "end".to_string(),
                description: "go to end".to_string(),
                else_option: false,
                source: "start".to_string(),
                target: "end".to_string(),
            }],
            global_objective: String::new(),
            global_tone: String::new(),
            global_language: String::new(),
            global_behaviour: String::new(),
            global_values: String::new(),
        }
    }

    #[tokio::test]
    async fn rejects_empty_user_message() {
        let orchestrator = Orchestrator::new(Arc::new(ScriptedLlm { response: "end".to_string() }));
        let flow = simple_flow();
        let mut session = ChatSession::new("s1", "start");
        let (reply, timings, events) = orchestrator.run_step(&flow, &mut session, "   ").await;
        assert_eq!(reply, GENERIC_ERROR_REPLY);
        assert_eq!(timings.model_name, "error");
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn advances_to_next_node_and_emits_full_event_sequence() {
        let orchestrator = Orchestrator::new(Arc::new(ScriptedLlm { response: "end".to_string() }));
        let flow = simple_flow();
        let mut session = ChatSession::new("s1", "start");
        let (reply, _timings, events) = orchestrator.run_step(&flow, &mut session, "vamos terminar").await;

        assert_eq!(reply, "end");
        assert_eq!(session.current_node_id, "end");
        assert!(matches!(events[0].kind, EventKind::UserMessage { .. }));
        assert!(events.iter().any(|e| matches!(e.kind, EventKind::NodeExited { .. })));
        assert!(events.iter().any(|e| matches!(e.kind, EventKind::PathwaySelected { .. })));
        assert!(events.iter().any(|e| matches!(e.kind, EventKind::NodeEntered { .. })));
        assert!(events.iter().any(|e| matches!(e.kind, EventKind::ResponseGenerated { .. })));
        assert!(events.iter().any(|e| matches!(e.kind, EventKind::AssistantMessage { .. })));
        assert!(events.iter().any(|e| matches!(e.kind, EventKind::DecisionStep(_))));
    }

    #[tokio::test]
    async fn missing_node_emits_error_and_returns_canned_reply() {
        let orchestrator = Orchestrator::new(Arc::new(ScriptedLlm { response: "x".to_string() }));
        let flow = simple_flow();
        let mut session = ChatSession::new("s1", "ghost");
        let (reply, timings, events) = orchestrator.run_step(&flow, &mut session, "oi").await;
        assert_eq!(reply, GENERIC_ERROR_REPLY);
        assert_eq!(timings.model_name, "error");
        assert!(events.iter().any(|e| matches!(e.kind, EventKind::Error { .. })));
    }
}
