//! The "sandwich" generation prompt (§4.6 step 8): global flow context,
//! then node-specific prompt fields, then a closing reinforcement of the
//! global objective/tone — all passed through `{{variable}}` substitution,
//! wrapped around the session's conversation history.

use flowengine_flow::model::{Flow, Node};
use flowengine_llm::ChatMessage;
use flowengine_sessions::{ChatSession, Role};

use crate::substitution::substitute;

const MAX_HISTORY_MESSAGES: usize = 20;

/// Build the full message list for the response-generation call: one system
/// message carrying the sandwiched prompt, followed by as much recent
/// history as fits, ending with the current user turn.
pub fn build_generation_messages(
    flow: &Flow,
    node: &Node,
    session: &ChatSession,
    user_message: &str,
) -> Vec<ChatMessage> {
    let system = build_system_prompt(flow, node, session);

    let mut messages = vec![ChatMessage::system(system)];
    for entry in recent_history(session) {
        messages.push(match entry.role {
            Role::User => ChatMessage::user(entry.content.clone()),
            Role::Assistant => ChatMessage::assistant(entry.content.clone()),
            Role::System => ChatMessage::system(entry.content.clone()),
        });
    }
    messages.push(ChatMessage::user(user_message.to_string()));
    messages
}

fn build_system_prompt(flow: &Flow, node: &Node, session: &ChatSession) -> String {
    let vars = &session.extracted_variables;
    let mut parts = Vec::new();

    let mut opening = String::new();
    if !flow.global_objective.trim().is_empty() {
        opening.push_str(&format!("Objetivo geral: {}\n", flow.global_objective));
    }
    if !flow.global_tone.trim().is_empty() {
        opening.push_str(&format!("Tom: {}\n", flow.global_tone));
    }
    if !flow.global_language.trim().is_empty() {
        opening.push_str(&format!("Idioma: {}\n", flow.global_language));
    }
    if !flow.global_behaviour.trim().is_empty() {
        opening.push_str(&format!("Comportamento: {}\n", flow.global_behaviour));
    }
    if !flow.global_values.trim().is_empty() {
        opening.push_str(&format!("Valores: {}\n", flow.global_values));
    }
    if !opening.is_empty() {
        parts.push(substitute(opening.trim_end(), vars));
    }

    let p = &node.prompt;
    if !p.context.trim().is_empty() {
        parts.push(format!("Contexto: {}", substitute(&p.context, vars)));
    }
    if !p.objective.trim().is_empty() {
        parts.push(format!("Objetivo do nó: {}", substitute(&p.objective, vars)));
    }
    if !p.notes.trim().is_empty() {
        parts.push(format!("Notas: {}", substitute(&p.notes, vars)));
    }
    if !p.examples.trim().is_empty() {
        parts.push(format!("Exemplos: {}", substitute(&p.examples, vars)));
    }
    for (key, value) in &p.custom_fields {
        if !value.trim().is_empty() {
            parts.push(format!("{key}: {}", substitute(value, vars)));
        }
    }

    if !vars.is_empty() {
        let mut known = String::from("Variáveis conhecidas nesta conversa:\n");
        for (k, v) in vars {
            let text = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            known.push_str(&format!("- {k}: {text}\n"));
        }
        parts.push(known.trim_end().to_string());
    }

    if !flow.global_objective.trim().is_empty() || !flow.global_tone.trim().is_empty() {
        parts.push(substitute(
            "Lembre-se de manter o objetivo geral e o tom definidos acima em toda a resposta.",
            vars,
        ));
    }

    parts.join("\n\n")
}

fn recent_history(session: &ChatSession) -> &[flowengine_sessions::Message] {
    let len = session.history.len();
    let start = len.saturating_sub(MAX_HISTORY_MESSAGES);
    &session.history[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowengine_flow::model::{Connection, NodeType, Prompt};
    use flowengine_sessions::Message;

    fn sample_flow() -> Flow {
        Flow {
            first_node_id: "n1".to_string(),
            nodes: vec![Node {
                id: "n1".to_string(),
                node_type: NodeType::Start,
                prompt: Prompt {
                    context: "Você atende clientes de {{empresa}}.".to_string(),
                    objective: "Coletar o nome.".to_string(),
                    notes: String::new(),
                    examples: String::new(),
                    custom_fields: Default::default(),
                },
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
            }],
            connections: Vec::<Connection>::new(),
            global_objective: "Atender bem o cliente".to_string(),
            global_tone: "Amigável".to_string(),
            global_language: String::new(),
            global_behaviour: String::new(),
            global_values: String::new(),
        }
    }

    #[test]
    fn sandwich_includes_global_and_node_fields_with_substitution() {
        let flow = sample_flow();
        let mut session = ChatSession::new("s1", "n1");
        session
            .extracted_variables
            .insert("empresa".to_string(), serde_json::json!("Acme"));
        let node = flow.get_node("n1").unwrap();
        let messages = build_generation_messages(&flow, node, &session, "oi");

        let system = match &messages[0].role {
            flowengine_llm::ChatRole::System => messages[0].content.clone(),
            _ => panic!("expected system message first"),
        };
        assert!(system.contains("Atender bem o cliente"));
        assert!(system.contains("Você atende clientes de Acme."));
        assert!(system.contains("Coletar o nome."));
    }

    #[test]
    fn history_is_capped_and_ends_with_user_turn() {
        let flow = sample_flow();
        let mut session = ChatSession::new("s1", "n1");
        for i in 0..30 {
            session.history.push(Message::new(Role::User, format!("msg {i}")));
        }
        let node = flow.get_node("n1").unwrap();
        let messages = build_generation_messages(&flow, node, &session, "latest");
        assert!(messages.len() <= MAX_HISTORY_MESSAGES + 2);
        assert_eq!(messages.last().unwrap().content, "latest");
    }
}
