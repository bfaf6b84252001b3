//! `{{variable_name}}` substitution against `extracted_variables` (§4.6 step
//! 8, §8 law): resolved iff the name is present in the map; unresolved
//! placeholders are preserved verbatim rather than erased.

use std::collections::HashMap;

use serde_json::Value;

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace every `{{name}}` occurrence in `text` with the stringified value
/// of `name` in `variables`, when present. Names not found are left as-is,
/// braces included.
pub fn substitute(text: &str, variables: &HashMap<String, Value>) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(close) = text[i..].find("}}") {
                let name = text[i + 2..i + close].trim();
                if let Some(value) = variables.get(name) {
                    out.push_str(&value_to_text(value));
                    i += close + 2;
                    continue;
                }
            }
        }
        // Not a resolved placeholder (or no matching "}}"): copy one char
        // through verbatim and keep scanning.
        let ch = text[i..].chars().next().unwrap_or('\u{0}');
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_known_variable() {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), json!("Ana"));
        assert_eq!(substitute("Hello {{name}}!", &vars), "Hello Ana!");
    }

    #[test]
    fn leaves_unknown_placeholder_verbatim() {
        let vars = HashMap::new();
        assert_eq!(substitute("Hello {{name}}!", &vars), "Hello {{name}}!");
    }

    #[test]
    fn substitutes_non_string_values() {
        let mut vars = HashMap::new();
        vars.insert("age".to_string(), json!(30));
        assert_eq!(substitute("Age: {{age}}", &vars), "Age: 30");
    }

    #[test]
    fn mixed_known_and_unknown() {
        let mut vars = HashMap::new();
        vars.insert("a".to_string(), json!("1"));
        assert_eq!(substitute("{{a}} and {{b}}", &vars), "1 and {{b}}");
    }
}
