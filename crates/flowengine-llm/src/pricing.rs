//! Per-million-token rate table used to compute `LLMResult.estimated_cost_usd`
//! (§4.1: "cost is computed from provider-specific per-million-token rates").

/// `(input_usd_per_million, output_usd_per_million)`.
fn rate_for(provider: &str, model: &str) -> (f64, f64) {
    match (provider, model) {
        ("anthropic", m) if m.contains("opus") => (15.0, 75.0),
        ("anthropic", m) if m.contains("haiku") => (0.8, 4.0),
        ("anthropic", _) => (3.0, 15.0), // sonnet tier, also the default fallback
        ("openai", m) if m.contains("mini") => (0.15, 0.6),
        ("openai", m) if m.contains("gpt-4o") => (2.5, 10.0),
        ("openai", _) => (1.0, 2.0),
        ("ollama", _) => (0.0, 0.0), // local inference, no metered cost
        _ => (0.0, 0.0),
    }
}

pub fn estimate_cost_usd(provider: &str, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let (input_rate, output_rate) = rate_for(provider, model);
    let input_cost = (input_tokens as f64 / 1_000_000.0) * input_rate;
    let output_cost = (output_tokens as f64 / 1_000_000.0) * output_rate;
    input_cost + output_cost
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_sonnet_cost_is_nonzero() {
        let cost = estimate_cost_usd("anthropic", "claude-3-5-sonnet-latest", 1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn ollama_is_free() {
        assert_eq!(estimate_cost_usd("ollama", "llama3", 10_000, 10_000), 0.0);
    }
}
