//! Pricing - per-model token pricing
//!
//! Pricing tables used for cost estimation and budget accounting.
//! Local models are listed with zero cost so ledger tracking can
//! skip them entirely.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default cost per 1M input tokens (USD) for unknown models
const DEFAULT_INPUT_COST_PER_MILLION: f64 = 5.0;

/// Default cost per 1M output tokens (USD) for unknown models
const DEFAULT_OUTPUT_COST_PER_MILLION: f64 = 15.0;

/// Pricing information for a model (per 1M tokens)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Model name
    pub model: String,
    /// Provider name
    pub provider: String,
    /// Cost per 1M input tokens (USD)
    pub input_cost_per_million: f64,
    /// Cost per 1M output tokens (USD)
    pub output_cost_per_million: f64,
}

impl ModelPricing {
    /// Calculate cost for given token counts
    #[must_use]
    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        let input_cost = (input_tokens as f64 / 1_000_000.0) * self.input_cost_per_million;
        let output_cost = (output_tokens as f64 / 1_000_000.0) * self.output_cost_per_million;
        input_cost + output_cost
    }

    /// Estimate cost for a combined token count when the input/output
    /// split is not yet known (assumes an even split).
    #[must_use]
    pub fn blended_cost(&self, total_tokens: u32) -> f64 {
        let half = f64::from(total_tokens) / 2.0;
        (half / 1_000_000.0) * (self.input_cost_per_million + self.output_cost_per_million)
    }

    /// Whether this model costs nothing to run (local inference)
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.input_cost_per_million == 0.0 && self.output_cost_per_million == 0.0
    }
}

fn entry(model: &str, provider: &str, input: f64, output: f64) -> (String, ModelPricing) {
    (
        model.to_string(),
        ModelPricing {
            model: model.to_string(),
            provider: provider.to_string(),
            input_cost_per_million: input,
            output_cost_per_million: output,
        },
    )
}

/// Default pricing for the models Maestro routes to
#[must_use]
pub fn default_pricing() -> HashMap<String, ModelPricing> {
    HashMap::from([
        // Cloud models
        entry("gpt-4o", "openai", 2.50, 10.00),
        entry("gpt-4o-mini", "openai", 0.15, 0.60),
        entry("claude-3-5-sonnet-20241022", "anthropic", 3.00, 15.00),
        entry("claude-3-opus-20240229", "anthropic", 15.00, 75.00),
        entry("claude-3-haiku-20240307", "anthropic", 0.25, 1.25),
        entry("gemini-1.5-flash", "google", 0.075, 0.30),
        // Local models (free)
        entry("llama3.2", "ollama", 0.0, 0.0),
        entry("mistral", "ollama", 0.0, 0.0),
        entry("qwen2.5-14b", "ollama", 0.0, 0.0),
        entry("qwen2.5-32b", "ollama", 0.0, 0.0),
    ])
}

/// Estimate cost for a model, falling back to default rates for unknown models
#[must_use]
pub fn estimate_cost(
    pricing: &HashMap<String, ModelPricing>,
    model: &str,
    total_tokens: u32,
) -> f64 {
    if let Some(p) = pricing.get(model) {
        p.blended_cost(total_tokens)
    } else {
        let half = f64::from(total_tokens) / 2.0;
        (half / 1_000_000.0) * (DEFAULT_INPUT_COST_PER_MILLION + DEFAULT_OUTPUT_COST_PER_MILLION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_cost() {
        let pricing = default_pricing();
        let sonnet = pricing.get("claude-3-5-sonnet-20241022").unwrap();
        let cost = sonnet.calculate_cost(1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_local_models_are_free() {
        let pricing = default_pricing();
        assert!(pricing.get("llama3.2").unwrap().is_free());
        assert!(pricing.get("qwen2.5-32b").unwrap().is_free());
        assert!(!pricing.get("gpt-4o").unwrap().is_free());
    }

    #[test]
    fn test_unknown_model_uses_default_rates() {
        let pricing = default_pricing();
        let cost = estimate_cost(&pricing, "mystery-model", 1_000_000);
        assert!((cost - 10.0).abs() < f64::EPSILON);
    }
}
