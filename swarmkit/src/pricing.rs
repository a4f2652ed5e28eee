//! Model pricing table and aggregate cost computation.
//!
//! The resolver only needs to hand back per-token rates for a model id; it doesn't load
//! capability specs from a config file or DSL.

use std::collections::HashMap;

use crate::message::Usage;

/// Per-million-token rates for one model, in USD.
#[derive(Clone, Copy, Debug)]
pub struct ModelRates {
    pub input_per_million: f64,
    pub output_per_million: f64,
    pub cache_write_per_million: f64,
    pub cache_read_per_million: f64,
}

/// Static local pricing table. A full catalog isn't the point here -- this illustrates the
/// per-model rate lookup the aggregate-cost pass needs; callers can extend it.
pub struct PricingTable {
    rates: HashMap<String, ModelRates>,
}

impl PricingTable {
    pub fn new() -> Self {
        let mut rates = HashMap::new();
        rates.insert(
            "claude-opus".to_string(),
            ModelRates {
                input_per_million: 15.0,
                output_per_million: 75.0,
                cache_write_per_million: 18.75,
                cache_read_per_million: 1.5,
            },
        );
        rates.insert(
            "claude-sonnet".to_string(),
            ModelRates {
                input_per_million: 3.0,
                output_per_million: 15.0,
                cache_write_per_million: 3.75,
                cache_read_per_million: 0.3,
            },
        );
        rates.insert(
            "gpt-5".to_string(),
            ModelRates {
                input_per_million: 5.0,
                output_per_million: 20.0,
                cache_write_per_million: 5.0,
                cache_read_per_million: 0.5,
            },
        );
        Self { rates }
    }

    pub fn with_rate(mut self, model: impl Into<String>, rates: ModelRates) -> Self {
        self.rates.insert(model.into(), rates);
        self
    }

    pub fn rates_for(&self, model: &str) -> Option<ModelRates> {
        self.rates.get(model).copied()
    }

    /// Computes the USD cost of `usage` against `model`'s rates; falls back to zero cost with
    /// a warning for an unknown model rather than failing the whole aggregate-cost pass.
    pub fn cost_for(&self, model: &str, usage: Usage) -> f64 {
        match self.rates_for(model) {
            Some(rates) => {
                let input_cost = usage.input_tokens as f64 / 1_000_000.0 * rates.input_per_million;
                let output_cost = usage.output_tokens as f64 / 1_000_000.0 * rates.output_per_million;
                let cache_cost = usage.cached_tokens as f64 / 1_000_000.0 * rates.cache_read_per_million;
                input_cost + output_cost + cache_cost
            }
            None => {
                tracing::warn!(model, "no pricing entry for model, reporting zero cost");
                0.0
            }
        }
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-agent usage/cost plus the swarm-wide totals.
#[derive(Clone, Debug, Default)]
pub struct AggregateUsage {
    pub per_agent_usage: HashMap<String, Usage>,
    pub per_agent_cost: HashMap<String, f64>,
    pub total_cost: f64,
    pub total_tokens: u64,
}

/// Aggregates usage/cost across every agent instance in an execution, given each instance's
/// name, model id, and final `Usage` snapshot.
pub fn aggregate(table: &PricingTable, instances: &[(String, String, Usage)]) -> AggregateUsage {
    let mut out = AggregateUsage::default();
    for (name, model, usage) in instances {
        let cost = table.cost_for(model, *usage);
        out.per_agent_usage.insert(name.clone(), *usage);
        out.per_agent_cost.insert(name.clone(), cost);
        out.total_cost += cost;
        out.total_tokens += usage.input_tokens + usage.output_tokens;
    }
    out
}
