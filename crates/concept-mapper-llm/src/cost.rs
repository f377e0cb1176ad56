//! Running cost of provider calls.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::provider::TokenUsage;

/// Accumulates token usage and cost across calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostLedger {
    calls: u64,
    input_tokens: u64,
    output_tokens: u64,
    reasoning_tokens: u64,
    total_cost_usd: f64,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, usage: &TokenUsage) {
        self.calls += 1;
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.reasoning_tokens += usage.reasoning_tokens;
        self.total_cost_usd += usage.total_cost_usd;
    }

    /// Total cost in USD.
    pub fn total_cost(&self) -> f64 {
        self.total_cost_usd
    }

    /// Number of provider calls recorded.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn input_tokens(&self) -> u64 {
        self.input_tokens
    }

    pub fn output_tokens(&self) -> u64 {
        self.output_tokens
    }

    pub fn reasoning_tokens(&self) -> u64 {
        self.reasoning_tokens
    }

    pub fn merge(&mut self, other: &CostLedger) {
        self.calls += other.calls;
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.reasoning_tokens += other.reasoning_tokens;
        self.total_cost_usd += other.total_cost_usd;
    }
}

impl fmt::Display for CostLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} calls, {} input / {} output tokens, ${:.6}",
            self.calls, self.input_tokens, self.output_tokens, self.total_cost_usd
        )
    }
}
