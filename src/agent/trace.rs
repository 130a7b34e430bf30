//! Per-invocation trace, result, and cost estimation types.

use std::time::Duration;

use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Fixed per-1000-token prices used for cost estimates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostRates {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            input_per_1k: 0.0003,
            output_per_1k: 0.0006,
        }
    }
}

impl CostRates {
    /// Estimated USD cost, rounded to six decimals.
    pub fn estimate(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        let input_cost = input_tokens as f64 / 1000.0 * self.input_per_1k;
        let output_cost = output_tokens as f64 / 1000.0 * self.output_per_1k;
        round_to(input_cost + output_cost, 6)
    }
}

/// Estimated cost at the default rates.
pub fn estimate_cost(input_tokens: u64, output_tokens: u64) -> f64 {
    CostRates::default().estimate(input_tokens, output_tokens)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// One tool result recorded during a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub result: String,
}

/// One model turn and the tools it dispatched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    /// 1-based step index.
    pub step: usize,
    pub model_response: Option<String>,
    pub tools_called: Vec<ToolCallRecord>,
    /// Wall-clock time of the model exchange.
    #[serde(rename = "latency_sec", serialize_with = "serialize_secs")]
    pub latency: Duration,
}

fn serialize_secs<S: Serializer>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to(latency.as_secs_f64(), 3))
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// The model answered without requesting tools.
    FinalAnswer,
    /// `max_steps` turns ran without a final answer.
    StepBudgetExhausted,
    /// The model repeated earlier content at `step`; that step was not dispatched.
    LoopDetected { step: usize },
}

/// Result of one [`Agent::run`](super::Agent::run) invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub agent_name: String,
    pub model_used: String,
    pub answer: Option<String>,
    pub trace: Vec<StepRecord>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub estimated_cost_usd: f64,
    pub termination: Termination,
}

impl RunResult {
    /// Recompute the cost estimate from the token totals.
    pub fn estimated_cost(&self, rates: &CostRates) -> f64 {
        rates.estimate(self.total_input_tokens, self.total_output_tokens)
    }
}
