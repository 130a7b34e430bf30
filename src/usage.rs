//! Per-query token usage accounting across agents.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::agent::{CostRates, RunResult};

/// Tokens one agent spent on the current query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageEntry {
    pub agent: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Tracks usage for one query at a time.
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    query: String,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    entries: Vec<UsageEntry>,
    rates: CostRates,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rates(rates: CostRates) -> Self {
        Self {
            rates,
            ..Self::default()
        }
    }

    /// Begin tracking `query`, discarding any earlier log.
    pub fn start_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.started_at = Some(Utc::now());
        self.ended_at = None;
        self.entries.clear();
        tracing::info!("Started query tracking: {}", self.query);
    }

    pub fn log_agent_usage(
        &mut self,
        agent: impl Into<String>,
        model: impl Into<String>,
        input_tokens: u64,
        output_tokens: u64,
    ) {
        let entry = UsageEntry {
            agent: agent.into(),
            model: model.into(),
            input_tokens,
            output_tokens,
        };
        tracing::info!(
            "[{}] Logged usage: model={}, input={}, output={}",
            entry.agent,
            entry.model,
            entry.input_tokens,
            entry.output_tokens
        );
        self.entries.push(entry);
    }

    /// Record the totals of a finished run.
    pub fn log_run(&mut self, result: &RunResult) {
        self.log_agent_usage(
            result.agent_name.clone(),
            result.model_used.clone(),
            result.total_input_tokens,
            result.total_output_tokens,
        );
    }

    /// Stop the clock and return the elapsed time, or `None` if no query was started.
    pub fn end_query(&mut self) -> Option<Duration> {
        let started_at = self.started_at?;
        let ended_at = Utc::now();
        self.ended_at = Some(ended_at);
        let duration = (ended_at - started_at).to_std().unwrap_or_default();
        tracing::info!("Ended query tracking. Duration: {:.2}s", duration.as_secs_f64());
        Some(duration)
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn entries(&self) -> &[UsageEntry] {
        &self.entries
    }

    /// Totals over the logged entries.
    pub fn breakdown(&self) -> UsageBreakdown {
        let total_input_tokens = self.entries.iter().map(|e| e.input_tokens).sum();
        let total_output_tokens = self.entries.iter().map(|e| e.output_tokens).sum();
        let duration = match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        };

        UsageBreakdown {
            query: self.query.clone(),
            entries: self.entries.clone(),
            total_input_tokens,
            total_output_tokens,
            estimated_cost_usd: self.rates.estimate(total_input_tokens, total_output_tokens),
            duration_sec: duration.map(|d| d.as_secs_f64()),
        }
    }
}

/// Usage summary for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageBreakdown {
    pub query: String,
    pub entries: Vec<UsageEntry>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub estimated_cost_usd: f64,
    pub duration_sec: Option<f64>,
}

impl fmt::Display for UsageBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Usage Breakdown ===")?;
        for entry in &self.entries {
            writeln!(
                f,
                "{}: model={}, input_tokens={}, output_tokens={}",
                entry.agent, entry.model, entry.input_tokens, entry.output_tokens
            )?;
        }
        writeln!(f, "Total input tokens: {}", self.total_input_tokens)?;
        writeln!(f, "Total output tokens: {}", self.total_output_tokens)?;
        writeln!(f, "Estimated cost: ${:.6}", self.estimated_cost_usd)?;
        if let Some(secs) = self.duration_sec {
            writeln!(f, "Duration: {:.2}s", secs)?;
        }
        write!(f, "=======================")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_logged_entries() {
        let mut tracker = UsageTracker::new();
        tracker.start_query("rust async runtimes");
        tracker.log_agent_usage("Researcher", "m", 1200, 300);
        tracker.log_agent_usage("Analyst", "m", 800, 200);
        assert!(tracker.end_query().is_some());

        let breakdown = tracker.breakdown();
        assert_eq!(breakdown.query, "rust async runtimes");
        assert_eq!(breakdown.entries.len(), 2);
        assert_eq!(breakdown.total_input_tokens, 2000);
        assert_eq!(breakdown.total_output_tokens, 500);
        assert_eq!(breakdown.estimated_cost_usd, 0.0009);
        assert!(breakdown.duration_sec.is_some());
    }

    #[test]
    fn start_query_resets_the_log() {
        let mut tracker = UsageTracker::new();
        tracker.start_query("first");
        tracker.log_agent_usage("Writer", "m", 10, 10);
        tracker.start_query("second");

        assert!(tracker.entries().is_empty());
        assert_eq!(tracker.query(), "second");
        assert_eq!(tracker.breakdown().duration_sec, None);
    }

    #[test]
    fn end_without_start_has_no_duration() {
        let mut tracker = UsageTracker::new();
        assert_eq!(tracker.end_query(), None);
    }

    #[test]
    fn display_lists_each_agent() {
        let mut tracker = UsageTracker::new();
        tracker.start_query("q");
        tracker.log_agent_usage("Researcher", "z-ai/glm-4.5-air:free", 5, 7);

        let text = tracker.breakdown().to_string();
        assert!(text.starts_with("=== Usage Breakdown ==="));
        assert!(text.contains("Researcher: model=z-ai/glm-4.5-air:free, input_tokens=5, output_tokens=7"));
        assert!(text.contains("Total input tokens: 5"));
        assert!(text.contains("Total output tokens: 7"));
    }
}
