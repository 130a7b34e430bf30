//! Sequential research pipeline: researcher, then analyst, then writer.

use std::sync::Arc;

use serde::Serialize;

use crate::agent::{create_analyst, create_researcher, create_writer, Agent, AgentError, RunResult};
use crate::config::Config;
use crate::llm::LlmClient;
use crate::tools::ToolRegistry;
use crate::usage::{UsageBreakdown, UsageTracker};

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub query: String,
    /// The writer's answer.
    pub final_answer: String,
    /// One result per stage, in order.
    pub results: Vec<RunResult>,
    pub usage: UsageBreakdown,
}

/// Chains three agents, each consuming the previous stage's answer.
pub struct ResearchPipeline {
    stages: [Agent; 3],
}

impl ResearchPipeline {
    pub fn new(researcher: Agent, analyst: Agent, writer: Agent) -> Self {
        Self {
            stages: [researcher, analyst, writer],
        }
    }

    /// Build the three specialists from configuration.
    pub fn from_config(config: &Config, registry: &ToolRegistry, llm: Arc<dyn LlmClient>) -> Self {
        let budgets = config.step_budgets;
        Self::new(
            create_researcher(registry, llm.clone(), &config.model, budgets.researcher),
            create_analyst(registry, llm.clone(), &config.model, budgets.analyst),
            create_writer(registry, llm, &config.model, budgets.writer),
        )
    }

    pub fn stages(&self) -> &[Agent] {
        &self.stages
    }

    /// Run every stage in order.
    ///
    /// A stage that ends without an answer aborts the pipeline with
    /// [`AgentError::NoAnswer`].
    pub async fn run(&self, query: &str) -> Result<PipelineReport, AgentError> {
        let mut tracker = UsageTracker::new();
        tracker.start_query(query);

        let mut results = Vec::with_capacity(self.stages.len());
        let mut input = query.to_string();

        for agent in &self.stages {
            tracing::info!("Running {}", agent.name());
            let result = agent.run(&input).await?;
            tracker.log_run(&result);

            input = result
                .answer
                .clone()
                .filter(|a| !a.trim().is_empty())
                .ok_or_else(|| AgentError::NoAnswer {
                    agent: agent.name().to_string(),
                })?;
            results.push(result);
        }

        tracker.end_query();

        Ok(PipelineReport {
            query: query.to_string(),
            final_answer: input,
            results,
            usage: tracker.breakdown(),
        })
    }
}
