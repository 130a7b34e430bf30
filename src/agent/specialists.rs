//! Preconfigured researcher, analyst and writer agents.

use std::sync::Arc;

use crate::llm::LlmClient;
use crate::tools::{ToolRegistry, RESEARCH_CATEGORY};

use super::prompt::{build_system_prompt, ANALYST_PROMPT, RESEARCHER_PROMPT, WRITER_PROMPT};
use super::Agent;

pub const RESEARCHER: &str = "Researcher";
pub const ANALYST: &str = "Analyst";
pub const WRITER: &str = "Writer";

fn specialist(
    name: &str,
    role: &str,
    registry: &ToolRegistry,
    llm: Arc<dyn LlmClient>,
    model: &str,
    max_steps: usize,
) -> Agent {
    let tools = registry.get_tools_by_category(RESEARCH_CATEGORY);
    Agent::builder(name, llm)
        .model(model)
        .max_steps(max_steps)
        .system_prompt(build_system_prompt(role, &tools))
        .tools(tools)
        .build()
}

/// Gathers sources with the web tools.
pub fn create_researcher(
    registry: &ToolRegistry,
    llm: Arc<dyn LlmClient>,
    model: &str,
    max_steps: usize,
) -> Agent {
    specialist(RESEARCHER, RESEARCHER_PROMPT, registry, llm, model, max_steps)
}

/// Evaluates research output for patterns and inconsistencies.
pub fn create_analyst(
    registry: &ToolRegistry,
    llm: Arc<dyn LlmClient>,
    model: &str,
    max_steps: usize,
) -> Agent {
    specialist(ANALYST, ANALYST_PROMPT, registry, llm, model, max_steps)
}

/// Turns the analysis into the final technical write-up.
pub fn create_writer(
    registry: &ToolRegistry,
    llm: Arc<dyn LlmClient>,
    model: &str,
    max_steps: usize,
) -> Agent {
    specialist(WRITER, WRITER_PROMPT, registry, llm, model, max_steps)
}
