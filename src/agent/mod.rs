//! Agent module - the core autonomous agent logic.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Build context with system prompt and user query
//! 2. Call the model with the agent's tool schemas
//! 3. If the model requests tool calls, execute them and feed results back
//! 4. Repeat until the model answers, repeats itself, or the step budget runs out

mod agent_loop;
mod prompt;
mod specialists;
mod trace;

pub use agent_loop::{Agent, AgentBuilder, AgentError, DEFAULT_MAX_STEPS};
pub use prompt::{build_system_prompt, ANALYST_PROMPT, RESEARCHER_PROMPT, WRITER_PROMPT};
pub use specialists::{create_analyst, create_researcher, create_writer, ANALYST, RESEARCHER, WRITER};
pub use trace::{estimate_cost, CostRates, RunResult, StepRecord, Termination, ToolCallRecord};
