//! # Research Agents
//!
//! Tool-using LLM agents and a researcher, analyst and writer pipeline.
//!
//! This library provides:
//! - A bounded agent loop with tool dispatch, loop detection and usage accounting
//! - A tool registry with declarative, validated tool schemas
//! - Web search and page reading tools
//! - Integration with OpenRouter for LLM access
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Build context with system prompt and the user query
//! 2. Call the model with the agent's tool schemas
//! 3. Execute requested tool calls and feed results back
//! 4. Repeat until the model answers, repeats itself, or the step budget runs out
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use research_agents::{agent::Agent, llm::OpenRouterClient};
//!
//! let llm = Arc::new(OpenRouterClient::new(api_key));
//! let agent = Agent::builder("helper", llm).max_steps(3).build();
//! let result = agent.run("What is the capital of France?").await?;
//! ```

pub mod agent;
pub mod config;
pub mod llm;
pub mod pipeline;
pub mod tools;
pub mod usage;

pub use config::Config;
