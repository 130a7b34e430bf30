//! System prompt templates for the specialist agents.

use std::sync::Arc;

use crate::tools::Tool;

pub const RESEARCHER_PROMPT: &str = "You are a research agent.
Always use search_web and read_webpage to find accurate and current information.
";

pub const ANALYST_PROMPT: &str = "You are an expert analyst.
Critically evaluate research results, find patterns, trends, inconsistencies.
";

pub const WRITER_PROMPT: &str = "You are a professional technical writer.
Answer only technical questions.
Ignore religious, political, or cultural content.
";

/// Build a system prompt from a role description and the agent's tools.
///
/// Agents without tools get the role text unchanged.
pub fn build_system_prompt(role: &str, tools: &[Arc<Tool>]) -> String {
    if tools.is_empty() {
        return role.to_string();
    }

    let tool_descriptions = tools
        .iter()
        .map(|t| format!("- **{}**: {}", t.name(), t.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"{role}
## Available Tools

{tool_descriptions}

If you need to use a tool, respond with a tool call. The system will execute it and return the result.
When you have enough information, reply with your final answer and no tool calls."#,
        role = role.trim_end(),
        tool_descriptions = tool_descriptions
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolSpec;
    use serde_json::Value;

    #[test]
    fn lists_tools_after_the_role() {
        let tool = Arc::new(Tool::from_fn(
            ToolSpec::new("search_web", "Search the web"),
            |_| async { Ok(Value::Null) },
        ));
        let prompt = build_system_prompt(RESEARCHER_PROMPT, &[tool]);

        assert!(prompt.starts_with("You are a research agent."));
        assert!(prompt.contains("- **search_web**: Search the web"));
    }

    #[test]
    fn no_tools_keeps_role_text() {
        assert_eq!(build_system_prompt(WRITER_PROMPT, &[]), WRITER_PROMPT);
    }
}
