//! Tool system: declarative specs, validated execution, and the registry.
//!
//! A [`ToolRegistry`] is an explicit value. Build it once at startup, wrap it
//! in an `Arc`, and hand tools from it to each agent.

mod schema;
mod tool;
mod web;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

pub use schema::{ParamSpec, ParamType, ToolSpec, DEFAULT_CATEGORY};
pub use tool::{FnHandler, Tool, ToolArgs, ToolHandler, ToolOutcome, NO_RESULT};
pub use web::{register_research_tools, validate_url, ReadWebpage, SearchWeb, RESEARCH_CATEGORY};

use crate::llm::ToolDefinition;

/// Registry of available tools, indexed by name and by category.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<Tool>>,
    /// Registration order across all tools.
    order: Vec<String>,
    /// Category name to tool names, in registration order.
    categories: HashMap<String, Vec<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under the name and category in `spec`.
    pub fn register(&mut self, spec: ToolSpec, handler: impl ToolHandler + 'static) {
        self.register_tool(Tool::new(spec, handler));
    }

    /// Register a prebuilt tool.
    ///
    /// Registering a name twice replaces the earlier tool, and the name is
    /// moved to the new tool's category so listings never hold stale entries.
    pub fn register_tool(&mut self, tool: Tool) {
        let name = tool.name().to_string();
        let category = tool.category().to_string();

        if let Some(previous) = self.tools.get(&name) {
            tracing::warn!(
                "Tool '{}' registered again; replacing previous definition (category '{}' -> '{}')",
                name,
                previous.category(),
                category
            );
            let previous_category = previous.category().to_string();
            if let Some(names) = self.categories.get_mut(&previous_category) {
                names.retain(|n| n != &name);
                if names.is_empty() {
                    self.categories.remove(&previous_category);
                }
            }
        } else {
            self.order.push(name.clone());
        }

        tracing::debug!("Registered tool '{}' in category '{}'", name, category);
        self.categories
            .entry(category)
            .or_default()
            .push(name.clone());
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tools in `category`, in registration order. Unknown categories yield nothing.
    pub fn get_tools_by_category(&self, category: &str) -> Vec<Arc<Tool>> {
        self.categories
            .get(category)
            .map(|names| names.iter().filter_map(|n| self.get_tool(n)).collect())
            .unwrap_or_default()
    }

    pub fn all_tools(&self) -> Vec<Arc<Tool>> {
        self.order.iter().filter_map(|n| self.get_tool(n)).collect()
    }

    /// Category names, sorted.
    pub fn categories(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.categories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Function-calling description of `tool`.
    pub fn to_external_schema(tool: &Tool) -> ToolDefinition {
        tool.to_openai_schema()
    }

    /// Look up and run a tool by name, returning the text result.
    pub async fn execute_tool(&self, name: &str, args: Value) -> String {
        match self.get_tool(name) {
            Some(tool) => tool.execute(args).await.into_text(),
            None => format!("Tool '{}' not found.", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_tool(category: &str) -> Tool {
        let spec = ToolSpec::new("add_numbers", "Add two numbers")
            .category(category)
            .param(ParamSpec::required("a", ParamType::Integer))
            .param(ParamSpec::required("b", ParamType::Integer));
        Tool::from_fn(spec, |args| async move {
            Ok(json!(args.i64("a")? + args.i64("b")?))
        })
    }

    fn constant_tool(name: &str, category: &str, value: &'static str) -> Tool {
        Tool::from_fn(
            ToolSpec::new(name, "Returns a constant").category(category),
            move |_| async move { Ok(json!(value)) },
        )
    }

    #[tokio::test]
    async fn register_lookup_and_execute() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(add_tool("math"));

        let tool = registry.get_tool("add_numbers").expect("tool registered");
        assert_eq!(tool.execute(json!({"a": 10, "b": 5})).await.into_text(), "15");

        let math: Vec<_> = registry
            .get_tools_by_category("math")
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(math, vec!["add_numbers"]);
    }

    #[test]
    fn unknown_category_is_empty() {
        let registry = ToolRegistry::new();
        assert!(registry.get_tools_by_category("nonexistent").is_empty());
        assert!(registry.get_tool("nope").is_none());
    }

    #[test]
    fn category_listing_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(constant_tool("b_tool", "research", "b"));
        registry.register_tool(constant_tool("a_tool", "research", "a"));
        registry.register_tool(constant_tool("c_tool", "general", "c"));

        let names: Vec<_> = registry
            .get_tools_by_category("research")
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names, vec!["b_tool", "a_tool"]);
        assert_eq!(registry.categories(), vec!["general", "research"]);
        assert_eq!(registry.all_tools().len(), 3);
    }

    #[tokio::test]
    async fn duplicate_registration_replaces_without_stale_entries() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(constant_tool("greet", "general", "first"));
        registry.register_tool(constant_tool("greet", "general", "second"));

        assert_eq!(registry.len(), 1);
        let general = registry.get_tools_by_category("general");
        assert_eq!(general.len(), 1);
        assert_eq!(general[0].execute(json!({})).await.into_text(), "second");

        registry.register_tool(constant_tool("greet", "social", "third"));
        assert!(registry.get_tools_by_category("general").is_empty());
        assert_eq!(registry.get_tools_by_category("social").len(), 1);
        assert_eq!(registry.categories(), vec!["social"]);
    }

    #[tokio::test]
    async fn execute_tool_reports_unknown_names() {
        let registry = ToolRegistry::new();
        assert_eq!(
            registry.execute_tool("missing", json!({})).await,
            "Tool 'missing' not found."
        );
    }

    #[test]
    fn external_schema_rejects_additional_properties() {
        let tool = add_tool("math");
        let schema = ToolRegistry::to_external_schema(&tool);
        assert_eq!(schema.function.name, "add_numbers");
        assert_eq!(schema.function.parameters["additionalProperties"], json!(false));
        assert_eq!(schema.function.parameters["required"], json!(["a", "b"]));
    }
}
