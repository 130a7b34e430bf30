//! Core agent loop implementation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::DEFAULT_MODEL;
use crate::llm::{ChatMessage, LlmClient, LlmError, TokenUsage, ToolCall, ToolDefinition};
use crate::tools::{Tool, ToolOutcome};

use super::trace::{CostRates, RunResult, StepRecord, Termination, ToolCallRecord};

/// Step budget used when the builder is not given one.
pub const DEFAULT_MAX_STEPS: usize = 5;

/// Errors that end an agent run.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Model request failed: {0}")]
    Model(#[from] LlmError),

    #[error("Agent '{agent}' finished without an answer")]
    NoAnswer { agent: String },
}

/// A named agent: one model, a step budget, a system prompt and a tool set.
///
/// `run` keeps all conversation state local, so one agent can serve
/// concurrent invocations.
pub struct Agent {
    name: String,
    model: String,
    max_steps: usize,
    system_prompt: String,
    tools: Vec<Arc<Tool>>,
    llm: Arc<dyn LlmClient>,
    cost_rates: CostRates,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("max_steps", &self.max_steps)
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// Builder for [`Agent`].
pub struct AgentBuilder {
    name: String,
    llm: Arc<dyn LlmClient>,
    model: Option<String>,
    max_steps: usize,
    system_prompt: Option<String>,
    tools: Vec<Arc<Tool>>,
    cost_rates: CostRates,
}

impl AgentBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Maximum model turns per run. Zero is raised to one.
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = Arc<Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn cost_rates(mut self, rates: CostRates) -> Self {
        self.cost_rates = rates;
        self
    }

    pub fn build(self) -> Agent {
        let system_prompt = self
            .system_prompt
            .unwrap_or_else(|| format!("You are {}.", self.name));
        Agent {
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            name: self.name,
            max_steps: self.max_steps,
            system_prompt,
            tools: self.tools,
            llm: self.llm,
            cost_rates: self.cost_rates,
        }
    }
}

impl Agent {
    pub fn builder(name: impl Into<String>, llm: Arc<dyn LlmClient>) -> AgentBuilder {
        AgentBuilder {
            name: name.into(),
            llm,
            model: None,
            max_steps: DEFAULT_MAX_STEPS,
            system_prompt: None,
            tools: Vec::new(),
            cost_rates: CostRates::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &[Arc<Tool>] {
        &self.tools
    }

    /// Answer `query`, calling tools as the model requests them.
    ///
    /// Stops on the first turn without tool calls, when the model repeats
    /// earlier non-empty content, or after `max_steps` turns. Tool failures
    /// are fed back to the model; only model endpoint failures end the run
    /// with an error.
    pub async fn run(&self, query: &str) -> Result<RunResult, AgentError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("agent_run", agent = %self.name, %run_id);
        self.run_inner(run_id, query).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, query: &str) -> Result<RunResult, AgentError> {
        let mut messages = vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(query),
        ];

        let tool_schemas: Vec<ToolDefinition> =
            self.tools.iter().map(|t| t.to_openai_schema()).collect();
        let tool_schemas = (!tool_schemas.is_empty()).then_some(tool_schemas.as_slice());

        let mut trace = Vec::new();
        let mut seen_responses: HashSet<String> = HashSet::new();
        let mut usage = TokenUsage::default();
        let mut answer = None;
        let mut termination = Termination::StepBudgetExhausted;

        for step in 1..=self.max_steps {
            tracing::debug!("{} step {}/{}", self.name, step, self.max_steps);

            let started = Instant::now();
            let response = self
                .llm
                .chat_completion(&self.model, &messages, tool_schemas)
                .await?;
            let latency = started.elapsed();

            if let Some(step_usage) = response.usage {
                usage.prompt_tokens += step_usage.prompt_tokens;
                usage.completion_tokens += step_usage.completion_tokens;
            }

            if let Some(text) = response.content.as_deref().filter(|c| !c.is_empty()) {
                if !seen_responses.insert(text.to_string()) {
                    tracing::info!(
                        "{} repeated an earlier response at step {}; stopping",
                        self.name,
                        step
                    );
                    termination = Termination::LoopDetected { step };
                    break;
                }
            }

            let mut record = StepRecord {
                step,
                model_response: response.content.clone(),
                tools_called: Vec::new(),
                latency,
            };

            if !response.has_tool_calls() {
                messages.push(ChatMessage::assistant(response.content.clone(), Vec::new()));
                answer = response.content;
                trace.push(record);
                termination = Termination::FinalAnswer;
                break;
            }

            messages.push(ChatMessage::assistant(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let Some(tool) = self.find_tool(&call.function.name) else {
                    tracing::warn!(
                        "{} requested unknown tool '{}'; skipping",
                        self.name,
                        call.function.name
                    );
                    continue;
                };

                let result = self.dispatch(tool, call).await;
                messages.push(ChatMessage::tool(call.id.clone(), result.clone()));
                record.tools_called.push(ToolCallRecord {
                    tool_name: call.function.name.clone(),
                    result,
                });
            }

            trace.push(record);
        }

        let estimated_cost_usd = self
            .cost_rates
            .estimate(usage.prompt_tokens, usage.completion_tokens);

        tracing::info!(
            "{} finished after {} step(s) ({:?}): {} input / {} output tokens, ${:.6}",
            self.name,
            trace.len(),
            termination,
            usage.prompt_tokens,
            usage.completion_tokens,
            estimated_cost_usd
        );

        Ok(RunResult {
            run_id,
            agent_name: self.name.clone(),
            model_used: self.model.clone(),
            answer,
            trace,
            total_input_tokens: usage.prompt_tokens,
            total_output_tokens: usage.completion_tokens,
            estimated_cost_usd,
            termination,
        })
    }

    fn find_tool(&self, name: &str) -> Option<&Arc<Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Execute one tool call and return the text fed back to the model.
    async fn dispatch(&self, tool: &Tool, call: &ToolCall) -> String {
        tracing::info!(
            "Tool executed: {} with args: {}",
            tool.name(),
            call.function.arguments
        );

        let outcome = match parse_arguments(&call.function.arguments) {
            Ok(args) => tool.execute(args).await,
            Err(e) => ToolOutcome::ValidationFailed {
                tool: tool.name().to_string(),
                detail: format!("invalid JSON arguments: {}", e),
            },
        };

        if !outcome.is_ok() {
            tracing::debug!("{}", outcome);
        }
        outcome.into_text()
    }
}

/// Parse the raw argument payload. An empty payload means no arguments.
fn parse_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, Role, ScriptedClient};
    use crate::tools::{ParamSpec, ParamType, ToolSpec};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn add_numbers() -> Arc<Tool> {
        let spec = ToolSpec::new("add_numbers", "Add two integers")
            .category("math")
            .param(ParamSpec::required("a", ParamType::Integer))
            .param(ParamSpec::required("b", ParamType::Integer));
        Arc::new(Tool::from_fn(spec, |args| async move {
            Ok(json!(args.i64("a")? + args.i64("b")?))
        }))
    }

    fn counting_tool(counter: Arc<AtomicUsize>) -> Arc<Tool> {
        let spec = ToolSpec::new("lookup", "Counts invocations");
        Arc::new(Tool::from_fn(spec, move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!("nothing found"))
            }
        }))
    }

    fn tool_turn(content: Option<&str>, calls: Vec<ToolCall>) -> ChatResponse {
        ChatResponse {
            content: content.map(str::to_string),
            ..Default::default()
        }
        .with_tool_calls(calls)
    }

    fn agent(llm: Arc<ScriptedClient>, max_steps: usize, tools: Vec<Arc<Tool>>) -> Agent {
        Agent::builder("tester", llm)
            .model("test-model")
            .max_steps(max_steps)
            .tools(tools)
            .build()
    }

    #[tokio::test]
    async fn plain_answer_ends_on_first_step() {
        let llm = Arc::new(ScriptedClient::new([ChatResponse::text("Paris")]));
        let agent = agent(llm.clone(), 1, vec![]);

        let result = agent.run("What is the capital of France?").await.unwrap();

        assert_eq!(result.answer.as_deref(), Some("Paris"));
        assert_eq!(result.termination, Termination::FinalAnswer);
        assert_eq!(result.trace.len(), 1);
        assert!(result.trace[0].tools_called.is_empty());
        assert_eq!(result.agent_name, "tester");
        assert_eq!(result.model_used, "test-model");

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tools.is_none());
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages[0].content.as_deref(), Some("You are tester."));
        assert_eq!(
            requests[0].messages[1].content.as_deref(),
            Some("What is the capital of France?")
        );
    }

    #[tokio::test]
    async fn tool_result_is_fed_back_to_the_model() {
        let llm = Arc::new(ScriptedClient::new([
            tool_turn(
                None,
                vec![ToolCall::new("call_1", "add_numbers", r#"{"a": 2, "b": 3}"#)],
            ),
            ChatResponse::text("The sum is 5"),
        ]));
        let agent = agent(llm.clone(), 5, vec![add_numbers()]);

        let result = agent.run("Add 2 and 3").await.unwrap();

        assert_eq!(result.answer.as_deref(), Some("The sum is 5"));
        assert_eq!(result.trace.len(), 2);
        assert_eq!(
            result.trace[0].tools_called,
            vec![ToolCallRecord {
                tool_name: "add_numbers".to_string(),
                result: "5".to_string(),
            }]
        );
        assert!(result.trace[1].tools_called.is_empty());

        let requests = llm.requests();
        let schemas = requests[0].tools.as_ref().expect("schemas sent");
        assert_eq!(schemas[0].function.name, "add_numbers");

        let second = &requests[1].messages;
        assert_eq!(second.len(), 4);
        assert_eq!(second[2].role, Role::Assistant);
        assert_eq!(second[2].tool_calls.as_ref().map(Vec::len), Some(1));
        assert_eq!(second[3], ChatMessage::tool("call_1", "5"));
    }

    #[tokio::test]
    async fn repeated_content_stops_without_dispatch() {
        let counter = Arc::new(AtomicUsize::new(0));
        let call = || vec![ToolCall::new("c", "lookup", "{}")];
        let llm = Arc::new(ScriptedClient::new([
            tool_turn(Some("I don't know"), call()),
            tool_turn(Some("I don't know"), call()),
            ChatResponse::text("unreachable"),
        ]));
        let agent = agent(llm.clone(), 5, vec![counting_tool(counter.clone())]);

        let result = agent.run("anything").await.unwrap();

        assert_eq!(result.termination, Termination::LoopDetected { step: 2 });
        assert_eq!(result.answer, None);
        assert_eq!(result.trace.len(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(llm.remaining(), 1);
    }

    #[tokio::test]
    async fn empty_content_does_not_count_as_repetition() {
        let call = || vec![ToolCall::new("c", "add_numbers", r#"{"a":1,"b":1}"#)];
        let llm = Arc::new(ScriptedClient::new([
            tool_turn(Some(""), call()),
            tool_turn(Some(""), call()),
            tool_turn(None, call()),
            ChatResponse::text("2"),
        ]));
        let agent = agent(llm, 5, vec![add_numbers()]);

        let result = agent.run("1+1").await.unwrap();

        assert_eq!(result.termination, Termination::FinalAnswer);
        assert_eq!(result.trace.len(), 4);
    }

    #[tokio::test]
    async fn step_budget_bounds_the_trace() {
        let llm = Arc::new(ScriptedClient::new((1..=10).map(|i| {
            tool_turn(
                Some(format!("thinking {}", i).as_str()),
                vec![ToolCall::new(format!("c{}", i), "add_numbers", r#"{"a":1,"b":2}"#)],
            )
        })));
        let agent = agent(llm.clone(), 3, vec![add_numbers()]);

        let result = agent.run("loop forever").await.unwrap();

        assert_eq!(result.termination, Termination::StepBudgetExhausted);
        assert_eq!(result.answer, None);
        assert_eq!(result.trace.len(), 3);
        assert_eq!(llm.requests().len(), 3);
        let steps: Vec<_> = result.trace.iter().map(|s| s.step).collect();
        assert_eq!(steps, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn unknown_tool_is_skipped() {
        let llm = Arc::new(ScriptedClient::new([
            tool_turn(
                None,
                vec![
                    ToolCall::new("c1", "delete_everything", "{}"),
                    ToolCall::new("c2", "add_numbers", r#"{"a":4,"b":4}"#),
                ],
            ),
            ChatResponse::text("8"),
        ]));
        let agent = agent(llm.clone(), 5, vec![add_numbers()]);

        let result = agent.run("go").await.unwrap();

        let called: Vec<_> = result.trace[0]
            .tools_called
            .iter()
            .map(|r| r.tool_name.as_str())
            .collect();
        assert_eq!(called, vec!["add_numbers"]);

        let tool_messages: Vec<_> = llm.requests()[1]
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.tool_call_id.clone())
            .collect();
        assert_eq!(tool_messages, vec![Some("c2".to_string())]);
    }

    #[tokio::test]
    async fn malformed_arguments_are_reported_to_the_model() {
        let llm = Arc::new(ScriptedClient::new([
            tool_turn(None, vec![ToolCall::new("c1", "add_numbers", "{not json")]),
            ChatResponse::text("sorry"),
        ]));
        let agent = agent(llm, 5, vec![add_numbers()]);

        let result = agent.run("go").await.unwrap();

        let record = &result.trace[0].tools_called[0];
        assert!(record
            .result
            .starts_with("Validation error in tool 'add_numbers': invalid JSON arguments:"));
        assert_eq!(result.answer.as_deref(), Some("sorry"));
    }

    #[tokio::test]
    async fn validation_failures_do_not_end_the_run() {
        let llm = Arc::new(ScriptedClient::new([
            tool_turn(None, vec![ToolCall::new("c1", "add_numbers", r#"{"a":1}"#)]),
            ChatResponse::text("missing b"),
        ]));
        let agent = agent(llm, 5, vec![add_numbers()]);

        let result = agent.run("go").await.unwrap();

        assert!(result.trace[0].tools_called[0]
            .result
            .starts_with("Validation error in tool 'add_numbers'"));
        assert_eq!(result.termination, Termination::FinalAnswer);
    }

    #[tokio::test]
    async fn token_usage_accumulates_across_steps() {
        let llm = Arc::new(ScriptedClient::new([
            tool_turn(None, vec![ToolCall::new("c1", "add_numbers", r#"{"a":1,"b":2}"#)])
                .with_usage(1000, 200),
            ChatResponse::text("3"),
            // no usage reported on the final step
        ]));
        let agent = agent(llm, 5, vec![add_numbers()]);

        let result = agent.run("1+2").await.unwrap();

        assert_eq!(result.total_input_tokens, 1000);
        assert_eq!(result.total_output_tokens, 200);
        assert_eq!(result.estimated_cost_usd, 0.00042);
        assert_eq!(result.estimated_cost(&CostRates::default()), 0.00042);
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let llm = Arc::new(
            ScriptedClient::default().then_fail(LlmError::Auth {
                status: 401,
                body: "bad key".to_string(),
            }),
        );
        let agent = agent(llm, 3, vec![]);

        let err = agent.run("anything").await.unwrap_err();
        assert!(matches!(err, AgentError::Model(LlmError::Auth { status: 401, .. })));
    }

    #[test]
    fn empty_arguments_mean_no_arguments() {
        assert_eq!(parse_arguments("").unwrap(), json!({}));
        assert_eq!(parse_arguments("  ").unwrap(), json!({}));
        assert!(parse_arguments("[1,").is_err());
    }

    #[test]
    fn builder_defaults() {
        let agent = Agent::builder("helper", Arc::new(ScriptedClient::default())).build();
        assert_eq!(agent.model(), DEFAULT_MODEL);
        assert_eq!(agent.max_steps(), DEFAULT_MAX_STEPS);
        assert_eq!(agent.system_prompt(), "You are helper.");
        assert!(agent.tools().is_empty());

        let agent = Agent::builder("helper", Arc::new(ScriptedClient::default()))
            .max_steps(0)
            .build();
        assert_eq!(agent.max_steps(), 1);
    }
}
