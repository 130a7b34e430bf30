//! A single callable tool with schema-validated invocation.
//!
//! Every outcome of [`Tool::execute`] is a [`ToolOutcome`], which renders to
//! the text fed back into the conversation. Nothing a tool does can fail
//! past this boundary.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::schema::{ParamType, ToolSpec};
use crate::llm::ToolDefinition;

/// Canonical result text for a tool that returned nothing.
pub const NO_RESULT: &str = "No result returned.";

/// The callable behind a tool.
///
/// Receives arguments already validated and coerced against the tool's
/// [`ToolSpec`]. Returning `Value::Null` means "no result".
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: ToolArgs) -> anyhow::Result<Value>;
}

/// Adapter that lets an async closure act as a [`ToolHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, args: ToolArgs) -> anyhow::Result<Value> {
        (self.0)(args).await
    }
}

/// Validated, coerced arguments for one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs(Map<String, Value>);

impl ToolArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn str(&self, name: &str) -> anyhow::Result<&str> {
        self.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("Missing '{}' argument", name))
    }

    pub fn i64(&self, name: &str) -> anyhow::Result<i64> {
        self.get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow::anyhow!("Missing '{}' argument", name))
    }
}

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Ok(String),
    ValidationFailed { tool: String, detail: String },
    ExecutionFailed { tool: String, detail: String },
}

impl ToolOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// The text the model sees.
    pub fn into_text(self) -> String {
        match self {
            Self::Ok(text) => text,
            other => other.to_string(),
        }
    }
}

impl fmt::Display for ToolOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(text) => f.write_str(text),
            Self::ValidationFailed { tool, detail } => {
                write!(f, "Validation error in tool '{}': {}", tool, detail)
            }
            Self::ExecutionFailed { tool, detail } => {
                write!(f, "Execution error in tool '{}': {}", tool, detail)
            }
        }
    }
}

/// A tool: its spec plus the callable that implements it.
#[derive(Clone)]
pub struct Tool {
    spec: ToolSpec,
    handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool").field("spec", &self.spec).finish()
    }
}

impl Tool {
    pub fn new(spec: ToolSpec, handler: impl ToolHandler + 'static) -> Self {
        Self {
            spec,
            handler: Arc::new(handler),
        }
    }

    /// Build a tool from an async closure.
    pub fn from_fn<F, Fut>(spec: ToolSpec, f: F) -> Self
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(spec, FnHandler(f))
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn description(&self) -> &str {
        &self.spec.description
    }

    pub fn category(&self) -> &str {
        &self.spec.category
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub fn to_openai_schema(&self) -> ToolDefinition {
        self.spec.to_openai_schema()
    }

    /// Check `args` against the declared parameters, inserting defaults and coercing types.
    ///
    /// All problems are reported together, separated by `"; "`.
    pub fn validate(&self, args: Value) -> Result<ToolArgs, String> {
        let mut supplied = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(format!(
                    "arguments must be an object, got {}",
                    value_kind(&other)
                ))
            }
        };

        let mut errors = Vec::new();
        let mut validated = Map::new();

        for param in &self.spec.params {
            match supplied.remove(&param.name) {
                Some(Value::Null) | None => match &param.default {
                    Some(default) => {
                        validated.insert(param.name.clone(), default.clone());
                    }
                    None => errors.push(format!("missing required parameter '{}'", param.name)),
                },
                Some(value) => match coerce(param.ty, value) {
                    Ok(v) => {
                        validated.insert(param.name.clone(), v);
                    }
                    Err(e) => errors.push(format!("parameter '{}': {}", param.name, e)),
                },
            }
        }

        for unknown in supplied.keys() {
            errors.push(format!("unexpected parameter '{}'", unknown));
        }

        if errors.is_empty() {
            Ok(ToolArgs(validated))
        } else {
            Err(errors.join("; "))
        }
    }

    /// Validate and run. Never fails: every problem becomes a [`ToolOutcome`].
    pub async fn execute(&self, args: Value) -> ToolOutcome {
        let args = match self.validate(args) {
            Ok(args) => args,
            Err(detail) => {
                return ToolOutcome::ValidationFailed {
                    tool: self.spec.name.clone(),
                    detail,
                }
            }
        };

        match self.handler.call(args).await {
            Ok(value) => ToolOutcome::Ok(render_value(value)),
            Err(e) => ToolOutcome::ExecutionFailed {
                tool: self.spec.name.clone(),
                detail: format!("{:#}", e),
            },
        }
    }
}

/// Normalize a handler result to text.
fn render_value(value: Value) -> String {
    match value {
        Value::Null => NO_RESULT.to_string(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(ty: ParamType, value: &Value) -> String {
    format!("expected {}, got {} {}", ty, value_kind(value), value)
}

/// Lax coercion: numeric strings become numbers, whole floats become integers,
/// and common boolean spellings become booleans.
fn coerce(ty: ParamType, value: Value) -> Result<Value, String> {
    match ty {
        ParamType::String => match value {
            Value::String(_) => Ok(value),
            other => Err(mismatch(ty, &other)),
        },
        ParamType::Integer => {
            if value.is_i64() || value.is_u64() {
                return Ok(value);
            }
            let parsed = match &value {
                Value::Number(n) => n
                    .as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .filter(|f| *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                    .map(|f| Value::from(f as i64)),
                Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
                _ => None,
            };
            parsed.ok_or_else(|| mismatch(ty, &value))
        }
        ParamType::Number => {
            if value.is_number() {
                return Ok(value);
            }
            let parsed = match &value {
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number),
                _ => None,
            };
            parsed.ok_or_else(|| mismatch(ty, &value))
        }
        ParamType::Boolean => {
            let parsed = match &value {
                Value::Bool(b) => Some(*b),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Some(false),
                    Some(1) => Some(true),
                    _ => None,
                },
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "true" | "yes" | "on" | "1" => Some(true),
                    "false" | "no" | "off" | "0" => Some(false),
                    _ => None,
                },
                _ => None,
            };
            parsed.map(Value::Bool).ok_or_else(|| mismatch(ty, &value))
        }
        ParamType::Array => match value {
            Value::Array(_) => Ok(value),
            other => Err(mismatch(ty, &other)),
        },
        ParamType::Object => match value {
            Value::Object(_) => Ok(value),
            other => Err(mismatch(ty, &other)),
        },
    }
}
