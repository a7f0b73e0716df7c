//! Tool registry: the name → handle table the agent dispatches model tool
//! calls through.
//!
//! The registry is built from the catalog the tool host advertised. Each
//! handle parses and validates the model's raw arguments against the tool's
//! declared schema before anything is sent to the host.

mod schema;

use std::collections::HashMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::llm::{ToolCall, ToolSchema};
use crate::mcp::{McpClient, McpError, ToolDescriptor};

pub use schema::validate;

/// Why a model-issued tool call was not sent to the host.
#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("could not parse arguments for tool '{tool}': {reason}")]
    ArgumentParse { tool: String, reason: String },

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
}

/// One callable tool.
#[derive(Debug, Clone)]
pub struct ToolHandle {
    descriptor: ToolDescriptor,
}

impl ToolHandle {
    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Parse the model's serialized arguments and check them against the schema.
    pub fn prepare(&self, raw_arguments: &str) -> Result<PreparedCall<'_>, ToolCallError> {
        let arguments = parse_arguments(self.name(), raw_arguments)?;
        schema::validate(&self.descriptor.input_schema, &arguments).map_err(|reason| {
            ToolCallError::InvalidArguments {
                tool: self.name().to_string(),
                reason,
            }
        })?;
        Ok(PreparedCall {
            handle: self,
            arguments,
        })
    }
}

/// A validated call, ready to be sent to the host.
#[derive(Debug)]
pub struct PreparedCall<'a> {
    handle: &'a ToolHandle,
    arguments: Value,
}

impl PreparedCall<'_> {
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn arguments(&self) -> &Value {
        &self.arguments
    }

    pub async fn invoke(self, client: &McpClient) -> Result<Value, McpError> {
        client.call_tool(self.handle.name(), self.arguments).await
    }
}

/// Registry of the tools a host offers, in catalog order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolHandle>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a discovered catalog. A repeated name keeps its first entry.
    pub fn from_catalog(catalog: &[ToolDescriptor]) -> Self {
        let mut registry = Self::new();
        for descriptor in catalog {
            if registry.by_name.contains_key(&descriptor.name) {
                tracing::warn!(
                    "Tool host advertised '{}' twice; keeping the first",
                    descriptor.name
                );
                continue;
            }
            registry
                .by_name
                .insert(descriptor.name.clone(), registry.tools.len());
            registry.tools.push(ToolHandle {
                descriptor: descriptor.clone(),
            });
            tracing::debug!("Registered tool: {}", descriptor.name);
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&ToolHandle> {
        self.by_name.get(name).map(|&index| &self.tools[index])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list_tools(&self) -> Vec<&ToolDescriptor> {
        self.tools.iter().map(ToolHandle::descriptor).collect()
    }

    /// Tool definitions in function-calling format.
    pub fn get_tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|tool| {
                ToolSchema::function(
                    tool.descriptor.name.clone(),
                    tool.descriptor.description.clone().unwrap_or_default(),
                    function_parameters(&tool.descriptor.input_schema),
                )
            })
            .collect()
    }

    /// Resolve and validate one model tool call.
    pub fn prepare<'a>(&'a self, call: &ToolCall) -> Result<PreparedCall<'a>, ToolCallError> {
        self.get(&call.function.name)
            .ok_or_else(|| ToolCallError::UnknownTool(call.function.name.clone()))?
            .prepare(&call.function.arguments)
    }
}

/// Empty argument strings mean "no arguments".
fn parse_arguments(tool: &str, raw: &str) -> Result<Value, ToolCallError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(raw).map_err(|e| ToolCallError::ArgumentParse {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

/// Function-calling APIs require an object schema for parameters.
fn function_parameters(input_schema: &Value) -> Value {
    match input_schema {
        Value::Object(schema) if schema.contains_key("type") => input_schema.clone(),
        Value::Object(schema) => {
            let mut schema = schema.clone();
            schema.insert("type".to_string(), Value::String("object".to_string()));
            Value::Object(schema)
        }
        _ => serde_json::json!({"type": "object", "properties": {}}),
    }
}
