//! Core agent loop implementation.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::config::{Config, DEFAULT_MAX_STEPS};
use crate::error::AgentError;
use crate::llm::{ChatMessage, LlmClient, OpenAiCompatibleClient, TokenUsage, ToolCall};
use crate::mcp::{McpClient, McpError};
use crate::tools::ToolRegistry;

use super::prompt::build_system_prompt;
use super::types::{
    Capabilities, DirectToolCall, LogEntryType, TaskLogEntry, TaskOutcome, TaskStatus,
    EMPTY_RESPONSE_FALLBACK, INCOMPLETE_TASK_SENTINEL,
};

const TOOL_LOG_LIMIT: usize = 1000;
const RESPONSE_LOG_LIMIT: usize = 2000;

/// Remaining ask/dispatch cycles for one task.
#[derive(Debug, Clone, Copy)]
pub struct StepBudget {
    remaining: usize,
}

impl StepBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            remaining: limit.max(1),
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Spend one step. Returns `true` once the budget is exhausted.
    pub fn consume(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining == 0
    }
}

/// The browser agent: one task in, one result out, with the tool host's
/// tools as the only side-effecting capability.
///
/// Lifecycle is explicit: `initialize()` before use, `cleanup()` on every exit
/// path. `run_once` does both around a single task.
pub struct BrowserAgent {
    llm: Arc<dyn LlmClient>,
    client: McpClient,
    model: String,
    max_steps: usize,
    tools: ToolRegistry,
}

impl BrowserAgent {
    pub fn new(llm: Arc<dyn LlmClient>, client: McpClient, model: impl Into<String>) -> Self {
        Self {
            llm,
            client,
            model: model.into(),
            max_steps: DEFAULT_MAX_STEPS,
            tools: ToolRegistry::new(),
        }
    }

    /// Agent backed by the OpenAI-compatible endpoint and a stdio tool host.
    pub fn from_config(config: &Config) -> Self {
        let llm = Arc::new(OpenAiCompatibleClient::new(
            config.api_key.clone(),
            config.llm_base_url.clone(),
        ));
        let client = McpClient::from_config(&config.mcp);
        Self::new(llm, client, config.default_model.clone()).with_max_steps(config.max_steps)
    }

    /// Override the step budget (at least one step).
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn client(&self) -> &McpClient {
        &self.client
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Connect to the tool host and cache its tool catalog.
    pub async fn initialize(&mut self) -> Result<(), AgentError> {
        self.client.connect().await?;
        let catalog = self.client.list_tools().await?;
        self.tools = ToolRegistry::from_catalog(&catalog);
        info!("Agent initialized with {} tools", self.tools.len());
        Ok(())
    }

    /// Disconnect from the tool host.
    pub async fn cleanup(&mut self) {
        self.client.disconnect().await;
        self.tools = ToolRegistry::new();
    }

    /// Run a task and return the final text.
    pub async fn process_message(&self, task: &str) -> Result<String, AgentError> {
        self.run_task(task).await.map(|outcome| outcome.result)
    }

    /// Run a task and return the final text with status, usage and execution log.
    pub async fn run_task(&self, task: &str) -> Result<TaskOutcome, AgentError> {
        if !self.client.is_connected() {
            return Err(McpError::NotConnected.into());
        }
        let run_id = Uuid::new_v4();
        self.run_loop(task)
            .instrument(tracing::info_span!("task", %run_id))
            .await
    }

    /// Call a tool directly when one is given, otherwise let the model drive.
    pub async fn execute_browser_task(
        &self,
        description: &str,
        direct: Option<DirectToolCall>,
    ) -> Result<String, AgentError> {
        match direct {
            Some(call) => {
                info!("Executing tool {} directly: {}", call.tool, description);
                let value = self.client.call_tool(&call.tool, call.arguments).await?;
                Ok(render_tool_result(&value))
            }
            None => self.process_message(description).await,
        }
    }

    /// Tools and resources the host offers.
    pub async fn list_capabilities(&self) -> Result<Capabilities, AgentError> {
        Ok(Capabilities {
            tools: self.client.list_tools().await?,
            resources: self.client.list_resources().await?,
        })
    }

    /// Initialize, run one task, and clean up on every exit path.
    pub async fn run_once(mut self, task: &str) -> Result<String, AgentError> {
        let result = match self.initialize().await {
            Ok(()) => self.process_message(task).await,
            Err(e) => Err(e),
        };
        self.cleanup().await;
        result
    }

    async fn run_loop(&self, task: &str) -> Result<TaskOutcome, AgentError> {
        let mut log = Vec::new();
        let mut usage = TokenUsage::default();
        let mut budget = StepBudget::new(self.max_steps);

        let mut messages = vec![
            ChatMessage::system(build_system_prompt(self.tools.list_tools())),
            ChatMessage::user(task),
        ];

        let tool_schemas = self.tools.get_tool_schemas();
        let tool_schemas = (!tool_schemas.is_empty()).then_some(tool_schemas.as_slice());

        let mut iterations = 0;
        loop {
            iterations += 1;
            debug!(
                "Agent iteration {} ({} steps left)",
                iterations,
                budget.remaining()
            );

            let response = self
                .llm
                .chat_completion(&self.model, &messages, tool_schemas)
                .await?;
            if let Some(turn_usage) = &response.usage {
                usage.add(turn_usage);
            }

            let content = response.content;
            let tool_calls = response.tool_calls.unwrap_or_default();

            // Recorded even when empty: tool messages must follow their assistant turn.
            messages.push(ChatMessage::assistant(content.clone(), tool_calls.clone()));

            if tool_calls.is_empty() {
                let result = match content {
                    Some(text) if !text.trim().is_empty() => text,
                    _ => {
                        warn!("Model ended the task with neither text nor tool calls");
                        EMPTY_RESPONSE_FALLBACK.to_string()
                    }
                };
                log.push(TaskLogEntry::new(
                    LogEntryType::Response,
                    &result,
                    RESPONSE_LOG_LIMIT,
                ));
                info!("Task completed after {} iterations", iterations);
                return Ok(TaskOutcome {
                    result,
                    status: TaskStatus::Completed,
                    iterations,
                    usage,
                    log,
                });
            }

            if let Some(thought) = content.as_deref().filter(|t| !t.trim().is_empty()) {
                log.push(TaskLogEntry::new(
                    LogEntryType::Thinking,
                    thought,
                    RESPONSE_LOG_LIMIT,
                ));
            }

            for call in &tool_calls {
                log.push(TaskLogEntry::new(
                    LogEntryType::ToolCall,
                    &format!(
                        "Calling tool: {} with args: {}",
                        call.function.name, call.function.arguments
                    ),
                    TOOL_LOG_LIMIT,
                ));

                let (entry_type, output) = match self.dispatch(call).await {
                    Ok(output) => (LogEntryType::ToolResult, output),
                    Err(output) => (LogEntryType::Error, output),
                };
                log.push(TaskLogEntry::new(entry_type, &output, TOOL_LOG_LIMIT));
                messages.push(ChatMessage::tool(call.id.clone(), output));
            }

            if !self.client.is_connected() {
                warn!("Lost the tool host connection mid-task; aborting");
                log.push(TaskLogEntry::new(
                    LogEntryType::Error,
                    "Tool host connection lost",
                    RESPONSE_LOG_LIMIT,
                ));
                return Err(McpError::NotConnected.into());
            }

            if budget.consume() {
                warn!(
                    "Agent exhausted its step budget ({}) without finishing",
                    self.max_steps
                );
                log.push(TaskLogEntry::new(
                    LogEntryType::Error,
                    INCOMPLETE_TASK_SENTINEL,
                    RESPONSE_LOG_LIMIT,
                ));
                return Ok(TaskOutcome {
                    result: INCOMPLETE_TASK_SENTINEL.to_string(),
                    status: TaskStatus::Incomplete,
                    iterations,
                    usage,
                    log,
                });
            }
        }
    }

    /// Execute a single tool call. Both arms become the tool message content;
    /// nothing here is allowed to abort the loop.
    async fn dispatch(&self, call: &ToolCall) -> Result<String, String> {
        let prepared = self.tools.prepare(call).map_err(|e| {
            warn!("Rejected tool call {}: {}", call.id, e);
            format!("Error: {}", e)
        })?;

        match prepared.invoke(&self.client).await {
            Ok(value) => Ok(render_tool_result(&value)),
            Err(e) => {
                warn!("Tool {} failed: {}", call.function.name, e);
                Err(format!("Error: {}", e))
            }
        }
    }
}

/// Text results go to the model as-is; anything structured as compact JSON.
fn render_tool_result(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
