//! Values returned by the agent.

use serde::Serialize;
use serde_json::Value;

use crate::llm::TokenUsage;
use crate::mcp::{ResourceDescriptor, ToolDescriptor};

/// Returned when the model ends its turn with neither text nor tool calls.
pub const EMPTY_RESPONSE_FALLBACK: &str = "Task completed without a final response.";

/// Returned when the step budget runs out before the model finishes.
pub const INCOMPLETE_TASK_SENTINEL: &str =
    "Task incomplete: maximum number of steps reached before the task finished.";

/// How a task run ended.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The model produced a final answer
    Completed,
    /// The step budget was exhausted
    Incomplete,
}

/// Full result of one task run.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    /// Final model text, fallback string or incomplete sentinel
    pub result: String,

    pub status: TaskStatus,

    /// Number of completion requests made
    pub iterations: usize,

    /// Token usage summed over all completion requests
    pub usage: TokenUsage,

    /// Detailed execution log
    pub log: Vec<TaskLogEntry>,
}

/// A single entry in the task execution log.
#[derive(Debug, Clone, Serialize)]
pub struct TaskLogEntry {
    /// Timestamp (RFC 3339)
    pub timestamp: String,

    pub entry_type: LogEntryType,

    /// Content, truncated for logging
    pub content: String,
}

impl TaskLogEntry {
    pub fn new(entry_type: LogEntryType, content: &str, max_len: usize) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            entry_type,
            content: truncate_for_log(content, max_len),
        }
    }
}

/// Types of log entries.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryType {
    /// Text the model emitted alongside tool calls
    Thinking,
    ToolCall,
    ToolResult,
    /// Final response
    Response,
    Error,
}

/// Tools and resources the connected host offers.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub tools: Vec<ToolDescriptor>,
    pub resources: Vec<ResourceDescriptor>,
}

/// A tool call made directly by the caller, bypassing the model.
#[derive(Debug, Clone)]
pub struct DirectToolCall {
    pub tool: String,
    pub arguments: Value,
}

impl DirectToolCall {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }
}

/// Truncate a string for logging purposes, respecting char boundaries.
pub(crate) fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}
