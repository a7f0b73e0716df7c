//! Agent module - the conversation orchestrator.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Build context with system prompt and user task
//! 2. Call LLM with the tool host's tools
//! 3. If the LLM requests tool calls, execute them in order and feed results back
//! 4. Repeat until the LLM produces a final response or the step budget runs out

mod agent_loop;
mod prompt;
mod types;

pub use agent_loop::{BrowserAgent, StepBudget};
pub use prompt::build_system_prompt;
pub use types::{
    Capabilities, DirectToolCall, LogEntryType, TaskLogEntry, TaskOutcome, TaskStatus,
    EMPTY_RESPONSE_FALLBACK, INCOMPLETE_TASK_SENTINEL,
};
