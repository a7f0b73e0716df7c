//! Errors surfaced to callers of the agent.
//!
//! Only fatal conditions appear here. Failures local to one tool call are
//! turned into tool messages inside the loop and never reach the caller.

use thiserror::Error;

use crate::llm::LlmError;
use crate::mcp::McpError;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Tool host connection problems (connect failure, not connected).
    #[error(transparent)]
    Mcp(#[from] McpError),

    /// The completion endpoint call itself failed.
    #[error(transparent)]
    Llm(#[from] LlmError),
}
