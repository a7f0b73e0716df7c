//! Model Context Protocol (MCP) client.
//!
//! Owns the connection to an out-of-process tool host, discovers its tool and
//! resource catalogs, and exposes a typed request/response call surface. The
//! client knows nothing about the model or the agent loop.

mod client;
mod protocol;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use thiserror::Error;

pub use client::{decode_tool_result, ConnectionState, McpClient};
pub use protocol::{
    CallToolResult, InitializeResult, ResourceContent, ResourceDescriptor, ServerInfo,
    ToolDescriptor, PROTOCOL_VERSION,
};
pub use transport::{Connector, StdioConnector, Transport, TransportError};

#[derive(Debug, Error)]
pub enum McpError {
    /// Host could not be started or the handshake did not complete.
    #[error("failed to connect to tool host: {0}")]
    Connection(String),

    #[error("tool host is not connected")]
    NotConnected,

    /// The host reported an error for one tool call.
    #[error("tool '{tool}' failed: {message}")]
    ToolInvocation { tool: String, message: String },

    #[error("tool host rejected {method}: {message} (code {code})")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("tool host did not answer {method} within {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    #[error("malformed {method} response from tool host: {source}")]
    Protocol {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}
