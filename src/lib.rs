//! # Browser Agent
//!
//! A tool-augmented conversation orchestrator: a language model drives an
//! out-of-process tool host (for example a browser automation server) over
//! the Model Context Protocol until it produces a final answer.
//!
//! This library provides:
//! - An MCP client speaking JSON-RPC over a child process's stdio
//! - A tool registry that validates model tool calls against host schemas
//! - A bounded agent loop against an OpenAI-compatible completion endpoint
//!
//! ## Example
//!
//! ```rust,ignore
//! use browser_agent::{BrowserAgent, Config};
//!
//! let config = Config::from_env()?;
//! let result = BrowserAgent::from_config(&config)
//!     .run_once("Find the title of example.com")
//!     .await?;
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod tools;

pub use agent::BrowserAgent;
pub use config::Config;
pub use error::AgentError;
