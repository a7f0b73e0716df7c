//! Configuration management for the browser agent.
//!
//! Configuration can be set via environment variables:
//! - `OPENROUTER_API_KEY` - Required. API key for the completion endpoint.
//! - `LLM_BASE_URL` - Optional. OpenAI-compatible base URL. Defaults to `https://openrouter.ai/api/v1`.
//! - `DEFAULT_MODEL` - Optional. The LLM model to use. Defaults to `openai/gpt-4o`.
//! - `MAX_STEPS` - Optional. Maximum ask/dispatch cycles per task. Defaults to `20`.
//! - `MCP_SERVER_COMMAND` - Optional. Tool host program. Defaults to `npx`.
//! - `MCP_SERVER_ARGS` - Optional. Whitespace-separated tool host arguments. Defaults to `@playwright/mcp@latest`.
//! - `MCP_REQUEST_TIMEOUT_SECS` - Optional. Per-request timeout for the tool host. Defaults to `60`.

use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Default number of ask/dispatch cycles before a task is cut short.
pub const DEFAULT_MAX_STEPS: usize = 20;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "openai/gpt-4o";
const DEFAULT_MCP_COMMAND: &str = "npx";
const DEFAULT_MCP_ARGS: &str = "@playwright/mcp@latest";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// How to launch and talk to the tool host.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Program to spawn
    pub command: String,

    /// Arguments passed to the program
    pub args: Vec<String>,

    /// Extra environment for the child process
    pub env: HashMap<String, String>,

    /// Upper bound on a single request/response exchange
    pub request_timeout: Duration,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_MCP_COMMAND.to_string(),
            args: split_args(DEFAULT_MCP_ARGS),
            env: HashMap::new(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Completion endpoint API key
    pub api_key: String,

    /// OpenAI-compatible base URL
    pub llm_base_url: String,

    /// Default LLM model identifier
    pub default_model: String,

    /// Maximum ask/dispatch cycles per task
    pub max_steps: usize,

    /// Tool host launch settings
    pub mcp: McpServerConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENROUTER_API_KEY` is not set,
    /// and `ConfigError::InvalidValue` for unparsable numbers or a zero step budget.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string()))?;

        let llm_base_url = std::env::var("LLM_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let default_model =
            std::env::var("DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let max_steps = parse_max_steps(
            &std::env::var("MAX_STEPS").unwrap_or_else(|_| DEFAULT_MAX_STEPS.to_string()),
        )?;

        let command = std::env::var("MCP_SERVER_COMMAND")
            .unwrap_or_else(|_| DEFAULT_MCP_COMMAND.to_string());
        let args = std::env::var("MCP_SERVER_ARGS")
            .map(|v| split_args(&v))
            .unwrap_or_else(|_| split_args(DEFAULT_MCP_ARGS));

        let request_timeout = std::env::var("MCP_REQUEST_TIMEOUT_SECS")
            .ok()
            .map(|v| {
                v.parse::<u64>().map_err(|e| {
                    ConfigError::InvalidValue("MCP_REQUEST_TIMEOUT_SECS".to_string(), e.to_string())
                })
            })
            .transpose()?
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));

        Ok(Self {
            api_key,
            llm_base_url,
            default_model,
            max_steps,
            mcp: McpServerConfig {
                command,
                args,
                env: HashMap::new(),
                request_timeout,
            },
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, default_model: String) -> Self {
        Self {
            api_key,
            llm_base_url: DEFAULT_BASE_URL.to_string(),
            default_model,
            max_steps: DEFAULT_MAX_STEPS,
            mcp: McpServerConfig::default(),
        }
    }
}

fn parse_max_steps(value: &str) -> Result<usize, ConfigError> {
    let steps: usize = value
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue("MAX_STEPS".to_string(), format!("{}", e)))?;
    if steps == 0 {
        return Err(ConfigError::InvalidValue(
            "MAX_STEPS".to_string(),
            "must be at least 1".to_string(),
        ));
    }
    Ok(steps)
}

fn split_args(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}
