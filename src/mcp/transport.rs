//! Transports that carry JSON-RPC frames to and from a tool host.
//!
//! The stdio transport spawns the host as a child process and exchanges
//! newline-delimited JSON over its stdin/stdout. Stderr is drained into the
//! log so a chatty host can never block on a full pipe.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::McpServerConfig;

/// Grace period for the host to exit after its stdin is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to spawn tool host `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to capture {0} of tool host process")]
    MissingPipe(&'static str),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("tool host closed the connection")]
    Closed,
}

/// A bidirectional frame channel to one tool host.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: Value) -> Result<(), TransportError>;

    /// Next frame from the host. Returns `Closed` once the host is gone.
    async fn recv(&mut self) -> Result<Value, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens fresh transports; the client calls this once per `connect()`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Transport>, TransportError>;

    /// Human-readable target, used in log lines.
    fn describe(&self) -> String;
}

/// Spawns the tool host as a child process.
#[derive(Debug, Clone)]
pub struct StdioConnector {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl StdioConnector {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: HashMap::new(),
        }
    }

    pub fn from_config(config: &McpServerConfig) -> Self {
        Self {
            program: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
        }
    }
}

#[async_trait]
impl Connector for StdioConnector {
    async fn open(&self) -> Result<Box<dyn Transport>, TransportError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| TransportError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or(TransportError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(TransportError::MissingPipe("stdout"))?;

        let stderr_task = child.stderr.take().map(|stderr| {
            let program = self.program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(host = %program, "{}", line);
                }
            })
        });

        info!("Spawned tool host: {}", self.describe());

        Ok(Box::new(StdioTransport {
            child: Some(child),
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            stderr_task,
        }))
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

struct StdioTransport {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<()>>,
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, frame: Value) -> Result<(), TransportError> {
        let stdin = self.stdin.as_mut().ok_or(TransportError::Closed)?;
        let mut line = serde_json::to_string(&frame)?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Value, TransportError> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or(TransportError::Closed)?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(frame) => return Ok(frame),
                // Some hosts print banners on stdout before speaking JSON-RPC.
                Err(e) => warn!("Ignoring non-JSON line from tool host ({}): {}", e, trimmed),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // Closing stdin is the polite shutdown signal for stdio hosts.
        drop(self.stdin.take());

        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!("Tool host exited with {}", status),
                Ok(Err(e)) => warn!("Failed to wait for tool host: {}", e),
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill tool host process: {}", e);
                    } else {
                        info!("Tool host process killed");
                    }
                }
            }
        }

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        Ok(())
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}
