//! Client for a single out-of-process tool host.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::protocol::{
    call_tool_params, cursor_params, initialize_params, method_not_found, read_resource_params,
    CallToolResult, IncomingMessage, InitializeResult, JsonRpcError, JsonRpcNotification,
    JsonRpcRequest, ListResourcesResult, ListToolsResult, ReadResourceResult, ResourceContent,
    ResourceDescriptor, ServerInfo, ToolDescriptor,
};
use super::transport::{Connector, StdioConnector, Transport, TransportError};
use super::McpError;
use crate::config::McpServerConfig;

/// Lifecycle of the client's single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Ready => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Ready,
            _ => Self::Disconnected,
        }
    }
}

/// A live, handshaken connection.
struct Session {
    transport: Box<dyn Transport>,
    server: InitializeResult,
    tools: Vec<ToolDescriptor>,
}

/// Why a single request/response exchange failed.
enum RequestFailure {
    NotConnected,
    Transport(TransportError),
    Timeout(Duration),
    Rpc(JsonRpcError),
    Decode(serde_json::Error),
}

impl RequestFailure {
    fn into_error(self, method: &str) -> McpError {
        match self {
            Self::NotConnected => McpError::NotConnected,
            Self::Transport(e) => McpError::Transport(e),
            Self::Timeout(timeout) => McpError::Timeout {
                method: method.to_string(),
                timeout,
            },
            Self::Rpc(e) => McpError::Rpc {
                method: method.to_string(),
                code: e.code,
                message: e.message,
            },
            Self::Decode(source) => McpError::Protocol {
                method: method.to_string(),
                source,
            },
        }
    }
}

/// Request/response client over one tool host connection.
///
/// Requests are serialized through an internal lock, so concurrent callers
/// queue instead of interleaving frames on the transport.
pub struct McpClient {
    connector: Arc<dyn Connector>,
    client_name: String,
    client_version: String,
    request_timeout: Duration,
    next_id: AtomicU64,
    state: AtomicU8,
    session: Mutex<Option<Session>>,
}

impl McpClient {
    pub fn new(connector: Arc<dyn Connector>, request_timeout: Duration) -> Self {
        Self {
            connector,
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            request_timeout,
            next_id: AtomicU64::new(1),
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            session: Mutex::new(None),
        }
    }

    /// Client that spawns the configured host over stdio.
    pub fn from_config(config: &McpServerConfig) -> Self {
        Self::new(
            Arc::new(StdioConnector::from_config(config)),
            config.request_timeout,
        )
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Start the host, perform the handshake and load the tool catalog.
    ///
    /// Calling this while already connected is a no-op.
    pub async fn connect(&self) -> Result<(), McpError> {
        let mut slot = self.session.lock().await;
        if slot.is_some() {
            info!(
                "Tool host already connected ({}), skipping handshake",
                self.connector.describe()
            );
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        match self.open_session().await {
            Ok(session) => {
                info!(
                    "Connected to tool host {} ({} tools)",
                    self.connector.describe(),
                    session.tools.len()
                );
                *slot = Some(session);
                self.set_state(ConnectionState::Ready);
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn open_session(&self) -> Result<Session, McpError> {
        let mut transport = self
            .connector
            .open()
            .await
            .map_err(|e| McpError::Connection(e.to_string()))?;

        match self.handshake(transport.as_mut()).await {
            Ok((server, tools)) => Ok(Session {
                transport,
                server,
                tools,
            }),
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    warn!("Failed to close tool host after handshake error: {}", close_err);
                }
                Err(McpError::Connection(e.to_string()))
            }
        }
    }

    async fn handshake(
        &self,
        transport: &mut dyn Transport,
    ) -> Result<(InitializeResult, Vec<ToolDescriptor>), McpError> {
        let params = initialize_params(&self.client_name, &self.client_version);
        let server: InitializeResult = self
            .typed_exchange(transport, "initialize", Some(params))
            .await?;
        debug!(
            "Tool host handshake complete: protocol={} server={:?}",
            server.protocol_version, server.server_info
        );

        let note = serde_json::to_value(JsonRpcNotification::initialized())
            .map_err(TransportError::Encode)?;
        transport.send(note).await?;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();
        loop {
            let page: ListToolsResult = self
                .typed_exchange(transport, "tools/list", cursor_params(cursor.as_deref()))
                .await?;
            tools.extend(page.tools);
            match next_page(&mut seen, page.next_cursor, "tools/list") {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok((server, tools))
    }

    /// Tear down the transport. Safe to call when already disconnected.
    pub async fn disconnect(&self) {
        let mut slot = self.session.lock().await;
        if let Some(mut session) = slot.take() {
            if let Err(e) = session.transport.close().await {
                warn!("Error while closing tool host transport: {}", e);
            }
            info!("Disconnected from tool host {}", self.connector.describe());
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// The tool catalog discovered during `connect()`.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let slot = self.session.lock().await;
        slot.as_ref()
            .map(|session| session.tools.clone())
            .ok_or(McpError::NotConnected)
    }

    /// Identity the host reported during the handshake.
    pub async fn server_info(&self) -> Result<Option<ServerInfo>, McpError> {
        let slot = self.session.lock().await;
        slot.as_ref()
            .map(|session| session.server.server_info.clone())
            .ok_or(McpError::NotConnected)
    }

    /// Resources the host exposes. Empty when the host has no resources capability.
    pub async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, McpError> {
        let mut slot = self.session.lock().await;
        match slot.as_ref() {
            None => return Err(McpError::NotConnected),
            Some(session) if session.server.capabilities.resources.is_none() => {
                debug!("Tool host does not advertise resources");
                return Ok(Vec::new());
            }
            Some(_) => {}
        }

        let mut resources = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();
        loop {
            let value = self
                .round_trip(&mut slot, "resources/list", cursor_params(cursor.as_deref()))
                .await
                .map_err(|e| e.into_error("resources/list"))?;
            let page: ListResourcesResult = serde_json::from_value(value)
                .map_err(|e| RequestFailure::Decode(e).into_error("resources/list"))?;
            resources.extend(page.resources);
            match next_page(&mut seen, page.next_cursor, "resources/list") {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(resources)
    }

    /// Fetch the contents of one resource.
    pub async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContent>, McpError> {
        let mut slot = self.session.lock().await;
        let value = self
            .round_trip(&mut slot, "resources/read", Some(read_resource_params(uri)))
            .await
            .map_err(|e| e.into_error("resources/read"))?;
        let result: ReadResourceResult = serde_json::from_value(value)
            .map_err(|e| RequestFailure::Decode(e).into_error("resources/read"))?;
        Ok(result.contents)
    }

    /// Invoke a tool on the host and decode its payload.
    ///
    /// The host is the source of truth for tool names; nothing is checked
    /// against the cached catalog here.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, McpError> {
        let mut slot = self.session.lock().await;
        debug!("Calling tool host: name={}", name);

        let value = match self
            .round_trip(&mut slot, "tools/call", Some(call_tool_params(name, arguments)))
            .await
        {
            Ok(value) => value,
            Err(RequestFailure::Rpc(e)) => {
                return Err(McpError::ToolInvocation {
                    tool: name.to_string(),
                    message: e.to_string(),
                })
            }
            Err(other) => return Err(other.into_error("tools/call")),
        };

        let result: CallToolResult = serde_json::from_value(value)
            .map_err(|e| RequestFailure::Decode(e).into_error("tools/call"))?;

        if result.is_error {
            let message = result.joined_text();
            return Err(McpError::ToolInvocation {
                tool: name.to_string(),
                message: if message.is_empty() {
                    "tool reported an error without details".to_string()
                } else {
                    message
                },
            });
        }

        Ok(decode_tool_result(result))
    }

    /// One exchange on the live session. A broken transport drops the session.
    async fn round_trip(
        &self,
        slot: &mut Option<Session>,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, RequestFailure> {
        let session = slot.as_mut().ok_or(RequestFailure::NotConnected)?;
        let result = self
            .exchange(session.transport.as_mut(), method, params)
            .await;

        if let Err(RequestFailure::Transport(e)) = &result {
            warn!(
                "Tool host transport failed during {}: {}; dropping connection",
                method, e
            );
            if let Some(mut dead) = slot.take() {
                if let Err(close_err) = dead.transport.close().await {
                    warn!("Error while closing tool host transport: {}", close_err);
                }
            }
            self.set_state(ConnectionState::Disconnected);
        }
        result
    }

    async fn typed_exchange<T: DeserializeOwned>(
        &self,
        transport: &mut dyn Transport,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, McpError> {
        let value = self
            .exchange(transport, method, params)
            .await
            .map_err(|e| e.into_error(method))?;
        serde_json::from_value(value).map_err(|e| RequestFailure::Decode(e).into_error(method))
    }

    async fn exchange(
        &self,
        transport: &mut dyn Transport,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, RequestFailure> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        let frame = serde_json::to_value(&request).map_err(RequestFailure::Decode)?;
        transport
            .send(frame)
            .await
            .map_err(RequestFailure::Transport)?;

        let response = tokio::time::timeout(self.request_timeout, await_response(transport, id))
            .await
            .map_err(|_| RequestFailure::Timeout(self.request_timeout))??;

        match (response.error, response.result) {
            (Some(error), _) => Err(RequestFailure::Rpc(error)),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}

/// Cursor for the next page, or `None` when listing is done. A cursor the
/// host already handed out ends the listing.
fn next_page(seen: &mut HashSet<String>, next: Option<String>, method: &str) -> Option<String> {
    let next = next?;
    if seen.insert(next.clone()) {
        Some(next)
    } else {
        warn!("Tool host repeated {} cursor {}; stopping pagination", method, next);
        None
    }
}

/// Read frames until the response correlated with `id` arrives.
async fn await_response(
    transport: &mut dyn Transport,
    id: u64,
) -> Result<super::protocol::JsonRpcResponse, RequestFailure> {
    loop {
        let frame = transport.recv().await.map_err(RequestFailure::Transport)?;
        match IncomingMessage::classify(frame) {
            Ok(IncomingMessage::Response(response)) if response.id.as_u64() == Some(id) => {
                return Ok(response)
            }
            Ok(IncomingMessage::Response(response)) => {
                warn!("Received response for unknown request ID: {}", response.id);
            }
            Ok(IncomingMessage::Notification { method }) => {
                debug!("Received tool host notification: method={}", method);
            }
            Ok(IncomingMessage::Request { id: request_id, method }) => {
                warn!("Rejecting unexpected request from tool host: {}", method);
                transport
                    .send(method_not_found(request_id, &method))
                    .await
                    .map_err(RequestFailure::Transport)?;
            }
            Err(e) => warn!("Ignoring malformed frame from tool host: {}", e),
        }
    }
}

/// A single text item is JSON-decoded when possible and otherwise returned
/// verbatim; any other shape is returned as structured content.
pub fn decode_tool_result(result: CallToolResult) -> Value {
    if let Some(text) = result.single_text() {
        return serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));
    }
    if let Some(structured) = result.structured_content {
        return structured;
    }
    Value::Array(result.content)
}
