//! MCP protocol types (JSON-RPC 2.0 framing plus the payloads we consume).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision announced during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC "method not found".
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Request to an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Fire-and-forget message; carries no id and gets no response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn initialized() -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: "notifications/initialized".to_string(),
            params: None,
        }
    }
}

/// Response from an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    /// Numeric for our requests, but servers may echo any JSON value.
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// Error frame reported by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// A frame read off the transport, classified by shape.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Response(JsonRpcResponse),
    /// Server-to-client request; we do not serve any methods.
    Request { id: Value, method: String },
    Notification { method: String },
}

impl IncomingMessage {
    pub fn classify(frame: Value) -> Result<Self, serde_json::Error> {
        if let Some(method) = frame.get("method").and_then(Value::as_str) {
            let method = method.to_string();
            return Ok(match frame.get("id") {
                Some(id) if !id.is_null() => Self::Request {
                    id: id.clone(),
                    method,
                },
                _ => Self::Notification { method },
            });
        }
        serde_json::from_value(frame).map(Self::Response)
    }
}

/// Reply sent for host-initiated requests we cannot serve.
pub fn method_not_found(id: Value, method: &str) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": {
            "code": METHOD_NOT_FOUND,
            "message": format!("Method not found: {}", method),
        }
    })
}

pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": client_name,
            "version": client_version,
        }
    })
}

pub fn cursor_params(cursor: Option<&str>) -> Option<Value> {
    cursor.map(|c| json!({ "cursor": c }))
}

pub fn call_tool_params(name: &str, arguments: Value) -> Value {
    json!({
        "name": name,
        "arguments": arguments,
    })
}

pub fn read_resource_params(uri: &str) -> Value {
    json!({ "uri": uri })
}

/// Result of the `initialize` handshake.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// A tool advertised by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's arguments.
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: Option<&str>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.map(str::to_string),
            input_schema,
        }
    }
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Addressable, non-tool content exposed by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResult {
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64-encoded binary payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    #[serde(default)]
    pub contents: Vec<ResourceContent>,
}

/// Result of calling a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content items (`{"type": "text", "text": ...}`, images, embedded resources).
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    /// Text of the item if the result is exactly one text item.
    pub fn single_text(&self) -> Option<&str> {
        match self.content.as_slice() {
            [only] => text_of(only),
            _ => None,
        }
    }

    /// All text items joined by newlines; used for error reporting.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(text_of)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn text_of(item: &Value) -> Option<&str> {
    if item.get("type").and_then(Value::as_str) == Some("text") {
        item.get("text").and_then(Value::as_str)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_without_params_when_absent() {
        let request = JsonRpcRequest::new(7, "tools/list", None);
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#
        );
    }

    #[test]
    fn classify_distinguishes_frames() {
        let response = IncomingMessage::classify(json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
        assert!(matches!(response, Ok(IncomingMessage::Response(r)) if r.id == json!(1)));

        let note = IncomingMessage::classify(
            json!({"jsonrpc": "2.0", "method": "notifications/progress"}),
        );
        assert!(matches!(
            note,
            Ok(IncomingMessage::Notification { method }) if method == "notifications/progress"
        ));

        let request =
            IncomingMessage::classify(json!({"jsonrpc": "2.0", "id": "a", "method": "roots/list"}));
        assert!(matches!(
            request,
            Ok(IncomingMessage::Request { method, .. }) if method == "roots/list"
        ));
    }

    #[test]
    fn tool_descriptor_reads_camel_case_schema() {
        let tool: ToolDescriptor = serde_json::from_value(json!({
            "name": "browser_navigate",
            "description": "Navigate to a URL",
            "inputSchema": {"type": "object", "required": ["url"]}
        }))
        .unwrap();
        assert_eq!(tool.name, "browser_navigate");
        assert_eq!(tool.input_schema["required"], json!(["url"]));
    }

    #[test]
    fn tool_descriptor_defaults_missing_schema() {
        let tool: ToolDescriptor = serde_json::from_value(json!({"name": "snapshot"})).unwrap();
        assert_eq!(tool.description, None);
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn single_text_requires_exactly_one_text_item() {
        let one: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "ok"}]
        }))
        .unwrap();
        assert_eq!(one.single_text(), Some("ok"));

        let two: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}],
            "isError": true
        }))
        .unwrap();
        assert_eq!(two.single_text(), None);
        assert!(two.is_error);
        assert_eq!(two.joined_text(), "a\nb");
    }
}
