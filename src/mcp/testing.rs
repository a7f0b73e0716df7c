//! In-memory tool host for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::protocol::JSONRPC_VERSION;
use super::transport::{Connector, Transport, TransportError};

/// What the scripted host answers to one request.
pub enum HostReply {
    Result(Value),
    Error(i64, String),
    /// No answer; the next read reports the host as gone.
    Silent,
    /// No answer, but the connection stays open.
    Hang,
    /// Send a request of our own first, then reply.
    Interleaved { request: String, then: Box<HostReply> },
}

type Handler = dyn Fn(&str, &Value) -> HostReply + Send + Sync;

#[derive(Default)]
struct Record {
    opens: usize,
    closes: usize,
    requests: Vec<(String, Value)>,
    notifications: Vec<String>,
    replies: Vec<Value>,
}

/// Scripted host; clones share the same record.
#[derive(Clone)]
pub struct ScriptedHost {
    handler: Arc<Handler>,
    record: Arc<Mutex<Record>>,
    reachable: bool,
}

impl ScriptedHost {
    pub fn new(handler: impl Fn(&str, &Value) -> HostReply + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            record: Arc::new(Mutex::new(Record::default())),
            reachable: true,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new(|_, _| HostReply::Silent)
        }
    }

    /// Host with an `echo` tool, a navigation tool and one resource.
    pub fn browser() -> Self {
        Self::new(browser_reply)
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    pub fn open_count(&self) -> usize {
        self.record.lock().unwrap().opens
    }

    pub fn close_count(&self) -> usize {
        self.record.lock().unwrap().closes
    }

    /// Requests (method, params) in the order they were received.
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.record.lock().unwrap().requests.clone()
    }

    pub fn tool_calls(&self) -> Vec<(String, Value)> {
        self.requests()
            .into_iter()
            .filter(|(method, _)| method == "tools/call")
            .map(|(_, params)| {
                let name = params["name"].as_str().unwrap_or_default().to_string();
                (name, params["arguments"].clone())
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.record.lock().unwrap().notifications.clone()
    }

    /// Frames the client sent in answer to our own requests.
    pub fn replies(&self) -> Vec<Value> {
        self.record.lock().unwrap().replies.clone()
    }
}

/// How the browser host answers `method`.
pub fn browser_reply(method: &str, params: &Value) -> HostReply {
    match method {
        "initialize" => HostReply::Result(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}, "resources": {}},
            "serverInfo": {"name": "scripted-host", "version": "1.0.0"}
        })),
        "tools/list" => HostReply::Result(json!({
            "tools": [
                {
                    "name": "echo",
                    "description": "Echo text back",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"text": {"type": "string"}},
                        "required": ["text"]
                    }
                },
                {
                    "name": "browser_navigate",
                    "description": "Navigate to a URL",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"url": {"type": "string"}},
                        "required": ["url"]
                    }
                }
            ]
        })),
        "tools/call" => call_browser_tool(params),
        "resources/list" => HostReply::Result(json!({
            "resources": [{"uri": "console://logs", "name": "Console logs"}]
        })),
        "resources/read" => HostReply::Result(json!({
            "contents": [{"uri": params["uri"], "text": "no errors"}]
        })),
        other => HostReply::Error(-32601, format!("Method not found: {}", other)),
    }
}

/// `{"content": [{"type": "text", "text": <text>}]}`
pub fn text_content(text: &str) -> HostReply {
    HostReply::Result(json!({"content": [{"type": "text", "text": text}]}))
}

fn call_browser_tool(params: &Value) -> HostReply {
    let args = &params["arguments"];
    match params["name"].as_str() {
        Some("echo") => {
            let text = args["text"].as_str().unwrap_or_default();
            text_content(&json!({"text": format!("echo: {}", text)}).to_string())
        }
        Some("browser_navigate") => {
            text_content(&format!("Navigated to {}", args["url"].as_str().unwrap_or_default()))
        }
        Some(other) => HostReply::Error(-32602, format!("Unknown tool: {}", other)),
        None => HostReply::Error(-32602, "Missing tool name".to_string()),
    }
}

#[async_trait]
impl Connector for ScriptedHost {
    async fn open(&self) -> Result<Box<dyn Transport>, TransportError> {
        if !self.reachable {
            return Err(TransportError::Spawn {
                program: "scripted-host".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
            });
        }
        self.record.lock().unwrap().opens += 1;
        Ok(Box::new(ScriptedTransport {
            host: self.clone(),
            outbox: VecDeque::new(),
            hanging: false,
            host_requests: 0,
        }))
    }

    fn describe(&self) -> String {
        "scripted-host".to_string()
    }
}

struct ScriptedTransport {
    host: ScriptedHost,
    outbox: VecDeque<Value>,
    hanging: bool,
    host_requests: usize,
}

impl ScriptedTransport {
    fn enqueue(&mut self, id: Value, reply: HostReply) {
        match reply {
            HostReply::Result(result) => self.outbox.push_back(json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "result": result
            })),
            HostReply::Error(code, message) => self.outbox.push_back(json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "error": {"code": code, "message": message}
            })),
            HostReply::Silent => {}
            HostReply::Hang => self.hanging = true,
            HostReply::Interleaved { request, then } => {
                self.host_requests += 1;
                self.outbox.push_back(json!({
                    "jsonrpc": JSONRPC_VERSION,
                    "id": format!("host-{}", self.host_requests),
                    "method": request
                }));
                self.enqueue(id, *then);
            }
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, frame: Value) -> Result<(), TransportError> {
        let method = frame["method"].as_str().unwrap_or_default().to_string();
        let id = frame.get("id").filter(|_| !method.is_empty()).cloned();
        let Some(id) = id else {
            // Notifications, and our answers to the host's own requests.
            {
                let mut record = self.host.record.lock().unwrap();
                if method.is_empty() {
                    record.replies.push(frame);
                } else {
                    record.notifications.push(method);
                }
            }
            return Ok(());
        };
        let params = frame.get("params").cloned().unwrap_or(Value::Null);
        self.host
            .record
            .lock()
            .unwrap()
            .requests
            .push((method.clone(), params.clone()));

        self.hanging = false;
        let reply = (self.host.handler)(&method, &params);
        self.enqueue(id, reply);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Value, TransportError> {
        match self.outbox.pop_front() {
            Some(frame) => Ok(frame),
            None if self.hanging => std::future::pending().await,
            None => Err(TransportError::Closed),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.host.record.lock().unwrap().closes += 1;
        Ok(())
    }
}
