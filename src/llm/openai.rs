//! OpenAI-compatible chat completions client (OpenRouter by default).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ChatResponse, LlmClient, LlmError, TokenUsage, ToolCall, ToolSchema};

/// Client for any `/chat/completions` endpoint speaking the OpenAI format.
pub struct OpenAiCompatibleClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatibleClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSchema]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

impl<'a> CompletionRequest<'a> {
    fn new(model: &'a str, messages: &'a [ChatMessage], tools: Option<&'a [ToolSchema]>) -> Self {
        let tools = tools.filter(|t| !t.is_empty());
        Self {
            model,
            messages,
            tools,
            tool_choice: tools.map(|_| "auto"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl CompletionBody {
    fn into_response(self) -> Result<ChatResponse, LlmError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        Ok(ChatResponse {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.filter(|calls| !calls.is_empty()),
            finish_reason: choice.finish_reason,
            usage: self.usage,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolSchema]>,
    ) -> Result<ChatResponse, LlmError> {
        let request = CompletionRequest::new(model, messages, tools);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            tracing::warn!("Completion endpoint returned {}: {}", status, message);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: CompletionBody = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        body.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_sets_auto_tool_choice_only_with_tools() {
        let messages = vec![ChatMessage::user("hello")];
        let schemas = vec![ToolSchema::function("echo", "Echo", json!({"type": "object"}))];

        let request = CompletionRequest::new("m", &messages, Some(schemas.as_slice()));
        let with_tools = serde_json::to_value(request).unwrap();
        assert_eq!(with_tools["tool_choice"], "auto");
        assert_eq!(with_tools["tools"][0]["function"]["name"], "echo");

        let request = CompletionRequest::new("m", &messages, Some(&[] as &[ToolSchema]));
        let without = serde_json::to_value(request).unwrap();
        assert!(without.get("tools").is_none());
        assert!(without.get("tool_choice").is_none());
    }

    #[test]
    fn response_with_tool_calls_is_parsed() {
        let body: CompletionBody = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {
                            "name": "browser_navigate",
                            "arguments": "{\"url\":\"https://example.com\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }))
        .unwrap();

        let response = body.into_response().unwrap();
        let calls = response.tool_calls.unwrap();
        assert_eq!(calls[0].id, "call_abc");
        assert_eq!(calls[0].function.name, "browser_navigate");
        assert_eq!(response.content, None);
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn response_without_choices_is_invalid() {
        let body: CompletionBody = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(body.into_response(), Err(LlmError::InvalidResponse(_))));
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let client = OpenAiCompatibleClient::new("key", "https://openrouter.ai/api/v1/");
        assert_eq!(client.endpoint(), "https://openrouter.ai/api/v1/chat/completions");
    }
}
