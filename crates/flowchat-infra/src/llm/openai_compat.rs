//! OpenAI-compatible LLM provider over `/chat/completions`.
//!
//! One provider covers OpenAI, Ollama, and every other endpoint speaking
//! the same wire format, selected by base URL. Non-streaming requests go
//! through [`LlmProvider::complete`]; streaming uses SSE via
//! `eventsource-stream` with the standard `data: {...}` chunks and the
//! `[DONE]` sentinel.
//!
//! The API key is wrapped in [`SecretString`] and only exposed when the
//! Authorization header is built; the struct deliberately does not derive
//! `Debug`.

use std::pin::Pin;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use flowchat_core::llm::LlmProvider;
use flowchat_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, MessageRole, StreamEvent,
};

/// Provider for any OpenAI-compatible chat completion API.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl OpenAiCompatProvider {
    /// Request timeout; generations can run long.
    const TIMEOUT_SECS: u64 = 300;

    pub fn new(base_url: impl Into<String>, api_key: SecretString, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(Self::TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Build the JSON request body.
    ///
    /// Tool-role messages never leave the process; they are pipeline
    /// bookkeeping, not provider input.
    fn build_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let mut messages: Vec<Value> = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        for message in &request.messages {
            if message.role == MessageRole::Tool {
                continue;
            }
            messages.push(json!({
                "role": message.role.to_string(),
                "content": message.content,
            }));
        }

        let model = if request.model.is_empty() {
            self.model.as_str()
        } else {
            request.model.as_str()
        };

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": request.max_tokens,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    fn request_builder(&self, body: &Value) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(self.url())
            .header("content-type", "application/json")
            .json(body);
        let key = self.api_key.expose_secret();
        if !key.is_empty() {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

/// Map an HTTP error status to the provider error taxonomy.
fn map_status(status: reqwest::StatusCode, body: String) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited,
        400 => LlmError::InvalidRequest(body),
        _ => LlmError::Provider { message: format!("HTTP {status}: {body}") },
    }
}

/// Parse one SSE `data:` payload into a stream event.
///
/// `Ok(None)` means a chunk with nothing to surface (role preamble, empty
/// delta); those are skipped, not errors.
fn parse_sse_data(data: &str) -> Result<Option<StreamEvent>, LlmError> {
    if data.trim() == "[DONE]" {
        return Ok(Some(StreamEvent::Done));
    }
    let value: Value = serde_json::from_str(data)
        .map_err(|e| LlmError::Deserialization(format!("bad stream chunk: {e}")))?;
    let text = value["choices"][0]["delta"]["content"].as_str();
    Ok(text
        .filter(|t| !t.is_empty())
        .map(|t| StreamEvent::TextDelta { text: t.to_string() }))
}

impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_body(request, false);
        let response = self
            .request_builder(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider { message: format!("HTTP request failed: {e}") })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(map_status(status, error_body));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        Ok(CompletionResponse {
            id: parsed["id"].as_str().unwrap_or_default().to_string(),
            content,
            model: parsed["model"].as_str().unwrap_or(&self.model).to_string(),
        })
    }

    fn stream(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>> {
        let body = self.build_body(&request, true);
        let builder = self.request_builder(&body);

        Box::pin(async_stream::try_stream! {
            let response = builder
                .send()
                .await
                .map_err(|e| LlmError::Provider { message: format!("HTTP request failed: {e}") })?;

            let status = response.status();
            if !status.is_success() {
                let error_body = response.text().await.unwrap_or_default();
                Err(map_status(status, error_body))?;
                return;
            }

            let mut events = response.bytes_stream().eventsource();
            while let Some(event) = events.next().await {
                let event = event.map_err(|e| LlmError::Stream(e.to_string()))?;
                if let Some(mapped) = parse_sse_data(&event.data)? {
                    let done = matches!(mapped, StreamEvent::Done);
                    yield mapped;
                    if done {
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowchat_types::llm::Message;

    fn provider() -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(
            "http://localhost:11434/v1/",
            SecretString::from("test-key".to_string()),
            "llama3.2",
        )
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        assert_eq!(provider().url(), "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn test_build_body_shape() {
        let request = CompletionRequest::single_turn("be terse", "hello");
        let body = provider().build_body(&request, false);

        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be terse");
        assert_eq!(body["messages"][1]["role"], "user");
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_build_body_skips_tool_messages() {
        let mut request = CompletionRequest::single_turn("sys", "question");
        request.messages.insert(0, Message::tool("internal result"));
        let body = provider().build_body(&request, false);

        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user"]);
    }

    #[test]
    fn test_build_body_request_model_overrides_default() {
        let mut request = CompletionRequest::single_turn("sys", "hi");
        request.model = "gpt-4o-mini".to_string();
        let body = provider().build_body(&request, true);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_parse_sse_done_sentinel() {
        assert!(matches!(
            parse_sse_data("[DONE]"),
            Ok(Some(StreamEvent::Done))
        ));
    }

    #[test]
    fn test_parse_sse_text_delta() {
        let data = r#"{"choices":[{"delta":{"content":"hel"}}]}"#;
        assert!(matches!(
            parse_sse_data(data),
            Ok(Some(StreamEvent::TextDelta { text })) if text == "hel"
        ));
    }

    #[test]
    fn test_parse_sse_role_preamble_is_skipped() {
        let data = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(matches!(parse_sse_data(data), Ok(None)));
    }

    #[test]
    fn test_parse_sse_garbage_is_an_error() {
        assert!(matches!(
            parse_sse_data("not json"),
            Err(LlmError::Deserialization(_))
        ));
    }

    #[test]
    fn test_map_status_taxonomy() {
        assert!(matches!(
            map_status(reqwest::StatusCode::UNAUTHORIZED, String::new()),
            LlmError::AuthenticationFailed
        ));
        assert!(matches!(
            map_status(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()),
            LlmError::RateLimited
        ));
        assert!(matches!(
            map_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, String::new()),
            LlmError::Provider { .. }
        ));
    }
}
