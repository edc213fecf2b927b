//! The streaming chat endpoint.
//!
//! `POST /api/v1/chat/stream` takes `{"prompt": "..."}` and answers with
//! newline-delimited JSON chunks (content type `application/x-ndjson`).
//! Thinking chunks arrive as the run produces them; the final answer and
//! any display modules are flushed when the run completes. The response
//! status is always 200 once streaming starts; run failures surface as a
//! fallback response chunk inside the stream, not as an HTTP error.

use std::convert::Infallible;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};

use flowchat_types::chunk::StreamChunk;

use crate::http::error::AppError;
use crate::state::AppState;

/// Upper bound on prompt length, in characters.
pub const MAX_PROMPT_CHARS: usize = 2000;

/// Sent as the final chunk when the caller-facing timeout fires. The
/// background run keeps going; only the connection gives up on it.
const TIMEOUT_CHUNK: &str = "The request timed out. Please try again.";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
}

fn validate_prompt(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("prompt must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_PROMPT_CHARS {
        return Err(AppError::Validation(format!(
            "prompt must be at most {MAX_PROMPT_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub async fn stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let prompt = validate_prompt(&request.prompt)?;
    info!(chars = prompt.chars().count(), "chat stream request");

    let chunks = state.bridge.run(prompt);
    let deadline = tokio::time::Instant::now() + state.request_timeout;

    let lines = async_stream::stream! {
        tokio::pin!(chunks);
        loop {
            match tokio::time::timeout_at(deadline, chunks.next()).await {
                Ok(Some(chunk)) => yield Ok::<_, Infallible>(chunk.to_line()),
                Ok(None) => break,
                Err(_) => {
                    warn!("chat stream hit the request timeout");
                    yield Ok(
                        StreamChunk::ResponseContent(TIMEOUT_CHUNK.to_string()).to_line(),
                    );
                    break;
                }
            }
        }
    };

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_trims_whitespace() {
        assert_eq!(validate_prompt("  hello  ").unwrap(), "hello");
    }

    #[test]
    fn test_validate_rejects_empty() {
        assert!(matches!(validate_prompt("   "), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_oversized() {
        let long = "x".repeat(MAX_PROMPT_CHARS + 1);
        assert!(matches!(validate_prompt(&long), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_accepts_at_limit() {
        let exact = "x".repeat(MAX_PROMPT_CHARS);
        assert!(validate_prompt(&exact).is_ok());
    }
}
