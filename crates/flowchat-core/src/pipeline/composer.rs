//! Composition step: drafts the final user-facing answer from the plan,
//! the narration, and the gathered data.
//!
//! The answer is consumed from the responder's token stream and folded
//! into one `response_content` chunk. If the plan called for data and the
//! gathering step came back empty, the composer answers honestly instead
//! of letting the model invent numbers.

use futures_util::StreamExt;
use tracing::{info, warn};

use flowchat_types::chunk::StreamChunk;
use flowchat_types::llm::{CompletionRequest, Message, StreamEvent};

use super::state::{RunState, StateUpdate};
use super::text::{extract_plan_field, preview, truncate_chars};
use super::{PLAN_WINDOW, StepContext, TOOL_CONTEXT_WINDOW, prompts};

const TIMEOUT_RESPONSE: &str =
    "I wasn't able to complete your request in time. Please try again.";
const NO_DATA_RESPONSE: &str = "I wasn't able to retrieve the data needed to answer this \
     accurately. This could be due to an API limit or connection issue. Please try again \
     in a moment.";
const EMPTY_RESPONSE: &str = "I wasn't able to generate a response. Please try again.";

/// Word count below which the user gets a deliberately brief answer.
const SIMPLE_QUESTION_WORDS: usize = 15;

fn response_update(state: &RunState, content: String) -> StateUpdate {
    let mut chunks = Vec::new();
    if !state.display_results.is_empty() {
        chunks.push(StreamChunk::DisplayModules(state.display_results.clone()));
    }
    chunks.push(StreamChunk::ResponseContent(content.clone()));
    StateUpdate {
        messages: vec![Message::assistant(content)],
        stream_chunks: Some(chunks),
        ..Default::default()
    }
}

pub(crate) async fn run(ctx: &StepContext, state: &RunState) -> StateUpdate {
    if state.budget_exceeded() {
        warn!(run_id = %state.run_id, "composition skipped, run budget exceeded");
        return response_update(state, TIMEOUT_RESPONSE.to_string());
    }

    let user_msg = state.user_message().to_string();
    let tool_context = state.tool_context();

    // Honest failure beats hallucinated numbers when the plan demanded
    // data and none arrived.
    let data_needed = extract_plan_field(&state.plan, "DATA_NEEDED").unwrap_or_default();
    let needs_data = !matches!(data_needed.to_lowercase().as_str(), "" | "none" | "n/a");
    if needs_data && !state.data_fetched {
        warn!(run_id = %state.run_id, "data required but not fetched, honest failure");
        return response_update(state, NO_DATA_RESPONSE.to_string());
    }

    let chart_note = if state.display_results.is_empty() {
        "No chart was rendered."
    } else {
        "A chart has already been rendered in the UI. Reference it naturally but do NOT describe it."
    };
    let brevity_note = if user_msg.split_whitespace().count() <= SIMPLE_QUESTION_WORDS {
        "Keep your response short and natural - match the brevity of the user's message."
    } else {
        "Write in natural prose. Be thorough but concise."
    };

    let mut system = format!("{}\n{chart_note}\n{brevity_note}", prompts::RESPONDER_BASE_SYSTEM);
    if !tool_context.is_empty() {
        system.push_str(&format!(
            "\n\nResearch context:\n{}",
            truncate_chars(&tool_context, TOOL_CONTEXT_WINDOW)
        ));
    }

    // The plan rides along in the user turn; without it, short queries give
    // the model zero context about what was researched.
    let mut user_turn = user_msg;
    if !state.plan.is_empty() {
        user_turn.push_str(&format!(
            "\n\n[Execution plan for context]:\n{}",
            truncate_chars(&state.plan, PLAN_WINDOW)
        ));
    }

    let mut request = CompletionRequest::single_turn(system, user_turn);
    request.stream = true;

    let mut content = String::new();
    let mut stream = ctx.models.responder.stream(request);
    while let Some(event) = stream.next().await {
        match event {
            Ok(StreamEvent::TextDelta { text }) => content.push_str(&text),
            Ok(StreamEvent::ThinkingDelta { .. }) => {}
            Ok(StreamEvent::Done) => break,
            Err(error) => {
                warn!(run_id = %state.run_id, %error, "response stream failed");
                break;
            }
        }
    }

    let content = content.trim().to_string();
    // Catch model non-answers so the caller never sees a blank bubble.
    let content = if content.is_empty() || content.to_lowercase().starts_with("no output generated")
    {
        warn!(run_id = %state.run_id, "model returned empty output, using fallback");
        EMPTY_RESPONSE.to_string()
    } else {
        content
    };

    info!(
        run_id = %state.run_id,
        chars = content.len(),
        response = %preview(&content),
        "response composed"
    );
    response_update(state, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::BoxLlmProvider;
    use crate::pipeline::ModelSet;
    use crate::testing::ScriptedProvider;
    use crate::tool::ToolRegistry;
    use flowchat_types::chunk::{ChartType, DisplayModule};
    use std::sync::Arc;

    fn context(responder: ScriptedProvider) -> StepContext {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let provider = Arc::new(BoxLlmProvider::new(responder));
        StepContext::new(ModelSet::uniform(provider), Arc::new(ToolRegistry::new()), tx)
    }

    fn base_state(data_needed: &str) -> RunState {
        let mut state = RunState::new("sys", "widget sales trend?");
        state.apply(StateUpdate {
            plan: Some(format!("STEPS: 1. answer\nDATA_NEEDED: {data_needed}\nCHART_TYPE: none")),
            data_fetched: Some(false),
            ..Default::default()
        });
        state
    }

    #[tokio::test]
    async fn test_streamed_deltas_fold_into_one_chunk() {
        let ctx = context(ScriptedProvider::new(vec!["Sales are trending upward."]));
        let mut state = base_state("none");
        state.data_fetched = true;

        let update = run(&ctx, &state).await;
        let chunks = update.stream_chunks.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0],
            StreamChunk::ResponseContent("Sales are trending upward.".to_string())
        );
        assert_eq!(update.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_honest_failure_when_data_missing() {
        let ctx = context(ScriptedProvider::new(vec!["should not be called"]));
        let state = base_state("widget sales");

        let update = run(&ctx, &state).await;
        let chunks = update.stream_chunks.unwrap();
        assert!(matches!(
            &chunks[0],
            StreamChunk::ResponseContent(text) if text.contains("retrieve the data")
        ));
    }

    #[tokio::test]
    async fn test_display_modules_emitted_before_response() {
        let ctx = context(ScriptedProvider::new(vec!["See the chart above."]));
        let mut state = base_state("none");
        state.data_fetched = true;
        state.apply(StateUpdate {
            display_results: Some(vec![DisplayModule {
                chart_type: ChartType::LineGraph,
                data: serde_json::json!({"title": "Sales"}),
            }]),
            ..Default::default()
        });

        let update = run(&ctx, &state).await;
        let chunks = update.stream_chunks.unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(matches!(chunks[0], StreamChunk::DisplayModules(_)));
        assert!(matches!(chunks[1], StreamChunk::ResponseContent(_)));
    }

    #[tokio::test]
    async fn test_stream_failure_yields_fallback_text() {
        let ctx = context(ScriptedProvider::failing());
        let mut state = base_state("none");
        state.data_fetched = true;

        let update = run(&ctx, &state).await;
        let chunks = update.stream_chunks.unwrap();
        assert!(matches!(
            &chunks[0],
            StreamChunk::ResponseContent(text) if text == EMPTY_RESPONSE
        ));
    }
}
