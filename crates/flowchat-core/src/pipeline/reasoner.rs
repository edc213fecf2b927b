//! Reasoning step: narrates the plan conversationally while the gathering
//! step works in parallel, giving the caller something to read right away.
//!
//! Suppressed on retry runs (the user already saw the narration). A failed
//! model call falls back to a canned line rather than leaving the thinking
//! box empty.

use tracing::{info, warn};

use flowchat_types::llm::CompletionRequest;

use super::state::{RunState, StateUpdate};
use super::{StepContext, prompts};

const FALLBACK_NARRATION: &str =
    "Let me work through this step by step based on what you've asked...";

pub(crate) async fn run(ctx: &StepContext, state: &RunState) -> StateUpdate {
    let empty = StateUpdate {
        stream_chunks: Some(Vec::new()),
        ..Default::default()
    };

    if state.budget_exceeded() {
        warn!(run_id = %state.run_id, "narration skipped, run budget exceeded");
        return empty;
    }
    if state.retry_count > 0 {
        // Re-emitting would duplicate thinking content in the stream.
        info!(run_id = %state.run_id, "retry run, suppressing narration");
        return empty;
    }
    if state.plan.is_empty() {
        warn!(run_id = %state.run_id, "no plan to narrate");
        return empty;
    }

    let request = CompletionRequest::single_turn(
        prompts::NARRATOR_SYSTEM,
        format!("Plan:\n{}", state.plan),
    );

    let narration = match ctx.models.fast.complete(&request).await {
        Ok(response) if !response.content.trim().is_empty() => {
            response.content.trim().to_string()
        }
        Ok(_) => {
            warn!(run_id = %state.run_id, "empty narration, using fallback");
            FALLBACK_NARRATION.to_string()
        }
        Err(error) => {
            warn!(run_id = %state.run_id, %error, "narration failed, using fallback");
            FALLBACK_NARRATION.to_string()
        }
    };

    let chunk = ctx.emit_thinking(narration);
    StateUpdate {
        stream_chunks: Some(vec![chunk]),
        ..Default::default()
    }
}
