//! Validation step: judges the composed answer against the original
//! question.
//!
//! Fails closed: a judgment call that errors or returns unparseable output
//! sets the verdict to fail, never pass. The retry routing that consumes
//! the verdict lives in the graph's transition function.

use serde::Deserialize;
use tracing::{info, warn};

use flowchat_types::llm::CompletionRequest;

use super::state::{RunState, StateUpdate, Verdict};
use super::text::{extract_json_object, strip_code_fences, truncate_chars};
use super::{
    StepContext, VALIDATOR_QUESTION_WINDOW, VALIDATOR_RESPONSE_WINDOW, prompts,
};

/// Auto-pass threshold: with this little budget left there is no time for
/// a retry run anyway.
const MIN_BUDGET_SECS: u64 = 5;

#[derive(Deserialize)]
struct RawVerdict {
    #[serde(default)]
    result: String,
    #[serde(default)]
    critique: String,
}

fn verdict_update(verdict: Verdict, critique: impl Into<String>) -> StateUpdate {
    StateUpdate {
        verdict: Some(verdict),
        critique: Some(critique.into()),
        stream_chunks: Some(Vec::new()),
        display_results: Some(Vec::new()),
        ..Default::default()
    }
}

pub(crate) async fn run(ctx: &StepContext, state: &RunState) -> StateUpdate {
    if state.remaining_budget().as_secs() < MIN_BUDGET_SECS {
        warn!(run_id = %state.run_id, "time budget nearly exhausted, auto-passing");
        return verdict_update(Verdict::Pass, "Skipped: time budget exhausted.");
    }

    let Some(response) = state.last_response() else {
        warn!(run_id = %state.run_id, "no response to validate, failing");
        return verdict_update(Verdict::Fail, "No response was generated.");
    };

    let request = CompletionRequest::single_turn(
        prompts::VALIDATOR_SYSTEM,
        format!(
            "User question: {}\n\nResponse to validate:\n{}",
            truncate_chars(state.user_message(), VALIDATOR_QUESTION_WINDOW),
            truncate_chars(response, VALIDATOR_RESPONSE_WINDOW),
        ),
    );

    let raw = match ctx.models.fast.complete(&request).await {
        Ok(response) => response.content,
        Err(error) => {
            warn!(run_id = %state.run_id, %error, "validator call failed, failing closed");
            return verdict_update(Verdict::Fail, "Validator call failed.");
        }
    };

    let cleaned = strip_code_fences(&raw);
    let parsed: RawVerdict = match serde_json::from_str(extract_json_object(&cleaned)) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(run_id = %state.run_id, %error, "unparseable verdict, failing closed");
            return verdict_update(Verdict::Fail, "Validator could not parse model output.");
        }
    };

    // Only an explicit "fail" fails; unknown result strings pass, since the
    // model did answer and the response itself was judged acceptable enough
    // to produce non-fail output.
    let verdict = match parsed.result.to_lowercase().as_str() {
        "fail" => Verdict::Fail,
        _ => Verdict::Pass,
    };
    info!(
        run_id = %state.run_id,
        verdict = ?verdict,
        critique = %parsed.critique,
        retry_count = state.retry_count,
        "validation complete"
    );
    verdict_update(verdict, parsed.critique)
}
