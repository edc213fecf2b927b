//! Planning step: decomposes the user request into an execution plan.
//!
//! The plan is structured text with STEPS / DATA_NEEDED / OUTPUT_FORMAT /
//! CHART_TYPE sections that downstream steps extract fields from. A failed
//! or empty plan propagates upward as [`PipelineError::Planner`] -- an empty
//! plan poisons every step after this one, so there is no silent fallback.

use tracing::{debug, info, warn};

use flowchat_types::llm::{CompletionRequest, LlmError};

use super::state::{RunState, StateUpdate};
use super::text::{preview, truncate_chars};
use super::{PipelineError, QUESTION_WINDOW, StepContext, prompts};

pub(crate) async fn run(
    ctx: &StepContext,
    state: &RunState,
) -> Result<StateUpdate, PipelineError> {
    if state.budget_exceeded() {
        warn!(run_id = %state.run_id, "planner skipped, run budget exceeded");
        return Ok(StateUpdate::default());
    }

    let question = truncate_chars(state.user_message(), QUESTION_WINDOW);
    debug!(run_id = %state.run_id, question = %preview(question), "planning");

    let request = CompletionRequest::single_turn(prompts::PLANNER_SYSTEM, question);
    let response = ctx
        .models
        .planner
        .complete(&request)
        .await
        .map_err(PipelineError::Planner)?;

    let plan = response.content.trim().to_string();
    if plan.is_empty() {
        return Err(PipelineError::Planner(LlmError::Provider {
            message: "planner returned an empty plan".to_string(),
        }));
    }

    info!(run_id = %state.run_id, plan = %preview(&plan), "plan ready");
    Ok(StateUpdate {
        plan: Some(plan),
        stream_chunks: Some(Vec::new()),
        display_results: Some(Vec::new()),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use crate::tool::ToolRegistry;
    use std::sync::Arc;

    fn context(planner: ScriptedProvider) -> StepContext {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let provider = Arc::new(crate::llm::BoxLlmProvider::new(planner));
        StepContext::new(
            super::super::ModelSet::uniform(provider),
            Arc::new(ToolRegistry::new()),
            tx,
        )
    }

    #[tokio::test]
    async fn test_plan_is_trimmed_and_stored() {
        let ctx = context(ScriptedProvider::new(vec![
            "  STEPS: 1. answer\nDATA_NEEDED: none\nCHART_TYPE: none  ",
        ]));
        let state = RunState::new("sys", "hello");

        let update = run(&ctx, &state).await.unwrap();
        let plan = update.plan.unwrap();
        assert!(plan.starts_with("STEPS:"));
        assert!(plan.ends_with("none"));
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let ctx = context(ScriptedProvider::failing());
        let state = RunState::new("sys", "hello");

        let err = run(&ctx, &state).await.unwrap_err();
        assert!(matches!(err, PipelineError::Planner(_)));
    }

    #[tokio::test]
    async fn test_empty_plan_is_an_error() {
        let ctx = context(ScriptedProvider::new(vec!["   \n  "]));
        let state = RunState::new("sys", "hello");

        assert!(run(&ctx, &state).await.is_err());
    }
}
