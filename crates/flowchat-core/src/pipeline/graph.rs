//! The step graph: an explicit finite-state machine over the pipeline.
//!
//! `Planner -> FanOut -> Aggregator -> Composer -> Validator -> (Planner |
//! Terminated)`, where FanOut runs the reasoning and gathering steps
//! concurrently and merges their updates before proceeding. Retry routing
//! is a single enumerated transition function, which makes the retry cap
//! and termination easy to verify: every non-validator step has exactly
//! one successor, and the validator can route backwards at most
//! [`MAX_RETRIES`] times.

use std::collections::BTreeMap;

use tracing::{info, warn};

use flowchat_types::chunk::StreamChunk;

use super::state::{RunState, StateUpdate, Verdict};
use super::{
    MAX_RETRIES, PipelineError, StepContext, aggregator, composer, gatherer, planner, prompts,
    reasoner, validator,
};

/// Pipeline states, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Step {
    Planner,
    FanOut,
    Aggregator,
    Composer,
    Validator,
    Terminated,
}

/// Successor of every step except the validator, whose routing depends on
/// the verdict and lives in [`PipelineGraph::after_validator`].
fn successor(step: Step) -> Step {
    match step {
        Step::Planner => Step::FanOut,
        Step::FanOut => Step::Aggregator,
        Step::Aggregator => Step::Composer,
        Step::Composer => Step::Validator,
        Step::Validator | Step::Terminated => Step::Terminated,
    }
}

/// What a finished run hands back to the bridge.
#[derive(Debug)]
pub(crate) struct RunReport {
    /// Non-thinking chunks to flush after the terminal signal, in step
    /// order. A retried step's chunks replace its earlier ones.
    pub(crate) pending: Vec<StreamChunk>,
    pub(crate) state: RunState,
}

/// One run's worth of graph execution.
pub(crate) struct PipelineGraph {
    ctx: StepContext,
}

impl PipelineGraph {
    pub(crate) fn new(ctx: StepContext) -> Self {
        Self { ctx }
    }

    pub(crate) async fn run(&self, prompt: &str) -> Result<RunReport, PipelineError> {
        let mut state = RunState::new(prompts::RUN_SYSTEM, prompt);
        info!(run_id = %state.run_id, prompt_chars = prompt.len(), "pipeline run starting");

        // Buffered chunks keyed by emitting step; a retry run overwrites
        // the step's slot instead of appending a duplicate.
        let mut buffered: BTreeMap<Step, Vec<StreamChunk>> = BTreeMap::new();
        let mut step = Step::Planner;

        while step != Step::Terminated {
            let update = match step {
                Step::Planner => planner::run(&self.ctx, &state).await?,
                Step::FanOut => {
                    let (reasoned, gathered) = tokio::join!(
                        reasoner::run(&self.ctx, &state),
                        gatherer::run(&self.ctx, &state),
                    );
                    StateUpdate::merge(reasoned, gathered)
                }
                Step::Aggregator => aggregator::run(&self.ctx, &state).await,
                Step::Composer => composer::run(&self.ctx, &state).await,
                Step::Validator => validator::run(&self.ctx, &state).await,
                Step::Terminated => unreachable!("terminated inside the loop"),
            };

            if let Some(chunks) = &update.stream_chunks {
                let kept: Vec<StreamChunk> =
                    chunks.iter().filter(|c| !c.is_thinking()).cloned().collect();
                buffered.insert(step, kept);
            }
            state.apply(update);

            step = match step {
                Step::Validator => Self::after_validator(&mut state),
                other => successor(other),
            };
        }

        info!(
            run_id = %state.run_id,
            retries = state.retry_count,
            elapsed_ms = state.elapsed().as_millis() as u64,
            "pipeline run terminated"
        );
        Ok(RunReport {
            pending: buffered.into_values().flatten().collect(),
            state,
        })
    }

    /// The validator's routing: a failed verdict with retries remaining
    /// routes back to the planner; otherwise the run terminates. On the
    /// final exhausted retry a failed verdict is flipped to pass, trading
    /// strictness for always giving the caller an answer.
    fn after_validator(state: &mut RunState) -> Step {
        match state.verdict {
            Some(Verdict::Fail) if state.retry_count < MAX_RETRIES => {
                state.retry_count += 1;
                warn!(
                    run_id = %state.run_id,
                    retry = state.retry_count,
                    critique = %state.critique,
                    "verdict failed, retrying from planner"
                );
                Step::Planner
            }
            Some(Verdict::Fail) => {
                warn!(run_id = %state.run_id, "retries exhausted, forcing pass");
                state.verdict = Some(Verdict::Pass);
                Step::Terminated
            }
            _ => Step::Terminated,
        }
    }
}
