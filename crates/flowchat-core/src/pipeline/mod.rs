//! The orchestration pipeline.
//!
//! One run walks the step graph
//! `planner -> {reasoner || gatherer} -> aggregator -> composer -> validator`
//! over a single [`state::RunState`], with the validator routing back to the
//! planner on a failed verdict (capped) and the [`bridge::StreamingBridge`]
//! relaying chunks to the caller as they are produced.

pub mod aggregator;
pub mod bridge;
pub mod composer;
pub mod gatherer;
pub mod graph;
pub mod planner;
pub mod prompts;
pub mod reasoner;
pub mod state;
pub mod text;
pub mod validator;

pub use bridge::{BridgeSignal, RunOutcome, StreamingBridge};
pub use state::{RunState, StateUpdate, Verdict};

use std::sync::Arc;

use tokio::sync::mpsc;

use flowchat_types::chunk::StreamChunk;
use flowchat_types::llm::LlmError;

use crate::llm::BoxLlmProvider;
use crate::tool::ToolRegistry;

// ---------------------------------------------------------------------------
// Constants -- run-level limits
// ---------------------------------------------------------------------------

/// Wall-clock budget for one run; steps short-circuit once exceeded.
pub const RUN_BUDGET_SECS: u64 = 300;

/// Hard cap on tool-call iterations in the gathering loop.
pub const MAX_ITERATIONS: usize = 3;

/// Hard cap on validator-driven retries.
pub const MAX_RETRIES: u32 = 2;

/// Max chars of a single tool result stored in state. Each result is
/// truncated when collected, not after joining, so late results are not
/// lost to truncation of an already-long joined string.
pub const MAX_RESULT_CHARS: usize = 15_000;

// ---------------------------------------------------------------------------
// Constants -- context windows (chars shown to each model role)
// ---------------------------------------------------------------------------

pub(crate) const QUESTION_WINDOW: usize = 300;
pub(crate) const NEED_WINDOW: usize = 200;
pub(crate) const CONTEXT_WINDOW: usize = 600;
pub(crate) const TOOL_CONTEXT_WINDOW: usize = 1500;
pub(crate) const PLAN_WINDOW: usize = 400;
pub(crate) const VALIDATOR_QUESTION_WINDOW: usize = 200;
pub(crate) const VALIDATOR_RESPONSE_WINDOW: usize = 600;

// ---------------------------------------------------------------------------
// ModelSet
// ---------------------------------------------------------------------------

/// The three model roles the pipeline calls.
///
/// `fast` handles short narrative and JSON-verdict calls, `planner` the
/// plan and tool-routing calls, `responder` the answer and chart-fill calls
/// that need a large output budget. The roles may share one provider.
#[derive(Clone)]
pub struct ModelSet {
    pub fast: Arc<BoxLlmProvider>,
    pub planner: Arc<BoxLlmProvider>,
    pub responder: Arc<BoxLlmProvider>,
}

impl ModelSet {
    /// Wire all three roles to a single provider.
    pub fn uniform(provider: Arc<BoxLlmProvider>) -> Self {
        Self {
            fast: Arc::clone(&provider),
            planner: Arc::clone(&provider),
            responder: provider,
        }
    }
}

// ---------------------------------------------------------------------------
// StepContext
// ---------------------------------------------------------------------------

/// Everything a step needs besides the state record: model roles, tools,
/// and the live channel for thinking chunks.
pub(crate) struct StepContext {
    pub(crate) models: ModelSet,
    pub(crate) tools: Arc<ToolRegistry>,
    live: mpsc::UnboundedSender<BridgeSignal>,
}

impl StepContext {
    pub(crate) fn new(
        models: ModelSet,
        tools: Arc<ToolRegistry>,
        live: mpsc::UnboundedSender<BridgeSignal>,
    ) -> Self {
        Self { models, tools, live }
    }

    /// Emit a thinking chunk to the caller immediately and return it for
    /// inclusion in the step's state update.
    ///
    /// A send failure means the consumer hung up; the run carries on and
    /// the chunk still lands in the state record.
    pub(crate) fn emit_thinking(&self, message: impl Into<String>) -> StreamChunk {
        let chunk = StreamChunk::ThinkingContent(message.into());
        let _ = self.live.send(BridgeSignal::Chunk(chunk.clone()));
        chunk
    }
}

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Errors that abort a run.
///
/// Most step failures are recovered locally with a safe default; only the
/// planner propagates, because an empty plan poisons every step downstream.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("planner step failed: {0}")]
    Planner(#[source] LlmError),
}
