//! The streaming bridge between one pipeline run and its caller.
//!
//! The run executes in its own spawned task, decoupled from the caller's
//! connection lifecycle; an unbounded channel relays chunks in production
//! order. Every producer path ends by sending exactly one [`BridgeSignal::Done`],
//! and the consumer additionally treats a closed channel without a terminal
//! signal (the producer task panicked) as a failed run -- the caller always
//! sees the stream end, never a hang.

use std::sync::Arc;

use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::{error, info};

use flowchat_types::chunk::StreamChunk;

use super::graph::PipelineGraph;
use super::{ModelSet, StepContext};
use crate::tool::ToolRegistry;

/// Shown to the caller when a run dies without producing an answer.
const FAILURE_RESPONSE: &str = "Something went wrong. Please try again.";

/// How one run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
}

/// One message on the producer-to-consumer channel.
#[derive(Debug)]
pub enum BridgeSignal {
    /// A chunk to relay immediately.
    Chunk(StreamChunk),
    /// The guaranteed terminal signal. `pending` carries the buffered
    /// non-thinking chunks to flush after the signal.
    Done {
        outcome: RunOutcome,
        pending: Vec<StreamChunk>,
    },
}

/// Starts pipeline runs and exposes each as an ordered chunk stream.
#[derive(Clone)]
pub struct StreamingBridge {
    models: ModelSet,
    tools: Arc<ToolRegistry>,
}

impl StreamingBridge {
    pub fn new(models: ModelSet, tools: Arc<ToolRegistry>) -> Self {
        Self { models, tools }
    }

    /// Run the pipeline for one prompt, returning the chunk stream.
    ///
    /// The returned stream yields thinking chunks live, then the buffered
    /// final chunks in type-priority order (display modules before response
    /// content), then ends. The background task is never awaited after the
    /// terminal signal; dropping the stream lets it finish on its own.
    pub fn run(&self, prompt: String) -> impl Stream<Item = StreamChunk> + Send + 'static {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = StepContext::new(self.models.clone(), Arc::clone(&self.tools), tx.clone());

        tokio::spawn(async move {
            let signal = match PipelineGraph::new(ctx).run(&prompt).await {
                Ok(report) => {
                    info!(
                        run_id = %report.state.run_id,
                        pending = report.pending.len(),
                        "run completed"
                    );
                    BridgeSignal::Done {
                        outcome: RunOutcome::Completed,
                        pending: report.pending,
                    }
                }
                Err(err) => {
                    error!(error = %err, "run failed");
                    BridgeSignal::Done {
                        outcome: RunOutcome::Failed,
                        pending: Vec::new(),
                    }
                }
            };
            // Send failure means the consumer hung up; nothing left to do.
            let _ = tx.send(signal);
        });

        async_stream::stream! {
            while let Some(signal) = rx.recv().await {
                match signal {
                    BridgeSignal::Chunk(chunk) => yield chunk,
                    BridgeSignal::Done { outcome, mut pending } => {
                        match outcome {
                            RunOutcome::Completed => {
                                // Stable sort: equal-priority chunks keep
                                // their production order.
                                pending.sort_by_key(StreamChunk::flush_priority);
                                for chunk in pending {
                                    if !chunk.is_thinking() {
                                        yield chunk;
                                    }
                                }
                            }
                            RunOutcome::Failed => {
                                yield StreamChunk::ResponseContent(
                                    FAILURE_RESPONSE.to_string(),
                                );
                            }
                        }
                        return;
                    }
                }
            }
            // Channel closed without a terminal signal: the producer task
            // panicked. Still close out the caller's stream cleanly.
            error!("run ended without a terminal signal");
            yield StreamChunk::ResponseContent(FAILURE_RESPONSE.to_string());
        }
    }
}
