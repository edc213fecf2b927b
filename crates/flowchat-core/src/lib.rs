//! Orchestration engine for Flowchat.
//!
//! One user prompt becomes one *run*: the pipeline graph threads a shared
//! state record through planner, parallel reasoning/gathering, aggregation,
//! composition, and validation, while the streaming bridge relays progress
//! chunks to the caller and guarantees a terminal signal.

pub mod llm;
pub mod pipeline;
pub mod tool;

#[cfg(test)]
pub(crate) mod testing;
