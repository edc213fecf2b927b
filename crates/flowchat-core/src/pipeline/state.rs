//! The shared state record threaded through every pipeline step.
//!
//! Steps never mutate the record directly: each returns a [`StateUpdate`]
//! partial which the graph applies at the step boundary. Sequence fields
//! written by parallel steps use the merge-append rule in [`merge_append`],
//! which treats an absent operand as the empty sequence and never fails --
//! that null-safety is the contract that keeps the parallel-merge point of
//! the graph from crashing when a step produces nothing.

use std::time::{Duration, Instant};

use uuid::Uuid;

use flowchat_types::chunk::{DisplayModule, StreamChunk};
use flowchat_types::llm::{Message, MessageRole};

use super::RUN_BUDGET_SECS;

/// The validator's judgment of the composed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

/// Per-run mutable state, exclusively owned by one graph run.
#[derive(Debug)]
pub struct RunState {
    pub run_id: Uuid,
    /// Ordered message log; append-only.
    pub conversation: Vec<Message>,
    /// Current execution plan; last writer (the planner) wins.
    pub plan: String,
    /// All chunks produced so far; merge-append.
    pub stream_chunks: Vec<StreamChunk>,
    /// Display-module descriptors; merge-append.
    pub display_results: Vec<DisplayModule>,
    /// Unset until the validator has run at least once.
    pub verdict: Option<Verdict>,
    pub critique: String,
    /// Incremented only on a failed verdict; hard cap [`super::MAX_RETRIES`].
    pub retry_count: u32,
    /// Whether the gathering step collected at least one usable result.
    pub data_fetched: bool,
    pub started_at: Instant,
}

impl RunState {
    /// Seed a fresh run from the user prompt.
    pub fn new(system_prompt: &str, prompt: &str) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            conversation: vec![Message::system(system_prompt), Message::user(prompt)],
            plan: String::new(),
            stream_chunks: Vec::new(),
            display_results: Vec::new(),
            verdict: None,
            critique: String::new(),
            retry_count: 0,
            data_fetched: false,
            started_at: Instant::now(),
        }
    }

    /// The original user question.
    pub fn user_message(&self) -> &str {
        self.conversation
            .iter()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }

    /// All tool results collected so far, joined for prompt context.
    pub fn tool_context(&self) -> String {
        self.conversation
            .iter()
            .filter(|m| m.role == MessageRole::Tool && !m.content.is_empty())
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// The most recent composed answer, if any.
    pub fn last_response(&self) -> Option<&str> {
        self.conversation
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant && !m.content.is_empty())
            .map(|m| m.content.as_str())
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn budget_exceeded(&self) -> bool {
        self.elapsed() > Duration::from_secs(RUN_BUDGET_SECS)
    }

    pub fn remaining_budget(&self) -> Duration {
        Duration::from_secs(RUN_BUDGET_SECS).saturating_sub(self.elapsed())
    }

    /// Apply one step's partial update at the step boundary.
    pub fn apply(&mut self, update: StateUpdate) {
        self.conversation.extend(update.messages);
        if let Some(plan) = update.plan {
            self.plan = plan;
        }
        self.stream_chunks = merge_append(
            Some(std::mem::take(&mut self.stream_chunks)),
            update.stream_chunks,
        );
        self.display_results = merge_append(
            Some(std::mem::take(&mut self.display_results)),
            update.display_results,
        );
        if let Some(verdict) = update.verdict {
            self.verdict = Some(verdict);
        }
        if let Some(critique) = update.critique {
            self.critique = critique;
        }
        if let Some(fetched) = update.data_fetched {
            self.data_fetched = fetched;
        }
    }
}

/// A step's partial contribution to the state record.
///
/// `None` in a sequence field means "nothing produced" and merges as the
/// empty sequence; steps that want to be explicit return `Some(vec![])`.
#[derive(Debug, Default)]
pub struct StateUpdate {
    pub messages: Vec<Message>,
    pub plan: Option<String>,
    pub stream_chunks: Option<Vec<StreamChunk>>,
    pub display_results: Option<Vec<DisplayModule>>,
    pub verdict: Option<Verdict>,
    pub critique: Option<String>,
    pub data_fetched: Option<bool>,
}

impl StateUpdate {
    /// Combine the updates of two concurrently-executed steps.
    ///
    /// Sequence fields concatenate left-then-right; scalar fields take the
    /// right operand when present. Each contributor's internal order is
    /// preserved; the interleaving between contributors is fixed by the
    /// caller's argument order.
    pub fn merge(left: StateUpdate, right: StateUpdate) -> StateUpdate {
        let mut messages = left.messages;
        messages.extend(right.messages);
        StateUpdate {
            messages,
            plan: right.plan.or(left.plan),
            stream_chunks: Some(merge_append(left.stream_chunks, right.stream_chunks)),
            display_results: Some(merge_append(left.display_results, right.display_results)),
            verdict: right.verdict.or(left.verdict),
            critique: right.critique.or(left.critique),
            data_fetched: right.data_fetched.or(left.data_fetched),
        }
    }
}

/// The merge-append rule for sequence fields written by parallel steps.
///
/// An absent operand is the empty sequence; the result is always the
/// order-preserving concatenation. This must never fail for any operand
/// combination.
pub fn merge_append<T>(left: Option<Vec<T>>, right: Option<Vec<T>>) -> Vec<T> {
    let mut merged = left.unwrap_or_default();
    merged.extend(right.unwrap_or_default());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_both_lists() {
        assert_eq!(merge_append(Some(vec![1, 2]), Some(vec![3, 4])), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_merge_left_absent() {
        assert_eq!(merge_append(None, Some(vec![3, 4])), vec![3, 4]);
    }

    #[test]
    fn test_merge_right_absent() {
        assert_eq!(merge_append(Some(vec![1, 2]), None), vec![1, 2]);
    }

    #[test]
    fn test_merge_both_absent() {
        assert_eq!(merge_append::<i32>(None, None), Vec::<i32>::new());
    }

    #[test]
    fn test_merge_empty_lists() {
        assert_eq!(merge_append::<i32>(Some(vec![]), Some(vec![])), Vec::<i32>::new());
    }

    #[test]
    fn test_merge_left_empty() {
        assert_eq!(merge_append(Some(vec![]), Some(vec![1])), vec![1]);
    }

    #[test]
    fn test_merge_preserves_order() {
        let result = merge_append(Some(vec!["a", "b"]), Some(vec!["c", "d"]));
        assert_eq!(result, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_apply_accumulates_conversation() {
        let mut state = RunState::new("sys", "question");
        let before = state.conversation.len();

        state.apply(StateUpdate {
            messages: vec![Message::tool("result one")],
            ..Default::default()
        });
        state.apply(StateUpdate {
            messages: vec![Message::tool("result two")],
            ..Default::default()
        });

        assert_eq!(state.conversation.len(), before + 2);
        assert_eq!(state.tool_context(), "result one\n\nresult two");
    }

    #[test]
    fn test_apply_absent_sequences_is_safe() {
        let mut state = RunState::new("sys", "question");
        state.apply(StateUpdate {
            stream_chunks: Some(vec![StreamChunk::ThinkingContent("hi".into())]),
            ..Default::default()
        });
        // A later step that produced nothing must not disturb the record.
        state.apply(StateUpdate::default());
        assert_eq!(state.stream_chunks.len(), 1);
    }

    #[test]
    fn test_update_merge_concurrent_contributors() {
        let left = StateUpdate {
            stream_chunks: Some(vec![StreamChunk::ThinkingContent("a".into())]),
            ..Default::default()
        };
        let right = StateUpdate {
            stream_chunks: None,
            data_fetched: Some(true),
            ..Default::default()
        };

        let merged = StateUpdate::merge(left, right);
        assert_eq!(merged.stream_chunks.as_ref().unwrap().len(), 1);
        assert_eq!(merged.data_fetched, Some(true));
    }

    #[test]
    fn test_user_message_and_last_response() {
        let mut state = RunState::new("sys", "what is up");
        assert_eq!(state.user_message(), "what is up");
        assert!(state.last_response().is_none());

        state.apply(StateUpdate {
            messages: vec![Message::assistant("not much")],
            ..Default::default()
        });
        assert_eq!(state.last_response(), Some("not much"));
    }
}
