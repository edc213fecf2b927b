//! Scripted fakes shared by the pipeline tests.
//!
//! Each fake pops canned responses in order, so a test scripts one model
//! role (or tool) per queue and the call sequence stays deterministic.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::Stream;
use serde_json::Value;

use flowchat_types::error::ToolError;
use flowchat_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent};

use crate::llm::LlmProvider;
use crate::tool::Tool;

/// An LLM provider that replays a scripted queue of responses.
///
/// `Err` entries simulate provider failures. An exhausted queue is also a
/// failure, which makes missing script entries loud in tests.
pub(crate) struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub(crate) fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(|s| Ok(s.to_string())).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_results(responses: Vec<Result<&str, &str>>) -> Self {
        Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider whose every call fails.
    pub(crate) fn failing() -> Self {
        Self::with_results(vec![Err("scripted failure"); 8])
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(LlmError::Provider { message }),
            None => Err(LlmError::Provider { message: "script exhausted".to_string() }),
        }
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        _request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let content = self.next()?;
        Ok(CompletionResponse {
            id: "scripted".to_string(),
            content,
            model: "scripted".to_string(),
        })
    }

    fn stream(
        &self,
        _request: CompletionRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>> {
        // Split the scripted text into two deltas so consumers exercise
        // accumulation across events.
        let items: Vec<Result<StreamEvent, LlmError>> = match self.next() {
            Ok(text) => {
                let mid = text.len() / 2;
                let split = text
                    .char_indices()
                    .map(|(i, _)| i)
                    .find(|&i| i >= mid)
                    .unwrap_or(0);
                vec![
                    Ok(StreamEvent::TextDelta { text: text[..split].to_string() }),
                    Ok(StreamEvent::TextDelta { text: text[split..].to_string() }),
                    Ok(StreamEvent::Done),
                ]
            }
            Err(e) => vec![Err(e)],
        };
        Box::pin(futures_util::stream::iter(items))
    }
}

/// A tool that replays scripted textual results and records its arguments.
pub(crate) struct ScriptedTool {
    name: String,
    responses: Mutex<VecDeque<String>>,
    received: Mutex<Vec<Value>>,
}

impl ScriptedTool {
    pub(crate) fn new(name: &str, responses: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            responses: Mutex::new(responses.into()),
            received: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn invocation_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "scripted test tool"
    }

    fn invoke<'a>(
        &'a self,
        args: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            self.received.lock().unwrap().push(args.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ToolError::Failed {
                    tool: self.name.clone(),
                    reason: "script exhausted".to_string(),
                })
        })
    }
}
