//! Data-gathering step: a bounded plan-call-judge loop over the tool
//! registry.
//!
//! Each iteration makes one routing call whose first non-empty line is
//! either `CALL: <tool> | <json-args>` or `DONE`. DONE is itself the
//! sufficiency signal, so no separate judging call happens on that path;
//! only verdict-shaped replies go through [`classify_sufficiency`], which
//! defaults to not-sufficient because continuing research is safer than
//! stopping early with partial data. The hard iteration cap bounds the
//! loop either way.

use serde_json::Value;
use tracing::{debug, info, warn};

use flowchat_types::error::ToolError;
use flowchat_types::llm::{CompletionRequest, Message};

use super::state::{RunState, StateUpdate};
use super::text::{extract_plan_field, preview, truncate_chars};
use super::{
    CONTEXT_WINDOW, MAX_ITERATIONS, MAX_RESULT_CHARS, NEED_WINDOW, QUESTION_WINDOW, StepContext,
    prompts,
};

/// Outcome of a sufficiency judgment over a verdict-shaped router reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sufficiency {
    Sufficient,
    NotSufficient,
}

/// Strict classification of a sufficiency verdict.
///
/// The fail token is checked first: "INSUFFICIENT" contains "SUFFICIENT"
/// as a substring, so a naive containment check in the other order would
/// misclassify it. Anything unrecognized is not-sufficient.
pub(crate) fn classify_sufficiency(text: &str) -> Sufficiency {
    let upper = text.to_uppercase();
    if upper.contains("INSUFFICIENT") {
        Sufficiency::NotSufficient
    } else if upper.contains("SUFFICIENT") {
        Sufficiency::Sufficient
    } else {
        Sufficiency::NotSufficient
    }
}

/// One parsed router reply.
#[derive(Debug, PartialEq)]
enum Decision {
    Done,
    Call { tool: String, args: Value },
    Verdict(String),
}

/// Parse the first non-empty line of the router's reply.
///
/// `None` means the reply was empty after trimming, which terminates the
/// loop, or a CALL line was malformed beyond recovery.
fn parse_decision(text: &str) -> Option<Decision> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let upper = line.to_uppercase();

    if upper.starts_with("DONE") {
        return Some(Decision::Done);
    }
    if let Some(rest) = upper
        .starts_with("CALL:")
        .then(|| line[5..].trim())
    {
        let (tool, args_str) = rest.split_once('|')?;
        let args: Value = serde_json::from_str(args_str.trim()).ok()?;
        return Some(Decision::Call { tool: tool.trim().to_string(), args });
    }
    Some(Decision::Verdict(line.to_string()))
}

/// Phrases that mark a textual tool result as a soft failure: the call
/// went through but the backend had nothing useful. The loop notes these
/// and keeps iterating instead of treating them as data.
const SOFT_ERROR_MARKERS: &[&str] = &[
    "error message",
    "rate limit",
    "not found",
    "no content found",
    "timed out",
    "network error",
    "unexpected error",
    "error retrieving",
];

fn is_soft_error(result: &str) -> bool {
    let lower = result.to_lowercase();
    SOFT_ERROR_MARKERS.iter().any(|m| lower.contains(m))
}

pub(crate) async fn run(ctx: &StepContext, state: &RunState) -> StateUpdate {
    if state.budget_exceeded() {
        warn!(run_id = %state.run_id, "gathering skipped, run budget exceeded");
        return StateUpdate {
            stream_chunks: Some(Vec::new()),
            data_fetched: Some(false),
            ..Default::default()
        };
    }

    let data_needed = extract_plan_field(&state.plan, "DATA_NEEDED").unwrap_or_default();
    if matches!(data_needed.to_lowercase().as_str(), "" | "none" | "n/a") {
        info!(run_id = %state.run_id, "no data needed per plan, skipping gathering");
        return StateUpdate {
            stream_chunks: Some(Vec::new()),
            data_fetched: Some(true),
            ..Default::default()
        };
    }

    let question = truncate_chars(state.user_message(), QUESTION_WINDOW).to_string();
    let need = truncate_chars(&data_needed, NEED_WINDOW).to_string();
    let tool_listing = ctx.tools.describe_all();

    let mut collected: Vec<String> = Vec::new();
    let mut messages: Vec<Message> = Vec::new();
    let mut chunks = Vec::new();
    let mut iteration = 0;
    // Usable results only; soft-error notes in `collected` don't count.
    let mut usable_results = 0usize;

    while iteration < MAX_ITERATIONS {
        if state.budget_exceeded() {
            warn!(run_id = %state.run_id, "run budget exceeded mid-loop, stopping");
            break;
        }
        iteration += 1;
        debug!(run_id = %state.run_id, iteration, "gathering iteration");

        let context_so_far = if collected.is_empty() {
            "NO TOOLS CALLED YET - you must make a CALL".to_string()
        } else {
            collected.join("\n---\n")
        };
        let hint = if collected.is_empty() {
            "NO TOOLS HAVE BEEN CALLED YET. You MUST output a CALL line. DONE is not valid."
        } else {
            "Output DONE only if collected results fully answer the question."
        };

        let request = CompletionRequest::single_turn(
            prompts::router_system(&tool_listing, hint),
            format!(
                "Question: {question}\nNeed: {need}\nHave: {}",
                truncate_chars(&context_so_far, CONTEXT_WINDOW)
            ),
        );

        let reply = match ctx.models.planner.complete(&request).await {
            Ok(response) => response.content,
            Err(error) => {
                warn!(run_id = %state.run_id, %error, "routing call failed, stopping loop");
                break;
            }
        };

        let decision = match parse_decision(&reply) {
            Some(decision) => decision,
            None => {
                warn!(
                    run_id = %state.run_id,
                    reply = %preview(&reply),
                    "empty or unparseable routing reply, stopping loop"
                );
                break;
            }
        };

        let (tool, args) = match decision {
            Decision::Done => {
                if collected.is_empty() {
                    warn!(run_id = %state.run_id, "router said DONE with no results");
                } else {
                    info!(run_id = %state.run_id, "router says DONE");
                }
                break;
            }
            Decision::Verdict(line) => {
                match classify_sufficiency(&line) {
                    Sufficiency::Sufficient => {
                        info!(run_id = %state.run_id, "verdict sufficient, stopping loop");
                        break;
                    }
                    Sufficiency::NotSufficient => {
                        debug!(
                            run_id = %state.run_id,
                            line = %preview(&line),
                            "verdict not sufficient, continuing"
                        );
                        continue;
                    }
                }
            }
            Decision::Call { tool, args } => (tool, args),
        };

        chunks.push(ctx.emit_thinking(format!("Looking up {tool}...")));

        let result = match ctx.tools.invoke(&tool, &args).await {
            Ok(result) => result,
            Err(ToolError::UnknownTool(name)) => {
                warn!(run_id = %state.run_id, tool = %name, "router chose unknown tool, stopping");
                break;
            }
            Err(error) => format!("Tool error: {error}"),
        };

        if is_soft_error(&result) {
            warn!(
                run_id = %state.run_id,
                tool = %tool,
                result = %preview(&result),
                "soft tool error, noting and continuing"
            );
            collected.push(format!("[{tool} failed]: {}", truncate_chars(&result, 200)));
            continue;
        }

        // Truncate each result as it is collected, not the joined string,
        // so late results are not lost to an already-long context.
        let trimmed = truncate_chars(&result, MAX_RESULT_CHARS).to_string();
        info!(run_id = %state.run_id, tool = %tool, chars = trimmed.len(), "tool result collected");
        messages.push(Message::tool(trimmed.clone()));
        collected.push(trimmed);
        usable_results += 1;
    }

    let data_fetched = usable_results > 0;
    info!(
        run_id = %state.run_id,
        iterations = iteration,
        results = collected.len(),
        data_fetched,
        "gathering done"
    );

    StateUpdate {
        messages,
        stream_chunks: Some(chunks),
        data_fetched: Some(data_fetched),
        ..Default::default()
    }
}
