//! Aggregation step: turns gathered data into chart display modules.
//!
//! The plan's CHART_TYPE field decides whether a chart is wanted; a
//! per-type JSON template is handed to the responder model to fill with
//! real numbers, and the filled object is validated structurally before it
//! becomes a [`DisplayModule`]. Validation is explicit and always runs --
//! a malformed fill produces the safe fallback state (no module) with the
//! cause logged, never a crash or an unchecked pass-through.

use serde_json::{Value, json};
use tracing::{info, warn};

use flowchat_types::chunk::{ChartType, DisplayModule};
use flowchat_types::error::ChartError;
use flowchat_types::llm::{CompletionRequest, Message};

use super::state::{RunState, StateUpdate};
use super::text::{extract_json_object, extract_plan_field, preview, truncate_chars};
use super::{QUESTION_WINDOW, StepContext, TOOL_CONTEXT_WINDOW, prompts};

/// The fill template for one chart type. The model replaces every
/// placeholder with real values; the shape itself must survive untouched.
fn chart_template(chart_type: ChartType) -> Value {
    json!({
        "type": chart_type.to_string(),
        "data": {
            "title": "<descriptive title>",
            "data": [
                {"name": "<label>", "value": 0.0}
            ],
            "series": [
                {"key": "value", "color": "#1976d2"}
            ]
        }
    })
}

/// Structural validation of a filled chart object.
///
/// Checks the exact shape the client renderer expects: a `type` naming a
/// known chart, a `data` object with a title, a non-empty `data.data`
/// array, and every `series` key present in the first datum.
fn validate_chart(raw: &Value) -> Result<DisplayModule, ChartError> {
    let obj = raw.as_object().ok_or(ChartError::WrongType {
        field: "chart",
        expected: "object",
    })?;

    let type_str = obj
        .get("type")
        .ok_or(ChartError::MissingField("type"))?
        .as_str()
        .ok_or(ChartError::WrongType { field: "type", expected: "string" })?;
    let chart_type: ChartType = type_str
        .parse()
        .map_err(|_| ChartError::UnknownChartType(type_str.to_string()))?;

    let inner = obj
        .get("data")
        .ok_or(ChartError::MissingField("data"))?
        .as_object()
        .ok_or(ChartError::WrongType { field: "data", expected: "object" })?;

    if !inner.contains_key("title") {
        return Err(ChartError::MissingField("data.title"));
    }

    let points = inner
        .get("data")
        .ok_or(ChartError::MissingField("data.data"))?
        .as_array()
        .ok_or(ChartError::WrongType { field: "data.data", expected: "array" })?;
    if points.is_empty() {
        return Err(ChartError::EmptyData);
    }

    let series = inner
        .get("series")
        .ok_or(ChartError::MissingField("data.series"))?
        .as_array()
        .ok_or(ChartError::WrongType { field: "data.series", expected: "array" })?;

    let first = &points[0];
    for entry in series {
        if let Some(key) = entry.get("key").and_then(Value::as_str) {
            let known = first.get(key).is_some() || key == "x" || key == "y";
            if !known {
                return Err(ChartError::UnknownSeriesKey(key.to_string()));
            }
        }
    }

    Ok(DisplayModule {
        chart_type,
        data: obj.get("data").cloned().unwrap_or(Value::Null),
    })
}

pub(crate) async fn run(ctx: &StepContext, state: &RunState) -> StateUpdate {
    let empty = StateUpdate {
        stream_chunks: Some(Vec::new()),
        display_results: Some(Vec::new()),
        ..Default::default()
    };

    if state.budget_exceeded() {
        warn!(run_id = %state.run_id, "aggregation skipped, run budget exceeded");
        return empty;
    }

    let raw_type = extract_plan_field(&state.plan, "CHART_TYPE").unwrap_or_default();
    let Ok(chart_type) = raw_type.parse::<ChartType>() else {
        info!(run_id = %state.run_id, "no chart needed per plan");
        return empty;
    };

    let tool_context = state.tool_context();
    let (context_section, data_instruction) = if tool_context.is_empty() {
        (
            "Research context: None available. Use realistic sample values to illustrate the chart."
                .to_string(),
            "No real data is available - use plausible illustrative values.",
        )
    } else {
        (
            format!(
                "Research context (use these numbers):\n{}",
                truncate_chars(&tool_context, TOOL_CONTEXT_WINDOW)
            ),
            "Only use numbers from the research context - do NOT invent data.",
        )
    };

    let template = chart_template(chart_type);
    let fill_user = format!(
        "User request: {}\n\n{context_section}\n\nTemplate to fill:\n{}\n\n{data_instruction}\n\
         Remember: numeric field names must be simple words (e.g. 'value', 'price'), not dollar amounts.\n\
         Output the filled JSON object:",
        truncate_chars(state.user_message(), QUESTION_WINDOW),
        serde_json::to_string_pretty(&template).unwrap_or_default(),
    );

    let chunk = ctx.emit_thinking(format!("Putting together a {chart_type} for you..."));

    let request = CompletionRequest::single_turn(prompts::CHART_FILL_SYSTEM, fill_user);
    let raw = match ctx.models.responder.complete(&request).await {
        Ok(response) => response.content,
        Err(error) => {
            warn!(run_id = %state.run_id, %error, "chart fill call failed, no module");
            return StateUpdate {
                stream_chunks: Some(vec![chunk]),
                display_results: Some(Vec::new()),
                ..Default::default()
            };
        }
    };

    let extracted = extract_json_object(raw.trim());
    let module = serde_json::from_str::<Value>(extracted)
        .map_err(|e| ChartError::InvalidJson(e.to_string()))
        .and_then(|value| validate_chart(&value));

    match module {
        Ok(module) => {
            info!(run_id = %state.run_id, chart = %module.chart_type, "chart module ready");
            StateUpdate {
                messages: vec![Message::tool("Chart filled and sent to frontend.")],
                stream_chunks: Some(vec![chunk]),
                display_results: Some(vec![module]),
                ..Default::default()
            }
        }
        Err(error) => {
            // Safe fallback: no module. The composer still answers in text.
            warn!(
                run_id = %state.run_id,
                %error,
                raw = %preview(extracted),
                "chart validation failed, dropping module"
            );
            StateUpdate {
                stream_chunks: Some(vec![chunk]),
                display_results: Some(Vec::new()),
                ..Default::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::BoxLlmProvider;
    use crate::pipeline::ModelSet;
    use crate::testing::ScriptedProvider;
    use crate::tool::ToolRegistry;
    use std::sync::Arc;

    fn context(responder: ScriptedProvider) -> StepContext {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let provider = Arc::new(BoxLlmProvider::new(responder));
        StepContext::new(ModelSet::uniform(provider), Arc::new(ToolRegistry::new()), tx)
    }

    fn state_with_chart(chart: &str) -> RunState {
        let mut state = RunState::new("sys", "plot widget sales");
        state.apply(StateUpdate {
            plan: Some(format!("STEPS: 1. plot\nDATA_NEEDED: sales\nCHART_TYPE: {chart}")),
            ..Default::default()
        });
        state
    }

    const GOOD_FILL: &str = r##"{"type": "LineGraph", "data": {"title": "Widget sales",
        "data": [{"name": "Q1", "value": 10.0}, {"name": "Q2", "value": 14.0}],
        "series": [{"key": "value", "color": "#1976d2"}]}}"##;

    #[tokio::test]
    async fn test_no_chart_type_means_no_module() {
        let ctx = context(ScriptedProvider::new(vec![]));
        let update = run(&ctx, &state_with_chart("none")).await;
        assert!(update.display_results.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_valid_fill_produces_module() {
        let ctx = context(ScriptedProvider::new(vec![GOOD_FILL]));
        let update = run(&ctx, &state_with_chart("LineGraph")).await;

        let modules = update.display_results.unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].chart_type, ChartType::LineGraph);
        assert_eq!(modules[0].data["title"], "Widget sales");
    }

    #[tokio::test]
    async fn test_fill_with_surrounding_prose_still_parses() {
        let wrapped = format!("Here is the chart:\n{GOOD_FILL}\nEnjoy!");
        let ctx = context(ScriptedProvider::new(vec![&wrapped]));
        let update = run(&ctx, &state_with_chart("line")).await;
        assert_eq!(update.display_results.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_field_falls_back_to_no_module() {
        let ctx = context(ScriptedProvider::new(vec![
            r#"{"type": "LineGraph", "data": {"title": "t", "series": []}}"#,
        ]));
        let update = run(&ctx, &state_with_chart("LineGraph")).await;
        assert!(update.display_results.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_no_module() {
        let ctx = context(ScriptedProvider::failing());
        let update = run(&ctx, &state_with_chart("BarGraph")).await;
        assert!(update.display_results.unwrap().is_empty());
    }

    #[test]
    fn test_validate_rejects_empty_data_array() {
        let raw = serde_json::json!({
            "type": "BarGraph",
            "data": {"title": "t", "data": [], "series": []}
        });
        assert!(matches!(validate_chart(&raw), Err(ChartError::EmptyData)));
    }

    #[test]
    fn test_validate_rejects_unknown_series_key() {
        let raw = serde_json::json!({
            "type": "BarGraph",
            "data": {
                "title": "t",
                "data": [{"name": "a", "value": 1.0}],
                "series": [{"key": "price"}]
            }
        });
        assert!(matches!(validate_chart(&raw), Err(ChartError::UnknownSeriesKey(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_chart_type() {
        let raw = serde_json::json!({
            "type": "PieChart",
            "data": {"title": "t", "data": [{"name": "a"}], "series": []}
        });
        assert!(matches!(validate_chart(&raw), Err(ChartError::UnknownChartType(_))));
    }
}
