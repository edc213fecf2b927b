use thiserror::Error;

/// Errors from tool invocation.
///
/// Only structural failures are errors; a tool that reaches its backend and
/// gets a bad answer returns descriptive text instead, so the gathering loop
/// can decide whether to note it and continue.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("tool '{tool}' failed: {reason}")]
    Failed { tool: String, reason: String },
}

/// Errors from chart payload validation.
///
/// These are explicit named conditions, never assertions: the checks must
/// run in release builds because the payload comes from a model.
#[derive(Debug, Error)]
pub enum ChartError {
    #[error("chart output is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("chart output missing required field '{0}'")]
    MissingField(&'static str),

    #[error("chart field '{field}' must be {expected}")]
    WrongType { field: &'static str, expected: &'static str },

    #[error("chart data array is empty")]
    EmptyData,

    #[error("series key '{0}' not found in data objects")]
    UnknownSeriesKey(String),

    #[error("unknown chart type: '{0}'")]
    UnknownChartType(String),
}
