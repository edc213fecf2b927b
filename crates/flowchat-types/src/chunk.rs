//! Stream chunk protocol shared between the pipeline and the HTTP layer.
//!
//! The wire format is newline-delimited JSON records:
//!
//! ```json
//! {"type":"thinking_content","data":"Let me look that up..."}
//! {"type":"response_content","data":"Widget sales are trending up."}
//! {"type":"display_modules","data":[{"type":"LineGraph","data":{...}}]}
//! ```
//!
//! Consumers buffer partial records across read boundaries and split on
//! newlines themselves; stream closure signals completion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One record of the streaming response protocol.
///
/// This is a closed union: every payload crossing the channel is one of
/// these three kinds, validated where it is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Intermediate narration shown in the client's thinking box.
    ThinkingContent(String),

    /// Final answer text.
    ResponseContent(String),

    /// Chart descriptors for the client renderer.
    DisplayModules(Vec<DisplayModule>),
}

impl StreamChunk {
    /// Encode as one newline-terminated wire record.
    ///
    /// Serialization of this enum cannot fail (no non-string map keys, no
    /// non-serializable fields), so a failure is reported as an empty line
    /// rather than panicking on the streaming path.
    pub fn to_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => format!("{json}\n"),
            Err(_) => "\n".to_string(),
        }
    }

    /// Flush ordering for buffered chunks after the terminal signal:
    /// display modules first, then response content.
    pub fn flush_priority(&self) -> u8 {
        match self {
            StreamChunk::DisplayModules(_) => 0,
            StreamChunk::ResponseContent(_) => 1,
            StreamChunk::ThinkingContent(_) => 2,
        }
    }

    /// Thinking chunks are streamed live and never re-flushed at the end.
    pub fn is_thinking(&self) -> bool {
        matches!(self, StreamChunk::ThinkingContent(_))
    }
}

/// A chart descriptor instructing the client to render one visual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayModule {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub data: serde_json::Value,
}

/// Supported chart types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartType {
    LineGraph,
    BarGraph,
    ScatterPlot,
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartType::LineGraph => write!(f, "LineGraph"),
            ChartType::BarGraph => write!(f, "BarGraph"),
            ChartType::ScatterPlot => write!(f, "ScatterPlot"),
        }
    }
}

impl FromStr for ChartType {
    type Err = String;

    /// Accepts the aliases planner models actually emit ("line", "bar",
    /// "histogram", ...), not just the canonical names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linegraph" | "line" => Ok(ChartType::LineGraph),
            "bargraph" | "bar" | "histogram" => Ok(ChartType::BarGraph),
            "scatterplot" | "scatter" => Ok(ChartType::ScatterPlot),
            other => Err(format!("unknown chart type: '{other}'")),
        }
    }
}
