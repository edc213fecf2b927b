//! Shared application state handed to every handler.

use std::sync::Arc;
use std::time::Duration;

use flowchat_core::llm::BoxLlmProvider;
use flowchat_core::pipeline::{ModelSet, StreamingBridge};
use flowchat_core::tool::ToolRegistry;
use flowchat_infra::config::AppConfig;
use flowchat_infra::llm::OpenAiCompatProvider;
use flowchat_infra::tools::{MarketDataTool, ReferenceLookupTool};

/// Cheap to clone; everything heavyweight sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub bridge: StreamingBridge,
    /// Caller-facing timeout for one chat request.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Self {
        let llm = &config.llm;
        let provider = |model: &str| {
            Arc::new(BoxLlmProvider::new(OpenAiCompatProvider::new(
                llm.base_url.clone(),
                llm.api_key.clone(),
                model,
            )))
        };
        let models = ModelSet {
            fast: provider(&llm.fast_model),
            planner: provider(&llm.planner_model),
            responder: provider(&llm.responder_model),
        };

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(MarketDataTool::new(
            config.tools.market_api_key.clone(),
        )));
        tools.register(Arc::new(ReferenceLookupTool::new()));

        Self {
            bridge: StreamingBridge::new(models, Arc::new(tools)),
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
        }
    }
}
