//! Configuration loader.
//!
//! Reads `config.toml` from the given directory and falls back to defaults
//! when the file is missing or malformed, so a bare checkout still starts.
//! `FLOWCHAT_*` environment variables override the file for the settings
//! that differ between deployments.

use std::path::Path;

use secrecy::SecretString;
use serde::Deserialize;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Caller-facing timeout for one chat request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
            request_timeout_secs: 300,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible endpoint root, e.g. `http://localhost:11434/v1`.
    pub base_url: String,
    pub api_key: SecretString,
    /// Model for short narrative and verdict calls.
    pub fast_model: String,
    /// Model for planning and tool routing.
    pub planner_model: String,
    /// Model for answers and chart fills.
    pub responder_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: SecretString::from(String::new()),
            fast_model: "llama3.2".to_string(),
            planner_model: "llama3.2".to_string(),
            responder_model: "llama3.1:8b".to_string(),
        }
    }
}

// LlmConfig carries the API key; Debug is implemented manually so the key
// cannot leak through log formatting.
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("fast_model", &self.fast_model)
            .field("planner_model", &self.planner_model)
            .field("responder_model", &self.responder_model)
            .finish()
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ToolsConfig {
    /// Alpha Vantage API key; the market tool reports a descriptive error
    /// when empty instead of refusing to register.
    pub market_api_key: SecretString,
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("market_api_key", &"<redacted>")
            .finish()
    }
}

/// Load configuration from `{dir}/config.toml`, then apply env overrides.
///
/// Missing file means defaults; a malformed file logs a warning and also
/// means defaults, never a startup failure.
pub async fn load(dir: &Path) -> AppConfig {
    let path = dir.join("config.toml");
    let mut config = match tokio::fs::read_to_string(&path).await {
        Ok(content) => match toml::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("failed to parse {}: {err}, using defaults", path.display());
                AppConfig::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no config.toml at {}, using defaults", path.display());
            AppConfig::default()
        }
        Err(err) => {
            tracing::warn!("failed to read {}: {err}, using defaults", path.display());
            AppConfig::default()
        }
    };
    apply_env_overrides(&mut config);
    config
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(host) = std::env::var("FLOWCHAT_HOST") {
        config.server.host = host;
    }
    if let Ok(port) = std::env::var("FLOWCHAT_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(_) => tracing::warn!("ignoring non-numeric FLOWCHAT_PORT: '{port}'"),
        }
    }
    if let Ok(url) = std::env::var("FLOWCHAT_LLM_BASE_URL") {
        config.llm.base_url = url;
    }
    if let Ok(key) = std::env::var("FLOWCHAT_LLM_API_KEY") {
        config.llm.api_key = SecretString::from(key);
    }
    if let Ok(key) = std::env::var("FLOWCHAT_MARKET_API_KEY") {
        config.tools.market_api_key = SecretString::from(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load(tmp.path()).await;
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.llm.base_url, "http://localhost:11434/v1");
    }

    #[tokio::test]
    async fn test_valid_toml_is_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[server]
port = 9000

[llm]
base_url = "https://api.openai.com/v1"
api_key = "sk-test"
responder_model = "gpt-4o-mini"
"#,
        )
        .await
        .unwrap();

        let config = load(tmp.path()).await;
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
        assert_eq!(config.llm.api_key.expose_secret(), "sk-test");
        assert_eq!(config.llm.responder_model, "gpt-4o-mini");
        // Unset sections keep their defaults.
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.llm.fast_model, "llama3.2");
    }

    #[tokio::test]
    async fn test_malformed_toml_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "not { valid toml !!!")
            .await
            .unwrap();

        let config = load(tmp.path()).await;
        assert_eq!(config.server.port, 8090);
    }

    #[test]
    fn test_debug_never_prints_secrets() {
        let config = AppConfig {
            llm: LlmConfig {
                api_key: SecretString::from("sk-very-secret".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
