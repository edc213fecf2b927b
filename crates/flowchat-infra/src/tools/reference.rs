//! Reference lookup tool backed by the Wikipedia search API.
//!
//! Two-step lookup: search for the best-matching article, then fetch its
//! intro extract as plain text. Misses and transport failures come back as
//! descriptive text.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;

use flowchat_core::tool::Tool;
use flowchat_types::error::ToolError;

const API_URL: &str = "https://en.wikipedia.org/w/api.php";
const USER_AGENT: &str = "flowchat/0.1";
const EXTRACT_CHARS: usize = 2000;

pub struct ReferenceLookupTool {
    client: reqwest::Client,
    api_url: String,
}

impl Default for ReferenceLookupTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceLookupTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client, api_url: API_URL.to_string() }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<Value, String> {
        let response = self
            .client
            .get(&self.api_url)
            .query(params)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        response.json().await.map_err(|e| e.to_string())
    }

    async fn lookup(&self, query: &str) -> String {
        let search = match self
            .get(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", "1"),
                ("format", "json"),
            ])
            .await
        {
            Ok(value) => value,
            Err(err) => return format!("Error retrieving context: {err}"),
        };

        let Some(title) = first_search_title(&search) else {
            return format!("No article found for '{query}'.");
        };

        let extract_resp = match self
            .get(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("titles", &title),
                ("format", "json"),
                ("redirects", "1"),
            ])
            .await
        {
            Ok(value) => value,
            Err(err) => return format!("Error retrieving context: {err}"),
        };

        match first_extract(&extract_resp) {
            Some(extract) => {
                let trimmed: String = extract.chars().take(EXTRACT_CHARS).collect();
                let suffix = if extract.chars().count() > EXTRACT_CHARS { "..." } else { "" };
                format!("[Reference: {title}]\n\n{trimmed}{suffix}")
            }
            None => format!("No content found for '{title}'."),
        }
    }
}

/// Title of the best search hit, if any.
fn first_search_title(response: &Value) -> Option<String> {
    response["query"]["search"][0]["title"]
        .as_str()
        .map(str::to_string)
}

/// Intro extract of the first page in an extracts response.
fn first_extract(response: &Value) -> Option<String> {
    let pages = response["query"]["pages"].as_object()?;
    let (page_id, page) = pages.iter().next()?;
    if page_id == "-1" {
        return None;
    }
    page["extract"]
        .as_str()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
}

impl Tool for ReferenceLookupTool {
    fn name(&self) -> &str {
        "reference_lookup"
    }

    fn description(&self) -> &str {
        "Look up background on a company, person, or topic. Args: {\"query\": \"<topic>\"}"
    }

    fn invoke<'a>(
        &'a self,
        args: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let query = args["query"]
                .as_str()
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .ok_or_else(|| ToolError::InvalidArguments {
                    tool: "reference_lookup".to_string(),
                    reason: "missing 'query'".to_string(),
                })?;
            Ok(self.lookup(query).await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_search_title() {
        let response = json!({
            "query": {"search": [{"title": "Apple Inc."}, {"title": "Apple"}]}
        });
        assert_eq!(first_search_title(&response).as_deref(), Some("Apple Inc."));
        assert_eq!(first_search_title(&json!({"query": {"search": []}})), None);
    }

    #[test]
    fn test_first_extract() {
        let response = json!({
            "query": {"pages": {"12345": {"extract": "  Apple Inc. is a company.  "}}}
        });
        assert_eq!(
            first_extract(&response).as_deref(),
            Some("Apple Inc. is a company.")
        );
    }

    #[test]
    fn test_first_extract_missing_page() {
        let response = json!({"query": {"pages": {"-1": {"missing": ""}}}});
        assert_eq!(first_extract(&response), None);
    }

    #[test]
    fn test_first_extract_empty_text() {
        let response = json!({"query": {"pages": {"7": {"extract": "   "}}}});
        assert_eq!(first_extract(&response), None);
    }

    #[tokio::test]
    async fn test_invoke_requires_query() {
        let tool = ReferenceLookupTool::new();
        let err = tool.invoke(&json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
