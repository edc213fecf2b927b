//! Market data tool backed by the Alpha Vantage HTTP API.
//!
//! Supports company overviews, latest quotes, and daily price series, each
//! rendered as plain text for the model context. Backend failures (rate
//! limit notes, unknown symbols, transport errors) come back as text too,
//! so the gathering loop can treat them as soft errors.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use flowchat_core::tool::Tool;
use flowchat_types::error::ToolError;

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";
const DEFAULT_DAILY_LIMIT: usize = 30;

pub struct MarketDataTool {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl MarketDataTool {
    pub fn new(api_key: SecretString) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
        }
    }

    /// Point at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch(&self, symbol: &str, function: &str, limit: Option<usize>) -> String {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("function", function),
                ("symbol", symbol),
                ("apikey", self.api_key.expose_secret()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                return format!("Request for market data timed out for '{symbol}'.");
            }
            Err(err) => {
                return format!("Network error fetching data for '{symbol}': {err}");
            }
        };

        let data: Value = match response.json().await {
            Ok(data) => data,
            Err(err) => return format!("Network error fetching data for '{symbol}': {err}"),
        };

        // Backend-reported problems arrive with 200 status.
        if let Some(message) = data["Error Message"].as_str() {
            return format!("Market data error for '{symbol}': {message}");
        }
        if let Some(note) = data["Note"].as_str() {
            return format!("Market data rate limit reached. Try again in a minute. ({note})");
        }
        if let Some(info) = data["Information"].as_str() {
            return format!("Market data API notice: {info}");
        }

        match function {
            "OVERVIEW" => format_overview(symbol, &data),
            "GLOBAL_QUOTE" => format_quote(symbol, &data),
            "TIME_SERIES_DAILY" => {
                format_daily(symbol, &data, limit.unwrap_or(DEFAULT_DAILY_LIMIT))
            }
            other => format!("Unsupported market data function '{other}'."),
        }
    }
}

fn field<'a>(value: &'a Value, key: &str) -> &'a str {
    value[key].as_str().unwrap_or("N/A")
}

fn format_overview(symbol: &str, data: &Value) -> String {
    let keys = [
        "Name",
        "Symbol",
        "Exchange",
        "Sector",
        "Industry",
        "MarketCapitalization",
        "PERatio",
        "EPS",
        "DividendYield",
        "52WeekHigh",
        "52WeekLow",
        "AnalystTargetPrice",
    ];
    let mut lines = vec![format!("[Market data: {symbol} Overview]")];
    for key in keys {
        lines.push(format!("{key}: {}", field(data, key)));
    }
    let description = field(data, "Description");
    if description != "N/A" {
        let trimmed: String = description.chars().take(400).collect();
        let suffix = if description.chars().count() > 400 { "..." } else { "" };
        lines.push(format!("\nDescription: {trimmed}{suffix}"));
    }
    lines.join("\n")
}

fn format_quote(symbol: &str, data: &Value) -> String {
    let quote = &data["Global Quote"];
    if !quote.is_object() || quote.as_object().is_some_and(|o| o.is_empty()) {
        return format!("No quote data found for '{symbol}'.");
    }
    format!(
        "[Market data: {symbol} Quote]\n\
         Price: {}\n\
         Change: {} ({})\n\
         Open: {}\n\
         High: {}\n\
         Low: {}\n\
         Volume: {}\n\
         Previous Close: {}\n\
         Latest Trading Day: {}",
        field(quote, "05. price"),
        field(quote, "09. change"),
        field(quote, "10. change percent"),
        field(quote, "02. open"),
        field(quote, "03. high"),
        field(quote, "04. low"),
        field(quote, "06. volume"),
        field(quote, "08. previous close"),
        field(quote, "07. latest trading day"),
    )
}

fn format_daily(symbol: &str, data: &Value, limit: usize) -> String {
    let Some(series) = data["Time Series (Daily)"].as_object() else {
        return format!("No daily price data found for '{symbol}'.");
    };
    if series.is_empty() {
        return format!("No daily price data found for '{symbol}'.");
    }
    let mut days: Vec<&String> = series.keys().collect();
    days.sort_by(|a, b| b.cmp(a));
    days.truncate(limit);

    let mut lines = vec![format!(
        "[Market data: {symbol} Daily Prices (last {} days)]",
        days.len()
    )];
    for day in days {
        let entry = &series[day.as_str()];
        lines.push(format!(
            "{day}: open={} high={} low={} close={} vol={}",
            field(entry, "1. open"),
            field(entry, "2. high"),
            field(entry, "3. low"),
            field(entry, "4. close"),
            field(entry, "5. volume"),
        ));
    }
    lines.join("\n")
}

#[derive(Debug)]
struct MarketArgs {
    symbol: String,
    function: String,
    limit: Option<usize>,
}

fn parse_args(args: &Value) -> Result<MarketArgs, ToolError> {
    let symbol = args["symbol"]
        .as_str()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: "market_data".to_string(),
            reason: "missing 'symbol'".to_string(),
        })?;
    let function = args["function"]
        .as_str()
        .map(|f| f.trim().to_uppercase())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| "GLOBAL_QUOTE".to_string());
    let limit = args["limit"].as_u64().map(|l| l as usize);
    Ok(MarketArgs { symbol, function, limit })
}

impl Tool for MarketDataTool {
    fn name(&self) -> &str {
        "market_data"
    }

    fn description(&self) -> &str {
        "Fetch financial data for a stock ticker. Args: {\"symbol\": \"<TICKER>\", \
         \"function\": \"OVERVIEW\"|\"GLOBAL_QUOTE\"|\"TIME_SERIES_DAILY\"}"
    }

    fn invoke<'a>(
        &'a self,
        args: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let args = parse_args(args)?;
            Ok(self.fetch(&args.symbol, &args.function, args.limit).await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_args_defaults_to_quote() {
        let args = parse_args(&json!({"symbol": " aapl "})).unwrap();
        assert_eq!(args.symbol, "AAPL");
        assert_eq!(args.function, "GLOBAL_QUOTE");
        assert_eq!(args.limit, None);
    }

    #[test]
    fn test_parse_args_missing_symbol_is_invalid() {
        let err = parse_args(&json!({"function": "OVERVIEW"})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn test_format_quote() {
        let data = json!({
            "Global Quote": {
                "05. price": "195.42",
                "09. change": "1.23",
                "10. change percent": "0.63%",
                "07. latest trading day": "2026-08-28"
            }
        });
        let text = format_quote("AAPL", &data);
        assert!(text.contains("Price: 195.42"));
        assert!(text.contains("Change: 1.23 (0.63%)"));
        assert!(text.contains("Open: N/A"));
    }

    #[test]
    fn test_format_quote_empty_payload() {
        let text = format_quote("ZZZZ", &json!({"Global Quote": {}}));
        assert_eq!(text, "No quote data found for 'ZZZZ'.");
    }

    #[test]
    fn test_format_daily_sorted_and_limited() {
        let data = json!({
            "Time Series (Daily)": {
                "2026-08-26": {"4. close": "101"},
                "2026-08-28": {"4. close": "103"},
                "2026-08-27": {"4. close": "102"}
            }
        });
        let text = format_daily("AAPL", &data, 2);
        assert!(text.contains("last 2 days"));
        let first_day = text.lines().nth(1).unwrap();
        assert!(first_day.starts_with("2026-08-28"));
        assert!(!text.contains("2026-08-26"));
    }

    #[test]
    fn test_format_daily_missing_series() {
        let text = format_daily("AAPL", &json!({}), 30);
        assert!(text.contains("No daily price data"));
    }

    #[test]
    fn test_format_overview_truncates_description() {
        let data = json!({
            "Name": "Apple Inc",
            "Description": "a".repeat(500),
        });
        let text = format_overview("AAPL", &data);
        assert!(text.contains("Name: Apple Inc"));
        assert!(text.contains("..."));
        assert!(!text.contains(&"a".repeat(500)));
    }
}
