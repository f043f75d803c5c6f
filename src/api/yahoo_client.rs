use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::{ApiRateLimiter, DividendHistoryProvider};
use crate::error::CollectorError;
use crate::models::Config;

/// Yahoo Finance chart-API client. Each worker owns its own instance.
pub struct YahooClient {
    client: Client,
    base_url: String,
    rate_limiter: ApiRateLimiter,
}

impl YahooClient {
    pub fn new(config: &Config) -> Result<Self, CollectorError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("set-dividends/0.1")
            .build()?;

        Ok(Self {
            client,
            base_url: config.yahoo_base_url.trim_end_matches('/').to_string(),
            rate_limiter: ApiRateLimiter::new(config.rate_limit_per_minute),
        })
    }

    fn chart_url(&self, symbol: &str) -> Result<Url, CollectorError> {
        let mut url = Url::parse(&format!("{}/v8/finance/chart/{}", self.base_url, symbol))?;
        url.query_pairs_mut().extend_pairs([
            ("range", "max"),
            ("interval", "1mo"),
            ("events", "div"),
        ]);
        Ok(url)
    }

    async fn make_request(&self, url: Url) -> Result<Value, CollectorError> {
        self.rate_limiter.wait().await;

        debug!("Making request to: {}", url);

        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl DividendHistoryProvider for YahooClient {
    /// Get the full dividend history for a symbol
    async fn get_dividend_history(
        &self,
        symbol: &str,
    ) -> Result<Vec<(NaiveDate, Decimal)>, CollectorError> {
        let url = self.chart_url(symbol)?;
        let payload = self.make_request(url).await?;
        let payments = parse_dividend_history(&payload)?;

        debug!("Retrieved {} dividend payments for {}", payments.len(), symbol);
        Ok(payments)
    }
}

/// Pull `(ex-date, amount)` pairs out of a chart payload.
///
/// A result without a dividend-events block is an empty history; a payload
/// without a chart result at all is malformed. Individual events that fail
/// to parse are dropped, not fatal.
pub(crate) fn parse_dividend_history(
    payload: &Value,
) -> Result<Vec<(NaiveDate, Decimal)>, CollectorError> {
    let result = payload
        .pointer("/chart/result/0")
        .ok_or_else(|| CollectorError::Parse("chart result missing from payload".to_string()))?;

    let Some(dividends) = result
        .pointer("/events/dividends")
        .and_then(Value::as_object)
    else {
        return Ok(Vec::new());
    };

    let mut payments = Vec::new();
    for event in dividends.values() {
        let Some(date) = event
            .get("date")
            .and_then(Value::as_i64)
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            // timestamps are normalized to timezone-naive dates
            .map(|dt| dt.date_naive())
        else {
            warn!("Dropping dividend event without a usable date: {event}");
            continue;
        };

        let Some(amount) = decimal_field(event.get("amount")) else {
            warn!("Dropping dividend event without a numeric amount: {event}");
            continue;
        };

        payments.push((date, amount));
    }

    Ok(payments)
}

fn decimal_field(value: Option<&Value>) -> Option<Decimal> {
    match value {
        Some(Value::Number(n)) => n.to_string().parse().ok(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}
