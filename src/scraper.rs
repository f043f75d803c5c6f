use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::CollectorError;
use crate::models::{normalize_symbol, Config, DividendRecord, NOT_APPLICABLE};

/// Marker the exchange uses for ex-dividend corporate actions.
const XD_MARKER: &str = "XD";

/// The exchange site rejects non-browser user agents.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Fallback retrieval seam: the raw JSON corporate-action payloads one visit
/// to a symbol's rights-benefits page yields.
#[async_trait]
pub trait CorporateActionSource {
    async fn fetch_corporate_actions(&self, symbol: &str)
        -> Result<Vec<Value>, CollectorError>;
}

/// One scrape session per worker: the cookie jar built up by the page visit
/// is what lets the corporate-action endpoint answer. Dropping the session
/// releases it.
pub struct ScrapeSession {
    client: Client,
    base_url: String,
}

impl ScrapeSession {
    pub fn new(config: &Config) -> Result<Self, CollectorError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .cookie_store(true)
            .gzip(true)
            .user_agent(BROWSER_USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.set_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CorporateActionSource for ScrapeSession {
    async fn fetch_corporate_actions(
        &self,
        symbol: &str,
    ) -> Result<Vec<Value>, CollectorError> {
        // The page visit seeds session cookies; its own status is irrelevant.
        let page_url = format!(
            "{}/en/market/product/stock/quote/{}/rights-benefits",
            self.base_url, symbol
        );
        debug!("Visiting {}", page_url);
        self.client.get(&page_url).send().await?;

        let action_url = format!(
            "{}/api/set/stock/{}/corporate-action?lang=en",
            self.base_url, symbol
        );
        let response = self
            .client
            .get(&action_url)
            .send()
            .await?
            .error_for_status()?;
        let payload: Value = response.json().await?;

        // The endpoint answers with either one action object or a list.
        Ok(match payload {
            Value::Array(actions) => actions,
            other => vec![other],
        })
    }
}

/// Reduce one visit's payloads to at most one record: the first payload
/// typed as ex-dividend is consumed, the rest of the visit is ignored.
pub fn record_from_actions(symbol: &str, actions: &[Value]) -> Option<DividendRecord> {
    let action = actions.iter().find(|action| {
        action
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|kind| kind.contains(XD_MARKER))
    })?;

    record_from_action(symbol, action)
}

/// Adapter for the scraped corporate-action shape.
fn record_from_action(symbol: &str, action: &Value) -> Option<DividendRecord> {
    let Some(amount) = decimal_field(action.get("dividend")) else {
        warn!("Dropping corporate action for {symbol}: dividend is not numeric");
        return None;
    };

    let Some(ex_date) = date_field(action.get("xdate")) else {
        warn!("Dropping corporate action for {symbol}: xdate missing or unparseable");
        return None;
    };

    Some(DividendRecord {
        symbol: normalize_symbol(symbol),
        amount,
        ex_date,
        dividend_type: string_field(action, "dividendType"),
        ratio: string_field(action, "ratio"),
    })
}

fn decimal_field(value: Option<&Value>) -> Option<Decimal> {
    match value {
        Some(Value::Number(n)) => n.to_string().parse().ok(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn date_field(value: Option<&Value>) -> Option<NaiveDate> {
    let raw = value.and_then(Value::as_str)?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            // some endpoints stamp the ex-date with a full offset datetime
            DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive())
        })
}

fn string_field(action: &Value, key: &str) -> String {
    match action.get(key) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => NOT_APPLICABLE.to_string(),
    }
}
