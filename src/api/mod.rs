use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::time::Duration;

use crate::error::CollectorError;

pub mod yahoo_client;
pub use yahoo_client::YahooClient;

/// Simple rate limiter for API requests
pub struct ApiRateLimiter {
    delay_ms: u64,
}

impl ApiRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let delay_ms = if requests_per_minute > 0 {
            60_000 / requests_per_minute as u64
        } else {
            1000 // Default 1 second delay
        };

        Self { delay_ms }
    }

    pub async fn wait(&self) {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
    }
}

/// Primary data-provider seam: the full dividend history for one symbol.
///
/// An empty series means "no data", never an error; errors are reserved for
/// transport and payload failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DividendHistoryProvider {
    async fn get_dividend_history(
        &self,
        symbol: &str,
    ) -> Result<Vec<(NaiveDate, Decimal)>, CollectorError>;
}
