use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tracing::info;

use crate::error::CollectorError;
use crate::models::Config;

/// Read-only handle on the relational symbol store.
pub struct SymbolStore {
    pool: MySqlPool,
}

impl SymbolStore {
    /// Connect at startup. An unreachable store is fatal to the run: there
    /// is no symbol universe to process without it.
    pub async fn connect(config: &Config) -> Result<Self, CollectorError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .connect(&config.database_url())
            .await?;

        info!("Connected to symbol database at {}", config.db_host);
        Ok(Self { pool })
    }

    /// The symbol universe for this run, as stored (no market suffix yet).
    pub async fn fetch_symbols(&self) -> Result<Vec<String>, CollectorError> {
        let symbols: Vec<String> = sqlx::query_scalar("SELECT name FROM stocks")
            .fetch_all(&self.pool)
            .await?;

        info!("Fetched {} symbols from the stocks table", symbols.len());
        Ok(symbols)
    }
}
