//! Concurrent dividend retrieval.
//!
//! Two passes over the symbol universe: a primary pass against the
//! time-series provider, then a fallback scrape of the exchange site for
//! every symbol the primary pass left without data. The fallback pass only
//! starts once every primary worker has joined.

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use futures::future::try_join_all;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::api::{DividendHistoryProvider, YahooClient};
use crate::models::{normalize_symbol, Config, DividendRecord};
use crate::scraper::{record_from_actions, CorporateActionSource, ScrapeSession};

/// Per-symbol retrieval state machine. Primary fetching walks
/// `NotAttempted → PrimaryAttempted → PrimaryRetried` and ends in
/// `Resolved` or `Missing`; the fallback pass moves every `Missing` symbol
/// to `Escalated` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolState {
    NotAttempted,
    PrimaryAttempted,
    PrimaryRetried,
    Resolved,
    Escalated,
    Missing,
}

/// Cross-worker shared state. One lock covers the results, the missing
/// set, and the progress counter so the three always move together.
#[derive(Debug)]
pub struct SharedState {
    records: Vec<DividendRecord>,
    missing: BTreeSet<String>,
    states: BTreeMap<String, SymbolState>,
    processed: usize,
    total: usize,
}

impl SharedState {
    fn new(total: usize) -> Self {
        Self {
            records: Vec::new(),
            missing: BTreeSet::new(),
            states: BTreeMap::new(),
            processed: 0,
            total,
        }
    }

    /// Record a primary-pass outcome for one symbol and advance progress.
    /// Returns the percentage processed so far.
    fn record_primary_outcome(
        &mut self,
        symbol: &str,
        state: SymbolState,
        records: Vec<DividendRecord>,
    ) -> f64 {
        if state == SymbolState::Missing {
            self.missing.insert(symbol.to_string());
        }
        self.states.insert(symbol.to_string(), state);
        self.records.extend(records);
        self.bump_progress()
    }

    /// Record a fallback-pass outcome for one symbol and advance progress.
    fn record_fallback_outcome(&mut self, record: Option<DividendRecord>) -> f64 {
        if let Some(record) = record {
            self.records.push(record);
        }
        self.bump_progress()
    }

    /// Move every missing symbol to `Escalated` and restart the progress
    /// counter for the fallback pass.
    fn begin_fallback_pass(&mut self) {
        for symbol in &self.missing {
            self.states.insert(symbol.clone(), SymbolState::Escalated);
        }
        self.processed = 0;
        self.total = self.missing.len();
    }

    fn bump_progress(&mut self) -> f64 {
        self.processed += 1;
        if self.total == 0 {
            return 100.0;
        }
        self.processed as f64 / self.total as f64 * 100.0
    }

    fn missing_symbols(&self) -> Vec<String> {
        self.missing.iter().cloned().collect()
    }
}

/// Everything a run produced, pooled across both passes.
#[derive(Debug)]
pub struct FetchOutcome {
    pub total_symbols: usize,
    pub records: Vec<DividendRecord>,
    /// Symbols (in primary form) with no data after the primary retry.
    pub missing_after_primary: Vec<String>,
    pub states: BTreeMap<String, SymbolState>,
}

impl FetchOutcome {
    /// Symbols that produced no record from either source, in report form.
    pub fn unresolved_symbols(&self) -> Vec<String> {
        let covered: HashSet<&str> = self.records.iter().map(|r| r.symbol.as_str()).collect();
        self.missing_after_primary
            .iter()
            .map(|symbol| normalize_symbol(symbol))
            .filter(|symbol| !covered.contains(symbol.as_str()))
            .collect()
    }
}

/// Worker count for a pass: bounded by the host, the configured cap, and
/// the number of symbols to spread.
pub fn worker_count(num_symbols: usize, cap: usize) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    available.min(cap).min(num_symbols).max(1)
}

/// Split symbols into contiguous, nearly-equal chunks, at most one per
/// worker. Chunk size is clamped to at least one symbol, so a pass with
/// fewer symbols than workers simply runs fewer workers.
pub fn split_symbols(symbols: &[String], workers: usize) -> Vec<Vec<String>> {
    if symbols.is_empty() || workers == 0 {
        return Vec::new();
    }
    let chunk_size = symbols.len().div_ceil(workers).max(1);
    symbols.chunks(chunk_size).map(<[String]>::to_vec).collect()
}

/// Keep only the payments from the most recent calendar year present in
/// the history. Sparse histories resolve to their latest year with data,
/// not to the current year.
fn latest_year_payments(history: Vec<(NaiveDate, Decimal)>) -> Vec<(NaiveDate, Decimal)> {
    let Some(latest) = history.iter().map(|(date, _)| date.year()).max() else {
        return Vec::new();
    };
    history
        .into_iter()
        .filter(|(date, _)| date.year() == latest)
        .collect()
}

/// One primary attempt: fetch, narrow to the latest year, adapt. Fetch
/// errors are logged and collapse to "no data" so they never cross the
/// worker boundary.
async fn fetch_latest_year<P: DividendHistoryProvider + Sync>(
    provider: &P,
    symbol: &str,
) -> Vec<DividendRecord> {
    match provider.get_dividend_history(symbol).await {
        Ok(history) => latest_year_payments(history)
            .into_iter()
            .map(|(date, amount)| DividendRecord::from_primary(symbol, date, amount))
            .collect(),
        Err(e) => {
            warn!("Error fetching dividends for {symbol}: {e}");
            Vec::new()
        }
    }
}

/// Drive the retry state machine for one symbol against the primary
/// source. Terminal states are `Resolved` and `Missing`.
pub async fn resolve_primary<P: DividendHistoryProvider + Sync>(
    provider: &P,
    symbol: &str,
) -> (SymbolState, Vec<DividendRecord>) {
    let mut state = SymbolState::NotAttempted;
    let mut records = Vec::new();

    loop {
        state = match state {
            SymbolState::NotAttempted => {
                records = fetch_latest_year(provider, symbol).await;
                if records.is_empty() {
                    SymbolState::PrimaryAttempted
                } else {
                    SymbolState::Resolved
                }
            }
            SymbolState::PrimaryAttempted => {
                warn!("No dividend data for {symbol}, possibly delisted. Retrying...");
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
                SymbolState::PrimaryRetried
            }
            SymbolState::PrimaryRetried => {
                records = fetch_latest_year(provider, symbol).await;
                if records.is_empty() {
                    SymbolState::Missing
                } else {
                    SymbolState::Resolved
                }
            }
            terminal @ (SymbolState::Resolved | SymbolState::Missing | SymbolState::Escalated) => {
                return (terminal, records);
            }
        };
    }
}

/// Primary-pass worker: its own API client, one contiguous symbol chunk.
async fn primary_worker(
    worker_id: usize,
    chunk: Vec<String>,
    shared: Arc<Mutex<SharedState>>,
    config: Config,
) -> Result<()> {
    let provider = YahooClient::new(&config)?;
    info!("🔄 Worker {}: fetching {} symbols", worker_id, chunk.len());

    for symbol in chunk {
        let (state, records) = resolve_primary(&provider, &symbol).await;

        if state == SymbolState::Missing {
            info!("Still no data for {symbol}, adding to missing symbols.");
        }

        let progress = {
            let mut shared = shared.lock().unwrap();
            shared.record_primary_outcome(&symbol, state, records)
        };
        info!("Progress: {:.2}%", progress);
    }

    Ok(())
}

/// Fallback-pass worker: its own scrape session, released when the chunk
/// is exhausted.
async fn fallback_worker(
    worker_id: usize,
    chunk: Vec<String>,
    shared: Arc<Mutex<SharedState>>,
    config: Config,
) -> Result<()> {
    let session = ScrapeSession::new(&config)?;
    info!("🔁 Worker {}: scraping {} missing symbols", worker_id, chunk.len());

    for symbol in chunk {
        // the exchange site knows the bare symbol, not the suffixed one
        let bare = normalize_symbol(&symbol);

        let record = match session.fetch_corporate_actions(&bare).await {
            Ok(actions) => record_from_actions(&bare, &actions),
            Err(e) => {
                warn!("Error scraping symbol {bare}: {e}");
                None
            }
        };

        let progress = {
            let mut shared = shared.lock().unwrap();
            shared.record_fallback_outcome(record)
        };
        info!("Fallback progress: {:.2}%", progress);
    }

    Ok(())
}

/// Run the full two-pass pipeline over a suffixed symbol universe.
pub async fn run(symbols: Vec<String>, config: &Config) -> Result<FetchOutcome> {
    let total_symbols = symbols.len();
    let workers = worker_count(total_symbols, config.max_workers);
    info!(
        "🚀 Starting primary fetch: {} symbols across {} workers",
        total_symbols, workers
    );

    let shared = Arc::new(Mutex::new(SharedState::new(total_symbols)));

    let handles: Vec<_> = split_symbols(&symbols, workers)
        .into_iter()
        .enumerate()
        .map(|(worker_id, chunk)| {
            tokio::spawn(primary_worker(
                worker_id,
                chunk,
                Arc::clone(&shared),
                config.clone(),
            ))
        })
        .collect();

    // Full barrier: the missing set is only read once every writer joined.
    for result in try_join_all(handles).await? {
        result?;
    }

    let missing = { shared.lock().unwrap().missing_symbols() };

    if !missing.is_empty() {
        info!(
            "🔁 Starting web scraping for {} missing symbols: {:?}",
            missing.len(),
            missing
        );

        let workers = worker_count(missing.len(), config.max_workers);
        shared.lock().unwrap().begin_fallback_pass();

        let handles: Vec<_> = split_symbols(&missing, workers)
            .into_iter()
            .enumerate()
            .map(|(worker_id, chunk)| {
                tokio::spawn(fallback_worker(
                    worker_id,
                    chunk,
                    Arc::clone(&shared),
                    config.clone(),
                ))
            })
            .collect();

        for result in try_join_all(handles).await? {
            result?;
        }
    }

    let state = Arc::try_unwrap(shared)
        .map_err(|_| anyhow::anyhow!("a worker still holds the shared state"))?
        .into_inner()
        .unwrap();

    info!(
        "✅ Fetch completed: {} records, {} symbols escalated to fallback",
        state.records.len(),
        missing.len()
    );

    Ok(FetchOutcome {
        total_symbols,
        records: state.records,
        missing_after_primary: missing,
        states: state.states,
    })
}
