use anyhow::Result;
use std::collections::HashSet;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use set_dividends::database::SymbolStore;
use set_dividends::models::{with_market_suffix, Config};
use set_dividends::{aggregator, concurrent_fetcher, report};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter("set_dividends=info")
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    info!("🚀 Starting SET dividend yield collection");

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("❌ Configuration Error: {}", e);
            eprintln!("Make sure you have a .env file with the database credentials.");
            std::process::exit(1);
        }
    };

    // The batch cannot run without a symbol universe.
    let store = match SymbolStore::connect(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to reach the symbol database: {}", e);
            eprintln!("❌ Database Error: {}", e);
            std::process::exit(1);
        }
    };

    let names = match store.fetch_symbols().await {
        Ok(names) => names,
        Err(e) => {
            error!("Failed to read the symbol universe: {}", e);
            eprintln!("❌ Database Error: {}", e);
            std::process::exit(1);
        }
    };

    let symbols: Vec<String> = names.iter().map(|name| with_market_suffix(name)).collect();
    info!("📊 Found {} symbols to process", symbols.len());

    let outcome = concurrent_fetcher::run(symbols, &config).await?;

    let aggregates = aggregator::aggregate(&outcome.records);
    let unresolved = outcome.unresolved_symbols();
    let files = report::write_reports(&config.output_dir, &outcome.records, &aggregates, &unresolved)?;

    info!(
        "🎉 Process completed successfully. Data saved at {}",
        files.aggregate_csv.display()
    );

    if unresolved.is_empty() {
        info!("All expected symbols have data.");
    } else {
        info!("Missing symbols: {}", unresolved.join(", "));
    }

    let retrieved: HashSet<&str> = outcome.records.iter().map(|r| r.symbol.as_str()).collect();
    info!("Total expected symbols: {}", names.len());
    info!("Total retrieved symbols: {}", retrieved.len());

    Ok(())
}
