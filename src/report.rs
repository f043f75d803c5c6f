use anyhow::Result;
use chrono::Local;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::{AggregateRecord, DividendRecord};

/// Raw per-record outputs live under this directory.
const DIVIDEND_DIR: &str = "dividend_yield";

/// Paths of everything a run persisted.
#[derive(Debug)]
pub struct ReportFiles {
    pub raw_text: PathBuf,
    pub raw_csv: PathBuf,
    pub aggregate_csv: PathBuf,
    pub missing_csv: Option<PathBuf>,
    pub snapshot_csv: PathBuf,
}

/// Persist raw records, aggregates, unresolved symbols, and a timestamped
/// snapshot of the aggregate CSV under `base_dir`.
pub fn write_reports(
    base_dir: &Path,
    records: &[DividendRecord],
    aggregates: &[AggregateRecord],
    unresolved: &[String],
) -> Result<ReportFiles> {
    let dividend_dir = base_dir.join(DIVIDEND_DIR);
    fs::create_dir_all(&dividend_dir)?;

    let raw_text = dividend_dir.join("dividend.txt");
    write_raw_text(&raw_text, records)?;

    let raw_csv = dividend_dir.join("dividend_yield_data.csv");
    write_raw_csv(&raw_csv, records)?;
    info!("Data written to {}", raw_csv.display());

    let aggregate_csv = base_dir.join("summed_dividend_yield.csv");
    write_aggregate_csv(&aggregate_csv, aggregates)?;

    let missing_csv = if unresolved.is_empty() {
        None
    } else {
        let path = dividend_dir.join("missing_symbols.csv");
        write_missing_csv(&path, unresolved)?;
        info!("Missing symbols saved to {}", path.display());
        Some(path)
    };

    // Timestamped snapshot of the aggregates, named to the minute.
    let snapshot_dir = base_dir.join("result").join(DIVIDEND_DIR);
    fs::create_dir_all(&snapshot_dir)?;
    let stamp = Local::now().format("date-%Y-%m-%d-time-%H-%M");
    let snapshot_csv = snapshot_dir.join(format!("{stamp}.csv"));
    write_aggregate_csv(&snapshot_csv, aggregates)?;
    info!("New summarized dividend data saved at {}", snapshot_csv.display());

    Ok(ReportFiles {
        raw_text,
        raw_csv,
        aggregate_csv,
        missing_csv,
        snapshot_csv,
    })
}

fn write_raw_text(path: &Path, records: &[DividendRecord]) -> Result<()> {
    let mut file = File::create(path)?;
    for record in records {
        writeln!(file, "{record:?}")?;
    }
    Ok(())
}

fn write_raw_csv(path: &Path, records: &[DividendRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["symbol", "dividend", "ratio", "xdate", "dividendType"])?;

    for record in records {
        let dividend = record.amount.to_string();
        let xdate = record.ex_date.format("%Y-%m-%d").to_string();
        writer.write_record([
            record.symbol.as_str(),
            dividend.as_str(),
            record.ratio.as_str(),
            xdate.as_str(),
            record.dividend_type.as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn write_aggregate_csv(path: &Path, aggregates: &[AggregateRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["symbol", "year", "dividend", "remark"])?;

    for aggregate in aggregates {
        let year = aggregate.year.to_string();
        let dividend = aggregate.dividend.to_string();
        writer.write_record([
            aggregate.symbol.as_str(),
            year.as_str(),
            dividend.as_str(),
            aggregate.remark.as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn write_missing_csv(path: &Path, unresolved: &[String]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Missing Symbols"])?;
    for symbol in unresolved {
        writer.write_record([symbol.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}
