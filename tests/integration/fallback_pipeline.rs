//! End-to-end pipeline tests against mocked HTTP sources.

use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::fixtures::{chart_payload, corporate_action, test_config};
use crate::common::logging::{init_test_logging, log_test_step};
use set_dividends::aggregator::aggregate;
use set_dividends::concurrent_fetcher::{self, SymbolState};
use set_dividends::report::write_reports;

// Midnight-UTC timestamps used by the chart mocks.
const TS_2024_05_10: i64 = 1715299200;
const TS_2024_08_15: i64 = 1723680000;
const TS_2022_03_01: i64 = 1646092800;
const TS_2022_09_01: i64 = 1661990400;
const TS_2021_06_01: i64 = 1622505600;

async fn mount_chart(server: &MockServer, symbol: &str, events: &[(i64, f64)]) {
    Mock::given(method("GET"))
        .and(path(format!("/v8/finance/chart/{symbol}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart_payload(symbol, events)))
        .mount(server)
        .await;
}

async fn mount_rights_page(server: &MockServer, symbol: &str) {
    Mock::given(method("GET"))
        .and(path(format!(
            "/en/market/product/stock/quote/{symbol}/rights-benefits"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_primary_and_fallback_reconcile_into_one_schema() {
    init_test_logging();
    log_test_step("PTT resolves on the primary pass, AOT escalates to scraping");

    let server = MockServer::start().await;

    mount_chart(
        &server,
        "PTT.BK",
        &[(TS_2024_05_10, 1.20), (TS_2024_08_15, 0.80)],
    )
    .await;

    // AOT has no primary data: expect the initial attempt plus one retry.
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/AOT.BK"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart_payload("AOT.BK", &[])))
        .expect(2)
        .mount(&server)
        .await;

    mount_rights_page(&server, "AOT").await;

    // Two intercepted actions; only the second passes the XD filter.
    Mock::given(method("GET"))
        .and(path("/api/set/stock/AOT/corporate-action"))
        .and(query_param("lang", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            corporate_action("XR", "9.99", "2024-01-05"),
            corporate_action("XD", "2.50", "2024-04-01"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let out_dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), out_dir.path());
    let symbols = vec!["PTT.BK".to_string(), "AOT.BK".to_string()];

    let outcome = concurrent_fetcher::run(symbols, &config).await.unwrap();

    // Primary pass kept PTT and escalated AOT.
    assert_eq!(outcome.missing_after_primary, vec!["AOT.BK".to_string()]);
    assert_eq!(
        outcome.states.get("PTT.BK"),
        Some(&SymbolState::Resolved)
    );
    assert_eq!(
        outcome.states.get("AOT.BK"),
        Some(&SymbolState::Escalated)
    );

    // Three records pooled across the two sources, one shared schema.
    assert_eq!(outcome.records.len(), 3);
    let aot = outcome
        .records
        .iter()
        .find(|r| r.symbol == "AOT")
        .unwrap();
    assert_eq!(aot.amount, dec!(2.50));
    assert_eq!(aot.ratio, "N/A");

    let mut aggregates = aggregate(&outcome.records);
    aggregates.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    assert_eq!(aggregates.len(), 2);
    assert_eq!(aggregates[0].symbol, "AOT");
    assert_eq!(aggregates[0].year, 2024);
    assert_eq!(aggregates[0].dividend, dec!(2.50));
    assert_eq!(aggregates[1].symbol, "PTT");
    assert_eq!(aggregates[1].dividend, dec!(2.00));

    // AOT was recovered by the fallback, so nothing is unresolved and no
    // missing-symbols file is written.
    let unresolved = outcome.unresolved_symbols();
    assert!(unresolved.is_empty());

    let files = write_reports(out_dir.path(), &outcome.records, &aggregates, &unresolved).unwrap();
    assert!(files.missing_csv.is_none());
    assert!(files.raw_csv.exists());
    assert!(files.snapshot_csv.exists());
}

#[tokio::test]
async fn test_latest_year_with_data_is_not_current_year() {
    init_test_logging();
    log_test_step("A symbol whose history stops in 2022 yields 2022 records");

    let server = MockServer::start().await;
    mount_chart(
        &server,
        "EGCO.BK",
        &[
            (TS_2022_03_01, 3.25),
            (TS_2022_09_01, 3.25),
            (TS_2021_06_01, 3.00),
        ],
    )
    .await;

    let out_dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), out_dir.path());

    let outcome = concurrent_fetcher::run(vec!["EGCO.BK".to_string()], &config)
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 2);
    assert!(outcome
        .records
        .iter()
        .all(|record| record.ex_date.format("%Y").to_string() == "2022"));
    assert!(outcome.missing_after_primary.is_empty());

    let aggregates = aggregate(&outcome.records);
    assert_eq!(aggregates.len(), 1);
    assert_eq!(aggregates[0].year, 2022);
    assert_eq!(aggregates[0].dividend, dec!(6.50));
}

#[tokio::test]
async fn test_symbol_missing_from_both_sources_is_reported() {
    init_test_logging();
    log_test_step("A symbol both sources fail on ends up in the missing report");

    // No mounts at all: the chart endpoint 404s and so does the exchange.
    let server = MockServer::start().await;

    let out_dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), out_dir.path());

    let outcome = concurrent_fetcher::run(vec!["EARTH.BK".to_string()], &config)
        .await
        .unwrap();

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.missing_after_primary, vec!["EARTH.BK".to_string()]);
    assert_eq!(
        outcome.states.get("EARTH.BK"),
        Some(&SymbolState::Escalated)
    );

    let unresolved = outcome.unresolved_symbols();
    assert_eq!(unresolved, vec!["EARTH".to_string()]);

    let aggregates = aggregate(&outcome.records);
    let files = write_reports(out_dir.path(), &outcome.records, &aggregates, &unresolved).unwrap();
    let missing = std::fs::read_to_string(files.missing_csv.unwrap()).unwrap();
    assert_eq!(missing.lines().collect::<Vec<_>>(), vec!["Missing Symbols", "EARTH"]);
}

#[tokio::test]
async fn test_every_symbol_is_covered_or_reported() {
    init_test_logging();
    log_test_step("No symbol is silently dropped across a mixed universe");

    let server = MockServer::start().await;

    mount_chart(&server, "PTT.BK", &[(TS_2024_05_10, 1.20)]).await;
    mount_chart(&server, "TOP.BK", &[(TS_2024_08_15, 0.55)]).await;
    mount_chart(&server, "AOT.BK", &[]).await;
    mount_rights_page(&server, "AOT").await;
    Mock::given(method("GET"))
        .and(path("/api/set/stock/AOT/corporate-action"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!([corporate_action("XD", "2.50", "2024-04-01")])))
        .mount(&server)
        .await;
    // EARTH.BK: nothing mounted, fails everywhere.

    let out_dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), out_dir.path());
    let symbols: Vec<String> = ["PTT.BK", "AOT.BK", "TOP.BK", "EARTH.BK"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let outcome = concurrent_fetcher::run(symbols.clone(), &config).await.unwrap();
    let unresolved = outcome.unresolved_symbols();

    for symbol in &symbols {
        let normalized = set_dividends::models::normalize_symbol(symbol);
        let covered = outcome.records.iter().any(|r| r.symbol == normalized);
        let reported = unresolved.contains(&normalized);
        assert!(
            covered ^ reported,
            "{normalized} must be exactly one of covered/reported (covered={covered}, reported={reported})"
        );
    }
}
