//! Cross-module properties of the partitioner and the aggregator.

use pretty_assertions::assert_eq;
use test_log::test;

use crate::common::fixtures::primary_record;
use set_dividends::aggregator::aggregate;
use set_dividends::concurrent_fetcher::split_symbols;

fn universe(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("SYM{i:03}.BK")).collect()
}

#[test]
fn test_partitioning_never_drops_or_duplicates() {
    for count in [0, 1, 2, 3, 4, 5, 7, 8, 13, 100] {
        for workers in 1..=4 {
            let symbols = universe(count);
            let chunks = split_symbols(&symbols, workers);

            assert!(
                chunks.len() <= workers,
                "{count} symbols over {workers} workers produced {} chunks",
                chunks.len()
            );
            let flattened: Vec<String> = chunks.into_iter().flatten().collect();
            assert_eq!(flattened, symbols, "count={count} workers={workers}");
        }
    }
}

#[test]
fn test_partitioning_chunks_are_nearly_equal() {
    let symbols = universe(10);
    let chunks = split_symbols(&symbols, 4);

    let max = chunks.iter().map(Vec::len).max().unwrap();
    let min = chunks.iter().map(Vec::len).min().unwrap();
    assert!(max - min <= chunks[0].len(), "chunks diverge too far: {chunks:?}");
    assert!(chunks.iter().all(|chunk| !chunk.is_empty()));
}

#[test]
fn test_single_symbol_with_full_worker_pool() {
    // The degenerate fallback case: one missing symbol, four workers.
    let symbols = universe(1);
    let chunks = split_symbols(&symbols, 4);

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0], symbols);
}

#[test]
fn test_aggregation_invariant_under_permutation() {
    let records = vec![
        primary_record("PTT", 2024, 5, 10, "1.20"),
        primary_record("PTT", 2024, 8, 15, "0.80"),
        primary_record("AOT", 2024, 4, 1, "2.50"),
        primary_record("AOT", 2023, 4, 2, "1.75"),
        primary_record("TOP", 2024, 6, 30, "0.55"),
    ];

    let baseline = aggregate(&records);

    // a few deterministic permutations
    let mut rotated = records.clone();
    rotated.rotate_left(2);
    assert_eq!(aggregate(&rotated), baseline);

    let mut reversed = records.clone();
    reversed.reverse();
    assert_eq!(aggregate(&reversed), baseline);

    let mut swapped = records;
    swapped.swap(0, 4);
    assert_eq!(aggregate(&swapped), baseline);
}

#[test]
fn test_reconciler_runs_are_identical() {
    let records = vec![
        primary_record("PTT", 2024, 5, 10, "1.20"),
        primary_record("PTT", 2024, 8, 15, "0.80"),
    ];

    let first = aggregate(&records);
    let second = aggregate(&records);
    assert_eq!(first, second);
}
