//! Tick events captured through `ColumnLayer` and analyzed with polars.

#![cfg(feature = "instrument")]

use polars::prelude::*;
use tracing::subscriber::with_default;
use tracing_subscriber::layer::SubscriberExt;

use pricing_core::instrument::{self, ColumnLayer, TickTables, TypedColumn};
use pricing_core::{
    FeatureRecord, PricingConfig, PricingEngine, RunReport, StrategyKind, SyntheticFeed, UnitId,
    VecSink,
};

const TARGETS: [&str; 3] = ["price", "reroute", "unit_failure"];

fn capture_run(
    config: PricingConfig,
    records: Vec<FeatureRecord>,
    units: Vec<pricing_core::Unit>,
) -> (RunReport, TickTables) {
    instrument::clear();
    let subscriber = tracing_subscriber::registry().with(ColumnLayer::for_targets(TARGETS));
    let report = with_default(subscriber, || {
        let mut engine = PricingEngine::new(config).unwrap();
        engine.initialize(units);
        let mut sink = VecSink::default();
        engine.run(records.into_iter().map(Ok), &mut sink).unwrap()
    });
    (report, instrument::drain())
}

fn synthetic(units: usize, ticks: u64, seed: u64) -> (Vec<FeatureRecord>, Vec<pricing_core::Unit>) {
    let feed = SyntheticFeed::new(units, ticks, seed);
    let sites = feed.units().to_vec();
    (feed.collect(), sites)
}

#[test]
fn one_price_row_per_processed_record() {
    let (records, units) = synthetic(9, 12, 3);
    let (report, tables) = capture_run(PricingConfig::default(), records, units);

    let prices = tables.get("price").unwrap();
    assert_eq!(prices.rows as u64, report.processed);
    assert_eq!(prices.f64_values("seq").len(), prices.rows);
    for kind in StrategyKind::ALL {
        let values = prices.f64_values(&format!("{kind}_price"));
        assert_eq!(values.len(), prices.rows);
        assert!(values.iter().all(|p| (5.0..=20.0).contains(p)));
    }
    assert!(tables.get("unit_failure").is_none());
}

#[test]
fn inactive_strategy_has_no_column() {
    let (records, units) = synthetic(4, 5, 1);
    let mut config = PricingConfig::default();
    config.engine.strategies = vec![StrategyKind::Baseline];
    let (_, tables) = capture_run(config, records, units);

    let prices = tables.get("price").unwrap();
    assert!(prices.column("baseline_price").is_some());
    assert!(prices.column("competitive_price").is_none());
    assert!(tables.get("reroute").is_none());
}

#[test]
fn failures_are_logged_with_their_unit() {
    let (mut records, units) = synthetic(3, 2, 8);
    records[4].vehicle_weight = f64::NAN;
    let (report, tables) = capture_run(PricingConfig::default(), records, units);

    assert_eq!(report.failed, 1);
    let failures = tables.get("unit_failure").unwrap();
    assert_eq!(failures.rows, 1);
    assert_eq!(failures.f64_values("unit_id"), vec![1.0]);
    assert_eq!(failures.f64_values("seq"), vec![5.0]);
    match failures.column("error") {
        Some(TypedColumn::Str(v)) => {
            assert!(v[0].as_deref().unwrap_or("").contains("vehicle_weight"));
        }
        other => panic!("expected error strings, got {other:?}"),
    }
    assert_eq!(tables.get("price").unwrap().rows, 5);
}

#[test]
fn reroute_rows_match_full_units() {
    let (mut records, units) = synthetic(9, 6, 21);
    // Centre unit always full, every neighbor empty and cheap.
    for r in records.iter_mut() {
        if r.unit_id == UnitId::new(4) {
            r.occupancy = r.capacity;
            r.occupancy_rate = 1.0;
        } else {
            r.occupancy = 0;
            r.occupancy_rate = 0.0;
            r.queue_length = 0;
        }
    }
    let (_, tables) = capture_run(PricingConfig::default(), records, units);

    let reroutes = tables.get("reroute").unwrap();
    assert!(reroutes.rows > 0);
    assert!(reroutes.f64_values("unit_id").iter().all(|&u| u == 4.0));
    assert!(reroutes.f64_values("candidate_id").iter().all(|&c| c != 4.0));
    assert!(reroutes.f64_values("distance_km").iter().all(|&d| d <= 0.555 + 1e-9));
}

#[test]
fn per_unit_means_agree_with_summary() {
    let (records, units) = synthetic(6, 20, 77);
    let (report, tables) = capture_run(PricingConfig::default(), records, units);

    let frames = tables.to_dataframes();
    let df = frames["price"].clone();
    assert_eq!(df.height() as u64, report.processed);

    let means = df
        .lazy()
        .group_by([col("unit_id")])
        .agg([col("demand_price").mean().alias("mean_demand")])
        .sort(["unit_id"], SortMultipleOptions::default())
        .collect()
        .unwrap();
    assert_eq!(means.height(), 6);

    let ids = means
        .column("unit_id")
        .unwrap()
        .as_materialized_series()
        .u64()
        .unwrap();
    let demand = means
        .column("mean_demand")
        .unwrap()
        .as_materialized_series()
        .f64()
        .unwrap();
    for (id, mean) in ids.into_iter().zip(demand.into_iter()) {
        let id = UnitId::new(id.unwrap() as u32);
        let expected = report
            .summary
            .unit(id)
            .unwrap()
            .mean_price(StrategyKind::Demand)
            .unwrap();
        assert!((mean.unwrap() - expected).abs() < 1e-9);
    }
}
