//! Post-run statistics over emitted price records.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::ledger::PriceBounds;
use crate::types::{Price, PriceRecord, StrategyKind, UnitId};

/// Streaming count, mean and spread of one strategy's prices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceStats {
    pub count: u64,
    pub mean: f64,
    pub min: Price,
    pub max: Price,
    /// Sum of squared deviations from the running mean.
    m2: f64,
    /// Prices outside `[base * 0.5, base * 2]`.
    pub bound_violations: u64,
}

impl Default for PriceStats {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            m2: 0.0,
            bound_violations: 0,
        }
    }
}

impl PriceStats {
    fn push(&mut self, price: Price, bounds: PriceBounds) {
        self.count += 1;
        let delta = price - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (price - self.mean);
        self.min = self.min.min(price);
        self.max = self.max.max(price);
        if !bounds.contains(price) {
            self.bound_violations += 1;
        }
    }

    /// Sample standard deviation; 0 with fewer than two prices.
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnitSummary {
    pub records: u64,
    occupancy_sum: f64,
    price_sums: BTreeMap<StrategyKind, (f64, u64)>,
}

impl UnitSummary {
    pub fn mean_occupancy(&self) -> f64 {
        if self.records == 0 {
            0.0
        } else {
            self.occupancy_sum / self.records as f64
        }
    }

    pub fn mean_price(&self, kind: StrategyKind) -> Option<Price> {
        self.price_sums
            .get(&kind)
            .filter(|(_, n)| *n > 0)
            .map(|(sum, n)| sum / *n as f64)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    bounds: PriceBounds,
    records: u64,
    strategies: BTreeMap<StrategyKind, PriceStats>,
    units: BTreeMap<UnitId, UnitSummary>,
    first_timestamp: Option<String>,
    last_timestamp: Option<String>,
}

impl RunSummary {
    pub fn new(bounds: PriceBounds) -> Self {
        Self {
            bounds,
            records: 0,
            strategies: BTreeMap::new(),
            units: BTreeMap::new(),
            first_timestamp: None,
            last_timestamp: None,
        }
    }

    pub fn from_records(records: &[PriceRecord], bounds: PriceBounds) -> Self {
        let mut summary = Self::new(bounds);
        for record in records {
            summary.observe(record);
        }
        summary
    }

    pub fn observe(&mut self, record: &PriceRecord) {
        self.records += 1;
        if self.first_timestamp.is_none() {
            self.first_timestamp = Some(record.timestamp.clone());
        }
        self.last_timestamp = Some(record.timestamp.clone());

        let unit = self.units.entry(record.unit_id).or_default();
        unit.records += 1;
        unit.occupancy_sum += record.occupancy_rate;

        for kind in StrategyKind::ALL {
            let Some(price) = record.price(kind) else {
                continue;
            };
            self.strategies
                .entry(kind)
                .or_default()
                .push(price, self.bounds);
            let (sum, n) = unit.price_sums.entry(kind).or_insert((0.0, 0));
            *sum += price;
            *n += 1;
        }
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn bounds(&self) -> PriceBounds {
        self.bounds
    }

    pub fn stats(&self, kind: StrategyKind) -> Option<&PriceStats> {
        self.strategies.get(&kind)
    }

    pub fn strategies(&self) -> impl Iterator<Item = (StrategyKind, &PriceStats)> {
        self.strategies.iter().map(|(k, s)| (*k, s))
    }

    pub fn units(&self) -> impl Iterator<Item = (UnitId, &UnitSummary)> {
        self.units.iter().map(|(id, u)| (*id, u))
    }

    pub fn unit(&self, id: UnitId) -> Option<&UnitSummary> {
        self.units.get(&id)
    }

    pub fn distinct_units(&self) -> usize {
        self.units.len()
    }

    pub fn first_timestamp(&self) -> Option<&str> {
        self.first_timestamp.as_deref()
    }

    pub fn last_timestamp(&self) -> Option<&str> {
        self.last_timestamp.as_deref()
    }

    /// True when no strategy ever emitted an out-of-bounds price.
    pub fn within_bounds(&self) -> bool {
        self.strategies.values().all(|s| s.bound_violations == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priced(ts: &str, unit: u32, rate: f64, baseline: f64, demand: Option<f64>) -> PriceRecord {
        PriceRecord {
            timestamp: ts.to_string(),
            unit_id: UnitId::new(unit),
            occupancy_rate: rate,
            queue_length: 0,
            traffic_level: 1,
            is_special_day: false,
            baseline_price: Some(baseline),
            demand_price: demand,
            competitive_price: None,
        }
    }

    #[test]
    fn test_stats_match_direct_computation() {
        let records = vec![
            priced("t00000", 0, 0.2, 10.0, Some(12.0)),
            priced("t00000", 1, 0.6, 12.0, None),
            priced("t00001", 0, 0.4, 14.0, Some(16.0)),
        ];
        let summary = RunSummary::from_records(&records, PriceBounds::for_base(10.0));

        let baseline = summary.stats(StrategyKind::Baseline).unwrap();
        assert_eq!(baseline.count, 3);
        assert!((baseline.mean - 12.0).abs() < 1e-12);
        assert!((baseline.std_dev() - 2.0).abs() < 1e-12);
        assert_eq!(baseline.min, 10.0);
        assert_eq!(baseline.max, 14.0);

        assert_eq!(summary.stats(StrategyKind::Demand).unwrap().count, 2);
        assert!(summary.stats(StrategyKind::Competitive).is_none());

        let unit0 = summary.unit(UnitId::new(0)).unwrap();
        assert!((unit0.mean_occupancy() - 0.3).abs() < 1e-12);
        assert_eq!(unit0.mean_price(StrategyKind::Demand), Some(14.0));
        assert_eq!(
            summary.unit(UnitId::new(1)).unwrap().mean_price(StrategyKind::Demand),
            None
        );

        assert_eq!(summary.distinct_units(), 2);
        assert_eq!(summary.first_timestamp(), Some("t00000"));
        assert_eq!(summary.last_timestamp(), Some("t00001"));
        assert!(summary.within_bounds());
    }

    #[test]
    fn test_single_price_has_zero_spread() {
        let summary = RunSummary::from_records(
            &[priced("a", 0, 0.5, 11.0, None)],
            PriceBounds::for_base(10.0),
        );
        assert_eq!(summary.stats(StrategyKind::Baseline).unwrap().std_dev(), 0.0);
    }

    #[test]
    fn test_out_of_bounds_counted() {
        let mut summary = RunSummary::new(PriceBounds::for_base(10.0));
        summary.observe(&priced("a", 0, 0.5, 25.0, Some(4.0)));
        summary.observe(&priced("b", 0, 0.5, 15.0, Some(6.0)));

        assert_eq!(summary.stats(StrategyKind::Baseline).unwrap().bound_violations, 1);
        assert_eq!(summary.stats(StrategyKind::Demand).unwrap().bound_violations, 1);
        assert!(!summary.within_bounds());
    }
}
