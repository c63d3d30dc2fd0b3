//! Property-based tests for pricing invariants
//!
//! These hold for every valid input sequence, independent of the scenario.

use proptest::prelude::*;

use pricing_core::{
    BaselineParams, BaselineStrategy, CompetitionParams, CompetitiveStrategy, DemandSignal,
    DemandStrategy, DemandWeights, EntityRegistry, FeatureRecord, Location, PriceLedger,
    PricingConfig, PricingEngine, SpatialQuery, StrategyKind, Unit, UnitId, planar_distance,
};

const BASE: f64 = 10.0;
const MIN: f64 = BASE * 0.5;
const MAX: f64 = BASE * 2.0;

// === STRATEGIES ===

fn signal() -> impl Strategy<Value = DemandSignal> {
    (0.0f64..=1.0, 0u32..60, 1i32..=10, any::<bool>(), 0.1f64..3.0).prop_map(
        |(occupancy_rate, queue_length, traffic_level, is_special_day, vehicle_weight)| {
            DemandSignal {
                occupancy_rate,
                queue_length,
                traffic_level,
                is_special_day,
                vehicle_weight,
            }
        },
    )
}

/// A record for one of `units` grid units, at its registered location.
fn record(units: u32) -> impl Strategy<Value = FeatureRecord> {
    (0..units, signal(), 1i64..50, 0.0f64..=1.2).prop_map(|(id, s, capacity, fill)| {
        let occupancy = ((capacity as f64 * fill).round() as i64).min(capacity);
        let loc = grid_location(id);
        FeatureRecord {
            timestamp: "t00000".to_string(),
            unit_id: UnitId::new(id),
            occupancy_rate: s.occupancy_rate,
            queue_length: s.queue_length,
            traffic_level: s.traffic_level,
            is_special_day: s.is_special_day,
            vehicle_weight: s.vehicle_weight,
            occupancy,
            capacity,
            latitude: loc.latitude,
            longitude: loc.longitude,
        }
    })
}

fn grid_location(id: u32) -> Location {
    Location::new(
        26.0 + (id / 4) as f64 * 0.002,
        91.0 + (id % 4) as f64 * 0.002,
    )
}

fn grid_registry(units: u32) -> EntityRegistry {
    (0..units)
        .map(|id| Unit::new(UnitId::new(id), grid_location(id), 20))
        .collect()
}

proptest! {
    #[test]
    fn every_strategy_stays_in_bounds(records in prop::collection::vec(record(8), 1..80)) {
        let mut engine = PricingEngine::new(PricingConfig::default()).unwrap();
        engine.initialize((0..8).map(|id| Unit::new(UnitId::new(id), grid_location(id), 20)));

        for r in &records {
            let outcome = engine.process(r).unwrap();
            for kind in StrategyKind::ALL {
                let price = outcome.record.price(kind).unwrap();
                prop_assert!((MIN..=MAX).contains(&price), "{kind} produced {price}");
                prop_assert_eq!(engine.current_price(kind, r.unit_id), Some(price));
            }
        }
    }

    #[test]
    fn baseline_bounded_for_any_alpha(
        alpha in -50.0f64..50.0,
        rates in prop::collection::vec(-2.0f64..2.0, 1..50),
    ) {
        let s = BaselineStrategy::new(BASE, &BaselineParams { alpha });
        let mut ledger = PriceLedger::new(BASE);
        for rate in rates {
            let p = s.update_price(&mut ledger, UnitId::new(0), rate).unwrap();
            prop_assert!((MIN..=MAX).contains(&p));
        }
    }

    #[test]
    fn history_has_seed_plus_one_entry_per_update(
        rates in prop::collection::vec(0.0f64..=1.0, 0..60),
    ) {
        let s = BaselineStrategy::new(BASE, &BaselineParams::default());
        let mut ledger = PriceLedger::new(BASE);
        let unit = UnitId::new(3);
        for &rate in &rates {
            s.update_price(&mut ledger, unit, rate).unwrap();
        }

        let history = ledger.history(unit);
        prop_assert_eq!(history.len(), rates.len() + 1);
        prop_assert_eq!(history[0], BASE);
        prop_assert_eq!(*history.last().unwrap(), ledger.current_price(unit));
    }

    #[test]
    fn demand_is_memoryless(s in signal(), start in MIN..=MAX) {
        let strategy = DemandStrategy::new(BASE, &DemandWeights::default());
        let mut ledger = PriceLedger::new(BASE);
        ledger.record(UnitId::new(1), start);
        ledger.record(UnitId::new(2), start);

        let a = strategy.update_price(&mut ledger, UnitId::new(1), &s).unwrap();
        let b = strategy.update_price(&mut ledger, UnitId::new(2), &s).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn distance_is_symmetric(
        a in (-80.0f64..80.0, -170.0f64..170.0),
        b in (-80.0f64..80.0, -170.0f64..170.0),
    ) {
        let a = Location::new(a.0, a.1);
        let b = Location::new(b.0, b.1);
        prop_assert_eq!(planar_distance(a, b), planar_distance(b, a));
    }

    #[test]
    fn neighbors_sorted_and_within_radius(
        units in 2u32..24,
        radius in 0.0f64..0.01,
        origin in 0u32..24,
    ) {
        let registry = grid_registry(units);
        let origin = UnitId::new(origin % units);
        let neighbors = registry.within_radius(origin, radius);

        prop_assert!(neighbors.iter().all(|n| n.unit_id != origin && n.distance <= radius));
        prop_assert!(neighbors.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn no_competitors_reduces_to_weighted_blend(s in signal(), current in MIN..=MAX) {
        let params = CompetitionParams::default();
        let strategy = CompetitiveStrategy::new(BASE, &params);
        // Far apart: each unit is outside the other's radius.
        let registry: EntityRegistry = [
            Unit::new(UnitId::new(0), Location::new(0.0, 0.0), 10),
            Unit::new(UnitId::new(1), Location::new(1.0, 1.0), 10),
        ]
        .into_iter()
        .collect();
        let mut ledger = PriceLedger::new(BASE);
        ledger.record(UnitId::new(0), current);

        prop_assert_eq!(
            strategy.competitive_adjustment(&ledger, &registry, UnitId::new(0), 3, 10),
            0.0
        );
        let price = strategy.quote(&ledger, &registry, UnitId::new(0), &s, 3, 10).unwrap();
        let expected = params.demand_weight * params.weights.demand_price(BASE, &s)
            + params.competition_weight * current;
        prop_assert!((price - expected.clamp(MIN, MAX)).abs() < 1e-9);
    }

    #[test]
    fn rerouting_is_capped_and_priced_within_premium(
        prices in prop::collection::vec(MIN..=MAX, 12),
        occupancy in 0i64..=12,
    ) {
        let strategy = CompetitiveStrategy::new(BASE, &CompetitionParams::default());
        let registry = grid_registry(12);
        let mut ledger = PriceLedger::new(BASE);
        for (id, &p) in prices.iter().enumerate() {
            ledger.record(UnitId::new(id as u32), p);
        }

        let unit = UnitId::new(5);
        let current = ledger.current_price(unit);
        let suggestions = strategy.suggest_rerouting(&ledger, &registry, unit, occupancy, 10);

        if occupancy < 10 {
            prop_assert!(suggestions.is_empty());
        }
        prop_assert!(suggestions.len() <= 3);
        for s in &suggestions {
            prop_assert!(s.price <= current * 1.1);
            prop_assert!(s.unit_id != unit);
        }
    }
}
