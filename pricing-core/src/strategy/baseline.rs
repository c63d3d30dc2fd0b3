use std::collections::BTreeMap;

use crate::config::BaselineParams;
use crate::error::PricingError;
use crate::ledger::{PriceBounds, PriceLedger};
use crate::spatial::SpatialQuery;
use crate::types::{FeatureRecord, ModelInfo, Price, StrategyKind, UnitId};

use super::{PricingStrategy, ensure_finite, finish_price};

/// Share of an overshoot kept after dampening.
const OVERSHOOT_RETAINED: f64 = 0.1;

/// `Price(t+1) = Price(t) + alpha * occupancy_rate`, with soft then hard bounds.
#[derive(Debug, Clone)]
pub struct BaselineStrategy {
    base_price: Price,
    alpha: f64,
    bounds: PriceBounds,
}

impl BaselineStrategy {
    pub fn new(base_price: Price, params: &BaselineParams) -> Self {
        Self {
            base_price,
            alpha: params.alpha,
            bounds: PriceBounds::for_base(base_price),
        }
    }

    /// Next price from the current one.
    ///
    /// Below the floor the overshoot is cut to 10% (then clamped). Above the
    /// ceiling the price is reflected back inside by 10% of the overshoot, so
    /// an occupied unit does not sit exactly on the ceiling tick after tick.
    pub fn next_price(&self, current: Price, occupancy_rate: f64) -> Price {
        let PriceBounds { min, max } = self.bounds;
        let mut price = current + self.alpha * occupancy_rate;

        if price < min {
            price = min + (price - min) * OVERSHOOT_RETAINED;
        } else if price > max {
            price = max - (price - max) * OVERSHOOT_RETAINED;
        }

        self.bounds.clamp(price)
    }

    pub fn quote(
        &self,
        ledger: &PriceLedger,
        unit: UnitId,
        occupancy_rate: f64,
    ) -> Result<Price, PricingError> {
        let occupancy_rate = ensure_finite(unit, "occupancy_rate", occupancy_rate)?;
        let price = self.next_price(ledger.current_price(unit), occupancy_rate);
        finish_price(unit, StrategyKind::Baseline, self.bounds, price)
    }

    pub fn update_price(
        &self,
        ledger: &mut PriceLedger,
        unit: UnitId,
        occupancy_rate: f64,
    ) -> Result<Price, PricingError> {
        let price = self.quote(ledger, unit, occupancy_rate)?;
        Ok(ledger.record(unit, price))
    }
}

impl PricingStrategy for BaselineStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Baseline
    }

    fn bounds(&self) -> PriceBounds {
        self.bounds
    }

    fn propose(
        &self,
        ledger: &PriceLedger,
        _spatial: &dyn SpatialQuery,
        record: &FeatureRecord,
    ) -> Result<Price, PricingError> {
        self.quote(ledger, record.unit_id, record.occupancy_rate)
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            model_name: "Baseline Linear Model".to_string(),
            base_price: self.base_price,
            description: "Simple linear price adjustment based on occupancy rate".to_string(),
            parameters: BTreeMap::from([("alpha".to_string(), self.alpha)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> BaselineStrategy {
        BaselineStrategy::new(10.0, &BaselineParams::default())
    }

    #[test]
    fn test_unseen_unit_first_update() {
        let s = strategy();
        let mut ledger = PriceLedger::new(10.0);
        let unit = UnitId::new(0);

        let price = s.update_price(&mut ledger, unit, 0.8).unwrap();

        assert!((price - 10.4).abs() < 1e-12);
        assert_eq!(ledger.history(unit).len(), 2);
        assert_eq!(ledger.history(unit)[0], 10.0);
    }

    #[test]
    fn test_ceiling_overshoot_reflects_inside() {
        let s = strategy();
        // 19.9 + 0.5 = 20.4 -> 20 - 0.04
        let price = s.next_price(19.9, 1.0);
        assert!((price - 19.96).abs() < 1e-9);
        assert!(price < 20.0);
    }

    #[test]
    fn test_extreme_overshoot_hard_clamped() {
        let s = BaselineStrategy::new(10.0, &BaselineParams { alpha: 500.0 });
        assert_eq!(s.next_price(10.0, 1.0), 5.0);
        assert_eq!(s.next_price(10.0, -1.0), 5.0);
    }

    #[test]
    fn test_floor_undershoot_clamped() {
        let s = strategy();
        // 5.1 - 0.5 = 4.6 -> 4.96 -> clamped to 5
        assert_eq!(s.next_price(5.1, -1.0), 5.0);
    }

    #[test]
    fn test_repeated_full_occupancy_stays_in_bounds() {
        let s = strategy();
        let mut ledger = PriceLedger::new(10.0);
        let unit = UnitId::new(1);
        for _ in 0..100 {
            let p = s.update_price(&mut ledger, unit, 1.0).unwrap();
            assert!((5.0..=20.0).contains(&p));
        }
        assert_eq!(ledger.history(unit).len(), 101);
    }

    #[test]
    fn test_non_finite_rate_leaves_ledger_untouched() {
        let s = strategy();
        let mut ledger = PriceLedger::new(10.0);
        let unit = UnitId::new(2);

        assert!(s.update_price(&mut ledger, unit, f64::INFINITY).is_err());
        assert!(!ledger.contains(unit));
    }

    #[test]
    fn test_info_is_stable() {
        let s = strategy();
        let info = s.info();
        assert_eq!(info, s.info());
        assert_eq!(info.parameters["alpha"], 0.5);
        assert_eq!(info.base_price, 10.0);
    }
}
