use std::collections::BTreeMap;

use crate::config::{DemandWeights, QUEUE_SATURATION};
use crate::error::PricingError;
use crate::ledger::{PriceBounds, PriceLedger};
use crate::spatial::SpatialQuery;
use crate::types::{FeatureRecord, ModelInfo, Price, StrategyKind, UnitId};

use super::{PricingStrategy, ensure_finite, finish_price};

// === DEMAND SIGNAL ===

/// The demand-relevant slice of a feature record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandSignal {
    pub occupancy_rate: f64,
    pub queue_length: u32,
    pub traffic_level: i32,
    pub is_special_day: bool,
    pub vehicle_weight: f64,
}

impl From<&FeatureRecord> for DemandSignal {
    fn from(record: &FeatureRecord) -> Self {
        Self {
            occupancy_rate: record.occupancy_rate,
            queue_length: record.queue_length,
            traffic_level: record.traffic_level,
            is_special_day: record.is_special_day,
            vehicle_weight: record.vehicle_weight,
        }
    }
}

impl DemandSignal {
    pub(crate) fn check(&self, unit: UnitId) -> Result<(), PricingError> {
        ensure_finite(unit, "occupancy_rate", self.occupancy_rate)?;
        ensure_finite(unit, "vehicle_weight", self.vehicle_weight)?;
        Ok(())
    }
}

// === DEMAND FUNCTION ===

impl DemandWeights {
    /// Unbounded weighted score. Traffic counts against demand.
    pub fn raw_demand(&self, s: &DemandSignal) -> f64 {
        let normalized_queue = (s.queue_length as f64 / QUEUE_SATURATION).min(1.0);
        let normalized_traffic = (s.traffic_level as f64 - 1.0) / 9.0;
        let special = if s.is_special_day { 1.0 } else { 0.0 };

        self.alpha * s.occupancy_rate + self.beta * normalized_queue
            - self.gamma * normalized_traffic
            + self.delta * special
            + self.epsilon * s.vehicle_weight
    }

    /// Score squashed into (-1, 1).
    pub fn normalized_demand(&self, s: &DemandSignal) -> f64 {
        self.raw_demand(s).tanh()
    }

    /// Unclamped `base * (1 + lambda * tanh(demand))`.
    pub fn demand_price(&self, base_price: Price, s: &DemandSignal) -> Price {
        base_price * (1.0 + self.lambda * self.normalized_demand(s))
    }

    pub(crate) fn parameters(&self) -> BTreeMap<String, f64> {
        self.values()
            .into_iter()
            .map(|(name, v)| (name.to_string(), v))
            .collect()
    }
}

// === STRATEGY ===

/// Memoryless: the new price depends only on the signal, never on the previous price.
#[derive(Debug, Clone)]
pub struct DemandStrategy {
    base_price: Price,
    weights: DemandWeights,
    bounds: PriceBounds,
}

impl DemandStrategy {
    pub fn new(base_price: Price, weights: &DemandWeights) -> Self {
        Self {
            base_price,
            weights: weights.clone(),
            bounds: PriceBounds::for_base(base_price),
        }
    }

    pub fn weights(&self) -> &DemandWeights {
        &self.weights
    }

    pub fn quote(&self, unit: UnitId, signal: &DemandSignal) -> Result<Price, PricingError> {
        signal.check(unit)?;
        let price = self.weights.demand_price(self.base_price, signal);
        finish_price(unit, StrategyKind::Demand, self.bounds, price)
    }

    pub fn update_price(
        &self,
        ledger: &mut PriceLedger,
        unit: UnitId,
        signal: &DemandSignal,
    ) -> Result<Price, PricingError> {
        let price = self.quote(unit, signal)?;
        Ok(ledger.record(unit, price))
    }
}

impl PricingStrategy for DemandStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Demand
    }

    fn bounds(&self) -> PriceBounds {
        self.bounds
    }

    fn propose(
        &self,
        _ledger: &PriceLedger,
        _spatial: &dyn SpatialQuery,
        record: &FeatureRecord,
    ) -> Result<Price, PricingError> {
        self.quote(record.unit_id, &DemandSignal::from(record))
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            model_name: "Demand-Based Price Function".to_string(),
            base_price: self.base_price,
            description: "Advanced pricing using multiple demand factors".to_string(),
            parameters: self.weights.parameters(),
        }
    }
}
