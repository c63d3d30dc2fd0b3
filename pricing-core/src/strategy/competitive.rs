use std::collections::BTreeMap;

use crate::config::{
    CompetitionParams, DemandWeights, KM_PER_DEGREE, MAX_REROUTE_SUGGESTIONS, REROUTE_PREMIUM,
};
use crate::error::PricingError;
use crate::ledger::{PriceBounds, PriceLedger};
use crate::spatial::SpatialQuery;
use crate::types::{
    CompetitorCandidate, FeatureRecord, ModelInfo, Price, RerouteSuggestion, StrategyKind, UnitId,
};

use super::demand::DemandSignal;
use super::{PricingStrategy, finish_price};

// === CONSTANTS ===

/// Step applied when the unit is full and neighbors are cheaper.
const FULL_UNDERCUT_STEP: f64 = -0.1;
/// Step applied when the unit is full and neighbors are at least as expensive.
const FULL_MARKUP_STEP: f64 = 0.05;
/// Share of the gap to the competitor average closed per tick.
const MATCH_RATE: f64 = 0.2;

/// Demand pricing blended with a competitor-average adjustment.
///
/// Competitors are other units within `competition_radius` of this one,
/// priced from this strategy's own ledger as it stands before the tick.
#[derive(Debug, Clone)]
pub struct CompetitiveStrategy {
    base_price: Price,
    weights: DemandWeights,
    competition_radius: f64,
    demand_weight: f64,
    competition_weight: f64,
    bounds: PriceBounds,
}

impl CompetitiveStrategy {
    pub fn new(base_price: Price, params: &CompetitionParams) -> Self {
        Self {
            base_price,
            weights: params.weights.clone(),
            competition_radius: params.competition_radius,
            demand_weight: params.demand_weight,
            competition_weight: params.competition_weight,
            bounds: PriceBounds::for_base(base_price),
        }
    }

    pub fn competition_radius(&self) -> f64 {
        self.competition_radius
    }

    /// Units within the radius, nearest first, with their current prices.
    /// Empty when the unit has no registered location.
    pub fn find_competitors(
        &self,
        ledger: &PriceLedger,
        spatial: &dyn SpatialQuery,
        unit: UnitId,
    ) -> Vec<CompetitorCandidate> {
        spatial
            .within_radius(unit, self.competition_radius)
            .into_iter()
            .map(|n| CompetitorCandidate {
                unit_id: n.unit_id,
                distance: n.distance,
                price: ledger.current_price(n.unit_id),
            })
            .collect()
    }

    /// Relative adjustment from neighbor prices; 0 without competitors.
    ///
    /// A full unit takes a fixed step regardless of the size of the gap.
    /// Otherwise the price moves a fifth of the way toward the neighbor mean.
    pub fn competitive_adjustment(
        &self,
        ledger: &PriceLedger,
        spatial: &dyn SpatialQuery,
        unit: UnitId,
        occupancy: i64,
        capacity: i64,
    ) -> f64 {
        let competitors = self.find_competitors(ledger, spatial, unit);
        if competitors.is_empty() {
            return 0.0;
        }

        let avg_price =
            competitors.iter().map(|c| c.price).sum::<f64>() / competitors.len() as f64;
        let current_price = ledger.current_price(unit);

        if occupancy >= capacity {
            if avg_price < current_price {
                FULL_UNDERCUT_STEP
            } else {
                FULL_MARKUP_STEP
            }
        } else {
            (avg_price / current_price - 1.0) * MATCH_RATE
        }
    }

    /// Next price for the unit, computed against the ledger without writing.
    pub fn quote(
        &self,
        ledger: &PriceLedger,
        spatial: &dyn SpatialQuery,
        unit: UnitId,
        signal: &DemandSignal,
        occupancy: i64,
        capacity: i64,
    ) -> Result<Price, PricingError> {
        signal.check(unit)?;
        if capacity <= 0 {
            return Err(PricingError::InvalidCapacity { unit, capacity });
        }

        let demand_price = self.weights.demand_price(self.base_price, signal);
        let adjustment = self.competitive_adjustment(ledger, spatial, unit, occupancy, capacity);
        let competitive_price = ledger.current_price(unit) * (1.0 + adjustment);

        let blended =
            self.demand_weight * demand_price + self.competition_weight * competitive_price;
        finish_price(unit, StrategyKind::Competitive, self.bounds, blended)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_price(
        &self,
        ledger: &mut PriceLedger,
        spatial: &dyn SpatialQuery,
        unit: UnitId,
        signal: &DemandSignal,
        occupancy: i64,
        capacity: i64,
    ) -> Result<Price, PricingError> {
        let price = self.quote(ledger, spatial, unit, signal, occupancy, capacity)?;
        Ok(ledger.record(unit, price))
    }

    /// Up to three nearest neighbors priced within 10% above this unit,
    /// offered only while the unit is full.
    pub fn suggest_rerouting(
        &self,
        ledger: &PriceLedger,
        spatial: &dyn SpatialQuery,
        unit: UnitId,
        occupancy: i64,
        capacity: i64,
    ) -> Vec<RerouteSuggestion> {
        if occupancy < capacity {
            return Vec::new();
        }

        let current_price = ledger.current_price(unit);
        let ceiling = current_price * REROUTE_PREMIUM;
        self.find_competitors(ledger, spatial, unit)
            .into_iter()
            .filter(|c| c.price <= ceiling)
            .take(MAX_REROUTE_SUGGESTIONS)
            .map(|c| RerouteSuggestion {
                unit_id: c.unit_id,
                distance_km: c.distance * KM_PER_DEGREE,
                price: c.price,
                savings: current_price - c.price,
            })
            .collect()
    }
}

impl PricingStrategy for CompetitiveStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Competitive
    }

    fn bounds(&self) -> PriceBounds {
        self.bounds
    }

    fn propose(
        &self,
        ledger: &PriceLedger,
        spatial: &dyn SpatialQuery,
        record: &FeatureRecord,
    ) -> Result<Price, PricingError> {
        self.quote(
            ledger,
            spatial,
            record.unit_id,
            &DemandSignal::from(record),
            record.occupancy,
            record.capacity,
        )
    }

    fn reroute(
        &self,
        ledger: &PriceLedger,
        spatial: &dyn SpatialQuery,
        record: &FeatureRecord,
    ) -> Vec<RerouteSuggestion> {
        self.suggest_rerouting(
            ledger,
            spatial,
            record.unit_id,
            record.occupancy,
            record.capacity,
        )
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            model_name: "Competitive Pricing Model".to_string(),
            base_price: self.base_price,
            description: "Advanced pricing with location intelligence and competition analysis"
                .to_string(),
            parameters: BTreeMap::from([
                (
                    "competition_radius_km".to_string(),
                    self.competition_radius * KM_PER_DEGREE,
                ),
                ("demand_weight".to_string(), self.demand_weight),
                ("competition_weight".to_string(), self.competition_weight),
            ]),
        }
    }
}
