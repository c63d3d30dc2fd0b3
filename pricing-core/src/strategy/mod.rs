// Pricing strategies
//
// Module structure:
// - baseline     Occupancy-linear incremental rule with soft bounds
// - demand       Memoryless multi-factor demand score -> price
// - competitive  Demand price blended with a nearby-competitor adjustment

pub mod baseline;
pub mod competitive;
pub mod demand;

pub use baseline::BaselineStrategy;
pub use competitive::CompetitiveStrategy;
pub use demand::{DemandSignal, DemandStrategy};

use crate::config::PricingConfig;
use crate::error::PricingError;
use crate::ledger::{PriceBounds, PriceLedger};
use crate::spatial::SpatialQuery;
use crate::types::{FeatureRecord, ModelInfo, Price, RerouteSuggestion, StrategyKind, UnitId};

/// A price update rule over one strategy's ledger.
///
/// `propose` computes the next price from the pre-tick ledger without writing;
/// `update` proposes and then records. A failed proposal never touches the ledger.
pub trait PricingStrategy {
    fn kind(&self) -> StrategyKind;

    fn bounds(&self) -> PriceBounds;

    fn propose(
        &self,
        ledger: &PriceLedger,
        spatial: &dyn SpatialQuery,
        record: &FeatureRecord,
    ) -> Result<Price, PricingError>;

    fn update(
        &self,
        ledger: &mut PriceLedger,
        spatial: &dyn SpatialQuery,
        record: &FeatureRecord,
    ) -> Result<Price, PricingError> {
        let price = self.propose(ledger, spatial, record)?;
        Ok(ledger.record(record.unit_id, price))
    }

    /// Advisory alternatives for a full unit. Only the competitive strategy has any.
    fn reroute(
        &self,
        _ledger: &PriceLedger,
        _spatial: &dyn SpatialQuery,
        _record: &FeatureRecord,
    ) -> Vec<RerouteSuggestion> {
        Vec::new()
    }

    /// Static description; pure and stable across calls.
    fn info(&self) -> ModelInfo;
}

/// Construct the strategy for `kind` from the shared config.
pub fn build_strategy(kind: StrategyKind, config: &PricingConfig) -> Box<dyn PricingStrategy> {
    match kind {
        StrategyKind::Baseline => {
            Box::new(BaselineStrategy::new(config.base_price, &config.baseline))
        }
        StrategyKind::Demand => Box::new(DemandStrategy::new(config.base_price, &config.demand)),
        StrategyKind::Competitive => Box::new(CompetitiveStrategy::new(
            config.base_price,
            &config.competitive,
        )),
    }
}

pub(crate) fn ensure_finite(
    unit: UnitId,
    field: &'static str,
    value: f64,
) -> Result<f64, PricingError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PricingError::NonFiniteInput { unit, field })
    }
}

/// Clamp a computed price, rejecting NaN/inf before it can reach a ledger.
pub(crate) fn finish_price(
    unit: UnitId,
    strategy: StrategyKind,
    bounds: PriceBounds,
    price: Price,
) -> Result<Price, PricingError> {
    if price.is_finite() {
        Ok(bounds.clamp(price))
    } else {
        Err(PricingError::NonFinitePrice { unit, strategy })
    }
}
