use wasm_bindgen::prelude::*;

pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod ledger;
pub mod registry;
pub mod spatial;
pub mod strategy;
pub mod summary;
pub mod types;

pub use config::*;
pub use engine::{PricingEngine, RunReport, TickOutcome};
pub use error::{ConfigError, FeedError, PricingError};
pub use feed::{
    JsonLinesSink, JsonLinesSource, RecordSink, SyntheticFeed, VecSink, sites_from_records,
};
pub use ledger::{PriceBounds, PriceLedger, PriceState};
pub use registry::EntityRegistry;
pub use spatial::{GridIndex, Neighbor, SpatialQuery, planar_distance};
pub use strategy::{
    BaselineStrategy, CompetitiveStrategy, DemandSignal, DemandStrategy, PricingStrategy,
    build_strategy,
};
pub use summary::{PriceStats, RunSummary, UnitSummary};
pub use types::*;

#[cfg(feature = "instrument")]
pub use instrument;

// ============================================================================
// WASM API - Pricing Simulation
// ============================================================================

#[wasm_bindgen]
pub struct PricingSimulation {
    engine: PricingEngine,
}

impl Default for PricingSimulation {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl PricingSimulation {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        // Better panic messages in browser console
        console_error_panic_hook::set_once();

        Self {
            engine: PricingEngine::default(),
        }
    }

    /// Create a simulation from a `PricingConfig` object; missing keys take defaults.
    #[wasm_bindgen]
    pub fn with_config(config: JsValue) -> Result<PricingSimulation, JsError> {
        console_error_panic_hook::set_once();

        let config: PricingConfig = serde_wasm_bindgen::from_value(config)?;
        Ok(Self {
            engine: PricingEngine::new(config)?,
        })
    }

    /// Register units (an array of `Unit`) and seed their prices.
    #[wasm_bindgen]
    pub fn initialize(&mut self, units: JsValue) -> Result<(), JsError> {
        let units: Vec<Unit> = serde_wasm_bindgen::from_value(units)?;
        self.engine.initialize(units);
        Ok(())
    }

    /// Price one feature record with every active strategy.
    #[wasm_bindgen]
    pub fn process(&mut self, record: FeatureRecord) -> Result<PriceRecord, JsError> {
        let outcome = self.engine.process(&record)?;
        Ok(outcome.record)
    }

    #[wasm_bindgen]
    pub fn model_info(&self, kind: &str) -> Result<ModelInfo, JsError> {
        let kind: StrategyKind = kind.parse().map_err(|e: String| JsError::new(&e))?;
        self.engine
            .model_info(kind)
            .ok_or_else(|| JsError::new(&format!("strategy '{kind}' is not active")))
    }

    /// Empty for an unknown or inactive strategy.
    #[wasm_bindgen]
    pub fn price_history(&self, kind: &str, unit_id: u32) -> Vec<f64> {
        kind.parse::<StrategyKind>()
            .ok()
            .and_then(|kind| self.engine.price_history(kind, UnitId::new(unit_id)))
            .map(<[f64]>::to_vec)
            .unwrap_or_default()
    }

    #[wasm_bindgen]
    pub fn processed(&self) -> u64 {
        self.engine.processed()
    }
}
