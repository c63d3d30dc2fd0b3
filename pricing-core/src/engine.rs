// Pricing engine: per-tick dispatch of feature records to the active strategies

use crate::config::{PricingConfig, SpatialIndexKind};
use crate::error::{ConfigError, FeedError, PricingError};
use crate::feed::RecordSink;
use crate::ledger::{PriceBounds, PriceLedger};
use crate::registry::EntityRegistry;
use crate::spatial::{GridIndex, SpatialQuery};
use crate::strategy::{PricingStrategy, build_strategy};
use crate::summary::RunSummary;
use crate::types::{
    FeatureRecord, ModelInfo, Price, PriceRecord, RerouteSuggestion, StrategyKind, Unit, UnitId,
};

/// One active strategy and the ledger it owns.
struct Slot {
    strategy: Box<dyn PricingStrategy>,
    ledger: PriceLedger,
}

/// Result of one processed record.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub record: PriceRecord,
    /// Non-empty only when the competitive strategy is active and the unit is full.
    pub reroutes: Vec<RerouteSuggestion>,
}

/// Totals for a full source-to-sink run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub processed: u64,
    /// Records rejected by a strategy.
    pub failed: u64,
    /// Records the source could not decode.
    pub skipped: u64,
    pub summary: RunSummary,
}

pub struct PricingEngine {
    config: PricingConfig,
    registry: EntityRegistry,
    grid: Option<GridIndex>,
    slots: Vec<Slot>,
    /// Records seen by `process`, including failures. Tags tick events.
    seq: u64,
    processed: u64,
}

fn spatial_view<'a>(
    registry: &'a EntityRegistry,
    grid: Option<&'a GridIndex>,
) -> &'a dyn SpatialQuery {
    match grid {
        Some(grid) => grid,
        None => registry,
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::build(PricingConfig::default())
    }
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: PricingConfig) -> Self {
        let slots = config
            .engine
            .strategies
            .iter()
            .map(|&kind| Slot {
                strategy: build_strategy(kind, &config),
                ledger: PriceLedger::new(config.base_price),
            })
            .collect();
        let grid = match config.engine.spatial_index {
            SpatialIndexKind::Grid => Some(GridIndex::build(
                &EntityRegistry::new(),
                config.competitive.competition_radius,
            )),
            SpatialIndexKind::Scan => None,
        };

        Self {
            config,
            registry: EntityRegistry::new(),
            grid,
            slots,
            seq: 0,
            processed: 0,
        }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn bounds(&self) -> PriceBounds {
        PriceBounds::for_base(self.config.base_price)
    }

    pub fn strategies(&self) -> impl Iterator<Item = StrategyKind> + '_ {
        self.slots.iter().map(|slot| slot.strategy.kind())
    }

    pub fn is_active(&self, kind: StrategyKind) -> bool {
        self.slot(kind).is_some()
    }

    /// Register units and seed one ledger entry per active strategy.
    ///
    /// May be called more than once. Units already registered keep their
    /// first location, and existing ledger entries keep their history.
    /// Units with a non-finite location are not registered; returns how many
    /// were rejected.
    pub fn initialize(&mut self, units: impl IntoIterator<Item = Unit>) -> usize {
        let mut added = 0usize;
        let mut rejected = 0usize;
        for unit in units {
            if !unit.location.is_finite() {
                #[cfg(feature = "instrument")]
                tracing::warn!(
                    unit_id = unit.id.0,
                    latitude = unit.location.latitude,
                    longitude = unit.location.longitude,
                    "rejecting unit with non-finite location"
                );
                rejected += 1;
                continue;
            }
            if self.registry.register(unit) {
                added += 1;
            }
            for slot in &mut self.slots {
                slot.ledger.seed(unit.id);
            }
        }

        if self.grid.is_some() {
            self.grid = Some(GridIndex::build(
                &self.registry,
                self.config.competitive.competition_radius,
            ));
        }

        #[cfg(feature = "instrument")]
        tracing::debug!(
            added,
            rejected,
            total = self.registry.len(),
            "registered parking units"
        );
        #[cfg(not(feature = "instrument"))]
        let _ = added;
        rejected
    }

    /// Price one record with every active strategy.
    ///
    /// All strategies propose against the ledgers as they stood before this
    /// record, and nothing is committed unless every proposal succeeds.
    pub fn process(&mut self, record: &FeatureRecord) -> Result<TickOutcome, PricingError> {
        self.seq += 1;
        let seq = self.seq;

        let proposals = match self.propose_all(record) {
            Ok(proposals) => proposals,
            Err(err) => {
                #[cfg(feature = "instrument")]
                tracing::warn!(
                    target: "unit_failure",
                    seq = seq,
                    unit_id = record.unit_id.0,
                    error = %err,
                );
                return Err(err);
            }
        };

        let mut out = PriceRecord::unpriced(record);
        for (slot, price) in self.slots.iter_mut().zip(proposals) {
            let price = slot.ledger.record(record.unit_id, price);
            out.set_price(slot.strategy.kind(), price);
        }

        let reroutes = if record.is_full() {
            self.reroutes_for(record)
        } else {
            Vec::new()
        };
        self.processed += 1;

        #[cfg(feature = "instrument")]
        {
            tracing::info!(
                target: "price",
                seq = seq,
                unit_id = out.unit_id.0,
                occupancy_rate = out.occupancy_rate,
                queue_length = out.queue_length,
                traffic_level = out.traffic_level,
                is_special_day = out.is_special_day,
                baseline_price = out.baseline_price,
                demand_price = out.demand_price,
                competitive_price = out.competitive_price,
            );
            for r in &reroutes {
                tracing::info!(
                    target: "reroute",
                    seq = seq,
                    unit_id = out.unit_id.0,
                    candidate_id = r.unit_id.0,
                    distance_km = r.distance_km,
                    price = r.price,
                    savings = r.savings,
                );
            }
        }
        #[cfg(not(feature = "instrument"))]
        let _ = seq;

        Ok(TickOutcome { record: out, reroutes })
    }

    fn propose_all(&self, record: &FeatureRecord) -> Result<Vec<Price>, PricingError> {
        record.validate()?;
        let spatial = spatial_view(&self.registry, self.grid.as_ref());
        self.slots
            .iter()
            .map(|slot| slot.strategy.propose(&slot.ledger, spatial, record))
            .collect()
    }

    fn reroutes_for(&self, record: &FeatureRecord) -> Vec<RerouteSuggestion> {
        let spatial = spatial_view(&self.registry, self.grid.as_ref());
        self.slots
            .iter()
            .flat_map(|slot| slot.strategy.reroute(&slot.ledger, spatial, record))
            .collect()
    }

    /// Replay a record source into a sink.
    ///
    /// Per-unit pricing failures and undecodable records are counted and
    /// skipped. Source I/O errors and sink errors end the run.
    ///
    /// A record is committed to the ledgers and counted by `processed()`
    /// before the sink sees it, so when `accept` fails the failing record is
    /// priced but never delivered.
    pub fn run<I, S>(&mut self, source: I, sink: &mut S) -> Result<RunReport, FeedError>
    where
        I: IntoIterator<Item = Result<FeatureRecord, FeedError>>,
        S: RecordSink + ?Sized,
    {
        let mut summary = RunSummary::new(self.bounds());
        let mut failed = 0u64;
        let mut skipped = 0u64;
        let mut processed = 0u64;

        for item in source {
            let record = match item {
                Ok(record) => record,
                Err(err) if err.is_recoverable() => {
                    #[cfg(feature = "instrument")]
                    tracing::warn!(error = %err, "skipping undecodable record");
                    skipped += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };

            match self.process(&record) {
                Ok(outcome) => {
                    summary.observe(&outcome.record);
                    sink.accept(&outcome.record)?;
                    processed += 1;
                }
                Err(_) => failed += 1,
            }
        }
        sink.flush()?;

        #[cfg(feature = "instrument")]
        tracing::info!(processed, failed, skipped, "replay finished");

        Ok(RunReport {
            processed,
            failed,
            skipped,
            summary,
        })
    }

    fn slot(&self, kind: StrategyKind) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.strategy.kind() == kind)
    }

    // === ACCESSORS ===

    /// `None` when `kind` is not active. Unknown units report `base_price`.
    pub fn current_price(&self, kind: StrategyKind, unit: UnitId) -> Option<Price> {
        self.slot(kind).map(|slot| slot.ledger.current_price(unit))
    }

    pub fn price_history(&self, kind: StrategyKind, unit: UnitId) -> Option<&[Price]> {
        self.slot(kind).map(|slot| slot.ledger.history(unit))
    }

    pub fn model_info(&self, kind: StrategyKind) -> Option<ModelInfo> {
        self.slot(kind).map(|slot| slot.strategy.info())
    }

    pub fn ledger(&self, kind: StrategyKind) -> Option<&PriceLedger> {
        self.slot(kind).map(|slot| &slot.ledger)
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Records priced successfully so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }
}
