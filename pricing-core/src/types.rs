// Core data types shared by the registry, ledger, strategies and engine

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::error::PricingError;

// === TYPE ALIASES ===

pub type Price = f64;

// === IDS ===

/// Externally assigned parking unit id. Ids may be sparse.
#[derive(
    Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Tsify,
)]
#[serde(transparent)]
pub struct UnitId(pub u32);

impl UnitId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// === STRATEGIES ===

#[derive(
    Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Tsify,
)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Baseline,
    Demand,
    Competitive,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Baseline,
        StrategyKind::Demand,
        StrategyKind::Competitive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Baseline => "baseline",
            StrategyKind::Demand => "demand",
            StrategyKind::Competitive => "competitive",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" => Ok(StrategyKind::Baseline),
            "demand" => Ok(StrategyKind::Demand),
            "competitive" => Ok(StrategyKind::Competitive),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

// === UNITS ===

/// Geo-location in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// A priced parking unit. Immutable once registered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct Unit {
    pub id: UnitId,
    pub location: Location,
    pub capacity: u32,
}

impl Unit {
    pub fn new(id: UnitId, location: Location, capacity: u32) -> Self {
        Self {
            id,
            location,
            capacity,
        }
    }
}

// === RECORDS ===

/// Normalized observation of one unit at one tick, as handed over by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct FeatureRecord {
    /// Opaque ordering key; carried through to the output only.
    pub timestamp: String,
    pub unit_id: UnitId,
    pub occupancy_rate: f64,
    pub queue_length: u32,
    /// Expected pre-clamped to [1, 10].
    pub traffic_level: i32,
    pub is_special_day: bool,
    pub vehicle_weight: f64,
    pub occupancy: i64,
    pub capacity: i64,
    pub latitude: f64,
    pub longitude: f64,
}

impl FeatureRecord {
    pub fn location(&self) -> Location {
        Location::new(self.latitude, self.longitude)
    }

    /// True when the unit reports no free space.
    pub fn is_full(&self) -> bool {
        self.occupancy >= self.capacity
    }

    /// Precondition check run before any strategy sees the record.
    pub fn validate(&self) -> Result<(), PricingError> {
        let unit = self.unit_id;
        if self.capacity <= 0 {
            return Err(PricingError::InvalidCapacity {
                unit,
                capacity: self.capacity,
            });
        }
        for (field, value) in [
            ("occupancy_rate", self.occupancy_rate),
            ("vehicle_weight", self.vehicle_weight),
            ("latitude", self.latitude),
            ("longitude", self.longitude),
        ] {
            if !value.is_finite() {
                return Err(PricingError::NonFiniteInput { unit, field });
            }
        }
        Ok(())
    }
}

/// One output row per processed tick. A price is `None` when its strategy is inactive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct PriceRecord {
    pub timestamp: String,
    pub unit_id: UnitId,
    pub occupancy_rate: f64,
    pub queue_length: u32,
    pub traffic_level: i32,
    pub is_special_day: bool,
    pub baseline_price: Option<Price>,
    pub demand_price: Option<Price>,
    pub competitive_price: Option<Price>,
}

impl PriceRecord {
    /// Output row for `record` with no prices filled in yet.
    pub fn unpriced(record: &FeatureRecord) -> Self {
        Self {
            timestamp: record.timestamp.clone(),
            unit_id: record.unit_id,
            occupancy_rate: record.occupancy_rate,
            queue_length: record.queue_length,
            traffic_level: record.traffic_level,
            is_special_day: record.is_special_day,
            baseline_price: None,
            demand_price: None,
            competitive_price: None,
        }
    }

    pub fn price(&self, kind: StrategyKind) -> Option<Price> {
        match kind {
            StrategyKind::Baseline => self.baseline_price,
            StrategyKind::Demand => self.demand_price,
            StrategyKind::Competitive => self.competitive_price,
        }
    }

    pub fn set_price(&mut self, kind: StrategyKind, price: Price) {
        match kind {
            StrategyKind::Baseline => self.baseline_price = Some(price),
            StrategyKind::Demand => self.demand_price = Some(price),
            StrategyKind::Competitive => self.competitive_price = Some(price),
        }
    }
}

// === COMPETITION ===

/// A nearby unit seen during a competitor scan, with its price at scan time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompetitorCandidate {
    pub unit_id: UnitId,
    /// Planar distance in degrees.
    pub distance: f64,
    pub price: Price,
}

/// Advisory alternative offered when a unit is full.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct RerouteSuggestion {
    pub unit_id: UnitId,
    pub distance_km: f64,
    pub price: Price,
    pub savings: Price,
}

// === INTROSPECTION ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct ModelInfo {
    pub model_name: String,
    pub base_price: Price,
    pub description: String,
    pub parameters: BTreeMap<String, f64>,
}
