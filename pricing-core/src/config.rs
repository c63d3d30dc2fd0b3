use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{Price, StrategyKind};

// === CONSTANTS ===

/// Floor and ceiling of every strategy's price, as multiples of `base_price`.
pub const PRICE_FLOOR_RATIO: f64 = 0.5;
pub const PRICE_CEILING_RATIO: f64 = 2.0;
/// Fixed degrees-to-kilometres factor used for reporting distances.
pub const KM_PER_DEGREE: f64 = 111.0;
/// Queue length at which queue pressure saturates.
pub const QUEUE_SATURATION: f64 = 20.0;
/// Competitors priced above `current * REROUTE_PREMIUM` are never suggested.
pub const REROUTE_PREMIUM: f64 = 1.1;
pub const MAX_REROUTE_SUGGESTIONS: usize = 3;

// === STRATEGY PARAMETERS ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineParams {
    /// Price change per unit of occupancy rate per tick.
    pub alpha: f64,
}

impl Default for BaselineParams {
    fn default() -> Self {
        Self { alpha: 0.5 }
    }
}

/// Weights of the demand score and its price mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandWeights {
    /// Occupancy rate.
    pub alpha: f64,
    /// Normalized queue length.
    pub beta: f64,
    /// Normalized traffic; subtracted.
    pub gamma: f64,
    /// Special-day flag.
    pub delta: f64,
    /// Vehicle class weight.
    pub epsilon: f64,
    /// Max relative swing of price around base.
    pub lambda: f64,
}

impl Default for DemandWeights {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            beta: 0.3,
            gamma: 0.2,
            delta: 0.4,
            epsilon: 0.1,
            lambda: 0.8,
        }
    }
}

impl DemandWeights {
    pub(crate) fn values(&self) -> [(&'static str, f64); 6] {
        [
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("gamma", self.gamma),
            ("delta", self.delta),
            ("epsilon", self.epsilon),
            ("lambda", self.lambda),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitionParams {
    pub weights: DemandWeights,
    /// Search radius in degrees (0.005 is about 0.555 km).
    pub competition_radius: f64,
    pub demand_weight: f64,
    pub competition_weight: f64,
}

impl Default for CompetitionParams {
    fn default() -> Self {
        Self {
            weights: DemandWeights::default(),
            competition_radius: 0.005,
            demand_weight: 0.7,
            competition_weight: 0.3,
        }
    }
}

// === ENGINE SETTINGS ===

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpatialIndexKind {
    /// Brute-force pass over every registered unit.
    #[default]
    Scan,
    /// Uniform grid bucketed by the competition radius.
    Grid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Active strategies, in dispatch order.
    pub strategies: Vec<StrategyKind>,
    pub spatial_index: SpatialIndexKind,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            strategies: StrategyKind::ALL.to_vec(),
            spatial_index: SpatialIndexKind::Scan,
        }
    }
}

// === TOP LEVEL ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Shared by every strategy and every unit.
    pub base_price: Price,
    pub baseline: BaselineParams,
    pub demand: DemandWeights,
    pub competitive: CompetitionParams,
    pub engine: EngineSettings,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_price: 10.0,
            baseline: BaselineParams::default(),
            demand: DemandWeights::default(),
            competitive: CompetitionParams::default(),
            engine: EngineSettings::default(),
        }
    }
}

impl PricingConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: PricingConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_price.is_finite() && self.base_price > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "base_price must be a positive number, got {}",
                self.base_price
            )));
        }

        let competitive = &self.competitive;
        let named = [
            ("baseline.alpha", self.baseline.alpha),
            ("competitive.demand_weight", competitive.demand_weight),
            ("competitive.competition_weight", competitive.competition_weight),
        ];
        let weights = self
            .demand
            .values()
            .into_iter()
            .map(|(name, v)| (format!("demand.{name}"), v))
            .chain(
                competitive
                    .weights
                    .values()
                    .into_iter()
                    .map(|(name, v)| (format!("competitive.weights.{name}"), v)),
            )
            .chain(named.into_iter().map(|(name, v)| (name.to_string(), v)));
        for (name, value) in weights {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!("{name} must be finite")));
            }
        }

        let radius = competitive.competition_radius;
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "competitive.competition_radius must be non-negative, got {radius}"
            )));
        }

        let strategies = &self.engine.strategies;
        if strategies.is_empty() {
            return Err(ConfigError::Invalid(
                "engine.strategies must name at least one strategy".to_string(),
            ));
        }
        for (i, kind) in strategies.iter().enumerate() {
            if strategies[..i].contains(kind) {
                return Err(ConfigError::Invalid(format!(
                    "engine.strategies lists '{kind}' twice"
                )));
            }
        }
        Ok(())
    }

    pub fn min_price(&self) -> Price {
        self.base_price * PRICE_FLOOR_RATIO
    }

    pub fn max_price(&self) -> Price {
        self.base_price * PRICE_CEILING_RATIO
    }
}
