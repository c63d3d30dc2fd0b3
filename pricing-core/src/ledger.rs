// Price ledger: per-unit current price and append-only history for one strategy

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{PRICE_CEILING_RATIO, PRICE_FLOOR_RATIO};
use crate::types::{Price, UnitId};

// === BOUNDS ===

/// Closed price interval `[base * 0.5, base * 2.0]` shared by every strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceBounds {
    pub min: Price,
    pub max: Price,
}

impl PriceBounds {
    pub fn for_base(base_price: Price) -> Self {
        Self {
            min: base_price * PRICE_FLOOR_RATIO,
            max: base_price * PRICE_CEILING_RATIO,
        }
    }

    pub fn clamp(&self, price: Price) -> Price {
        price.clamp(self.min, self.max)
    }

    pub fn contains(&self, price: Price) -> bool {
        price >= self.min && price <= self.max
    }
}

// === PRICE STATE ===

/// `history` is never empty and its last entry is always `current`.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceState {
    current: Price,
    history: Vec<Price>,
}

impl PriceState {
    pub fn seeded(base_price: Price) -> Self {
        Self {
            current: base_price,
            history: vec![base_price],
        }
    }

    pub fn current(&self) -> Price {
        self.current
    }

    pub fn history(&self) -> &[Price] {
        &self.history
    }

    fn push(&mut self, price: Price) {
        self.current = price;
        self.history.push(price);
    }
}

// === LEDGER ===

/// Owns every unit's price state for a single strategy.
///
/// Unknown units read as `base_price`; the first write to an unknown unit
/// seeds its history with `base_price` before appending.
#[derive(Debug, Clone)]
pub struct PriceLedger {
    base_price: Price,
    states: BTreeMap<UnitId, PriceState>,
}

impl PriceLedger {
    pub fn new(base_price: Price) -> Self {
        Self {
            base_price,
            states: BTreeMap::new(),
        }
    }

    pub fn base_price(&self) -> Price {
        self.base_price
    }

    /// Create the unit's entry at `base_price` if missing. Returns true if created.
    pub fn seed(&mut self, unit: UnitId) -> bool {
        if self.states.contains_key(&unit) {
            return false;
        }
        self.states.insert(unit, PriceState::seeded(self.base_price));
        true
    }

    /// The one place the default materialization policy lives.
    pub fn get_or_insert_default(&mut self, unit: UnitId) -> &mut PriceState {
        let base = self.base_price;
        self.states
            .entry(unit)
            .or_insert_with(|| PriceState::seeded(base))
    }

    /// Current price, or `base_price` for an unseen unit. Never fails.
    pub fn current_price(&self, unit: UnitId) -> Price {
        self.states
            .get(&unit)
            .map(PriceState::current)
            .unwrap_or(self.base_price)
    }

    /// History of the unit; an unseen unit reports `[base_price]`.
    pub fn history(&self, unit: UnitId) -> &[Price] {
        match self.states.get(&unit) {
            Some(state) => state.history(),
            None => std::slice::from_ref(&self.base_price),
        }
    }

    /// Set the current price and append it to history.
    pub fn record(&mut self, unit: UnitId, price: Price) -> Price {
        self.get_or_insert_default(unit).push(price);
        price
    }

    pub fn state(&self, unit: UnitId) -> Option<&PriceState> {
        self.states.get(&unit)
    }

    pub fn contains(&self, unit: UnitId) -> bool {
        self.states.contains_key(&unit)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Units in id order.
    pub fn iter(&self) -> impl Iterator<Item = (UnitId, &PriceState)> {
        self.states.iter().map(|(id, state)| (*id, state))
    }
}
