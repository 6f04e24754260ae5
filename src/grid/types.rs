//! Grid ladder data model.

use crate::types::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How spacing is applied around the base price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LadderMode {
    /// Spacing is a percentage applied multiplicatively around the base price.
    #[default]
    Percentage,
    /// Spacing is an additive price increment. No generation rule is defined yet.
    Fixed,
}

impl LadderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LadderMode::Percentage => "percentage",
            LadderMode::Fixed => "fixed",
        }
    }
}

impl fmt::Display for LadderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for LadderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(LadderMode::Percentage),
            "fixed" => Ok(LadderMode::Fixed),
            other => Err(format!("unknown ladder mode: {other}")),
        }
    }
}

/// Parameters for one instrument's price ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLevelConfig {
    /// Instrument symbol (e.g., "AAPL")
    pub symbol: String,
    /// Center of the ladder
    pub base_price: Decimal,
    /// Distance between tiers, in percent of base price
    pub grid_spacing: Decimal,
    /// Number of SELL tiers above base price
    pub num_levels_up: i32,
    /// Number of BUY tiers below base price
    pub num_levels_down: i32,
    /// Monetary amount transacted per level
    pub position_size: Decimal,
    /// Capital earmarked for the whole grid
    #[serde(default)]
    pub total_investment: Decimal,
    #[serde(default)]
    pub ladder_mode: LadderMode,
}

impl GridLevelConfig {
    /// Capital needed to fill every BUY tier.
    pub fn capital_required(&self) -> Decimal {
        self.position_size * Decimal::from(self.num_levels_down.max(0))
    }
}

/// One price threshold in the ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLevel {
    /// Negative = BUY tier below base, positive = SELL tier above base
    pub level_number: i32,
    pub trigger_price: Decimal,
    pub side: Side,
    /// Monetary amount to transact when triggered
    pub target_allocation: Decimal,
    pub is_filled: bool,
    pub filled_price: Option<Decimal>,
    pub filled_quantity: Option<Decimal>,
    pub last_triggered: Option<DateTime<Utc>>,
}

impl GridLevel {
    pub(crate) fn unfilled(
        level_number: i32,
        trigger_price: Decimal,
        side: Side,
        target_allocation: Decimal,
    ) -> Self {
        Self {
            level_number,
            trigger_price,
            side,
            target_allocation,
            is_filled: false,
            filled_price: None,
            filled_quantity: None,
            last_triggered: None,
        }
    }

    /// Whether `price` crosses this level's trigger.
    ///
    /// Equality counts as a cross on both sides.
    pub fn is_crossed_by(&self, price: Decimal) -> bool {
        match self.side {
            Side::Buy => price <= self.trigger_price,
            Side::Sell => price >= self.trigger_price,
        }
    }

    /// Fill recorded on this level, if any.
    pub fn fill(&self) -> Option<FillDetails> {
        if !self.is_filled {
            return None;
        }
        Some(FillDetails {
            price: self.filled_price?,
            quantity: self.filled_quantity?,
            timestamp: self.last_triggered?,
        })
    }

    pub(crate) fn apply_fill(&mut self, fill: &FillDetails) {
        self.is_filled = true;
        self.filled_price = Some(fill.price);
        self.filled_quantity = Some(fill.quantity);
        self.last_triggered = Some(fill.timestamp);
    }
}

/// Proposed action emitted when a level fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridAction {
    pub level_number: i32,
    pub side: Side,
    /// The level's target allocation
    pub value: Decimal,
    /// Market price observed when the level fired
    pub price: Decimal,
}

/// Execution details recorded against a level by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillDetails {
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// What happens to recorded fills when the ladder is regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillCarryPolicy {
    /// Every regenerated level starts unfilled.
    #[default]
    Discard,
    /// Fills move to the regenerated level with the same level number.
    ReassociateByTier,
}

/// Summary of a level set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridStatistics {
    pub total_levels: usize,
    pub filled_levels: usize,
    /// filled / total, zero for an empty set
    pub utilization_rate: Decimal,
    pub buy_levels: usize,
    pub sell_levels: usize,
    pub buy_levels_filled: usize,
    pub sell_levels_filled: usize,
    /// Lowest trigger price across all levels, filled or not
    pub min_price: Option<Decimal>,
    /// Highest trigger price across all levels, filled or not
    pub max_price: Option<Decimal>,
}

/// Result of a volatility-driven spacing update.
#[derive(Debug, Clone)]
pub struct SpacingUpdate {
    /// Config carrying the new spacing
    pub config: GridLevelConfig,
    /// Regenerated ladder
    pub levels: Vec<GridLevel>,
    /// Factor applied to the previous spacing
    pub multiplier: Decimal,
    /// Prior fills re-attached to a regenerated tier
    pub carried_fills: usize,
    /// Prior fills whose tier no longer exists, or discarded by policy
    pub dropped_fills: usize,
}
