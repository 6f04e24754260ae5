//! Portfolio snapshot and rebalance action types.

use crate::types::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time valuation of a portfolio, supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub total_value: Decimal,
    /// Symbol -> current market value
    #[serde(default)]
    pub positions: BTreeMap<String, Decimal>,
    /// Symbol -> target allocation in percent (0-100)
    #[serde(default)]
    pub allocation_targets: BTreeMap<String, Decimal>,
    /// Symbol -> tolerated deviation in percentage points
    #[serde(default)]
    pub rebalance_bands: BTreeMap<String, Decimal>,
}

impl PortfolioSnapshot {
    pub fn new(total_value: Decimal) -> Self {
        Self {
            total_value,
            ..Default::default()
        }
    }

    pub fn with_position(mut self, symbol: &str, value: Decimal) -> Self {
        self.positions.insert(symbol.to_string(), value);
        self
    }

    pub fn with_target(mut self, symbol: &str, percent: Decimal) -> Self {
        self.allocation_targets.insert(symbol.to_string(), percent);
        self
    }

    pub fn with_band(mut self, symbol: &str, percent: Decimal) -> Self {
        self.rebalance_bands.insert(symbol.to_string(), percent);
        self
    }

    pub fn position_value(&self, symbol: &str) -> Decimal {
        self.positions.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }
}

/// Proposed trade correcting one symbol's allocation drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceAction {
    pub symbol: String,
    pub side: Side,
    /// Monetary amount, never negative
    pub value: Decimal,
    /// Absolute drift from target, as a fraction
    pub deviation: Decimal,
    pub reason: String,
}

/// Rebalance proposal before and after cross-symbol netting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RebalancePlan {
    /// One action per out-of-band symbol
    pub proposed: Vec<RebalanceAction>,
    /// `proposed` after dollar-value netting
    pub netted: Vec<RebalanceAction>,
    /// Whether `actions()` returns the netted list
    pub netting_applied: bool,
}

impl RebalancePlan {
    /// The list the caller should act on under the configured netting policy.
    pub fn actions(&self) -> &[RebalanceAction] {
        if self.netting_applied {
            &self.netted
        } else {
            &self.proposed
        }
    }

    /// True when every symbol breach was cancelled by netting.
    pub fn netting_erased_deviations(&self) -> bool {
        !self.proposed.is_empty() && self.netted.is_empty()
    }
}
