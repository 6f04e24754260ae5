//! Concentration and diversification metrics for a portfolio snapshot.

use super::snapshot::PortfolioSnapshot;
use crate::utils::decimal::{round_to_precision, safe_div};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Positions above this share (in percent) count as significant.
const SIGNIFICANT_POSITION_PCT: Decimal = Decimal::ONE;
/// Positions needed before the diversification penalty disappears.
const DIVERSIFIED_POSITION_COUNT: usize = 10;
const TOP_CONCENTRATIONS: usize = 5;

/// Concentration risk summary.
///
/// The default value is the empty result returned for a valueless portfolio.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Symbol -> share of total value, for positions worth more than zero
    pub concentrations: BTreeMap<String, Decimal>,
    pub max_concentration: Decimal,
    pub num_positions: usize,
    /// Sum of squared shares
    pub herfindahl_index: Decimal,
    /// 1 / HHI, zero when HHI is zero
    pub diversification_ratio: Decimal,
}

impl RiskMetrics {
    pub fn is_empty(&self) -> bool {
        self.concentrations.is_empty()
    }
}

/// Compute concentration metrics. Returns the empty result when
/// `total_value <= 0`. A share too large to represent saturates at
/// `Decimal::MAX`.
pub fn risk_metrics(snapshot: &PortfolioSnapshot) -> RiskMetrics {
    let total_value = snapshot.total_value;
    if total_value <= Decimal::ZERO {
        return RiskMetrics::default();
    }

    let concentrations: BTreeMap<String, Decimal> = snapshot
        .positions
        .iter()
        .filter(|(_, value)| **value > Decimal::ZERO)
        .map(|(symbol, value)| {
            let share = value.checked_div(total_value).unwrap_or(Decimal::MAX);
            (symbol.clone(), share)
        })
        .collect();

    let herfindahl_index = concentrations
        .values()
        .fold(Decimal::ZERO, |acc, c| acc.saturating_add(c.saturating_mul(*c)));
    let max_concentration = concentrations
        .values()
        .copied()
        .max()
        .unwrap_or(Decimal::ZERO);

    let metrics = RiskMetrics {
        num_positions: concentrations.len(),
        max_concentration,
        herfindahl_index,
        diversification_ratio: safe_div(Decimal::ONE, herfindahl_index),
        concentrations,
    };

    debug!(
        %total_value,
        positions = metrics.num_positions,
        hhi = %metrics.herfindahl_index,
        max_concentration = %metrics.max_concentration,
        "Computed risk metrics"
    );

    metrics
}

/// Coarse bucket for [`RiskAssessment::risk_score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// `High` above 70, `Medium` above 40.
    pub fn from_score(score: Decimal) -> Self {
        if score > dec!(70) {
            RiskLevel::High
        } else if score > dec!(40) {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One position's share of the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concentration {
    pub symbol: String,
    /// Share of total value in percent
    pub concentration_pct: Decimal,
    pub market_value: Decimal,
}

/// 0-100 concentration risk score, higher is riskier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_score: Decimal,
    pub risk_level: RiskLevel,
    pub max_concentration_pct: Decimal,
    /// Positions holding more than 1% of the portfolio
    pub num_significant_positions: usize,
    /// Largest positions first, at most five
    pub top_concentrations: Vec<Concentration>,
}

/// Score concentration risk as the largest position's percentage plus a
/// penalty of 2 points for each significant position short of ten, capped
/// at 100.
pub fn risk_assessment(snapshot: &PortfolioSnapshot) -> RiskAssessment {
    let metrics = risk_metrics(snapshot);

    let mut concentrations: Vec<Concentration> = metrics
        .concentrations
        .iter()
        .map(|(symbol, share)| Concentration {
            symbol: symbol.clone(),
            concentration_pct: share.saturating_mul(Decimal::ONE_HUNDRED),
            market_value: snapshot.position_value(symbol),
        })
        .collect();
    concentrations.sort_by(|a, b| b.concentration_pct.cmp(&a.concentration_pct));

    let max_concentration_pct = concentrations
        .first()
        .map(|c| c.concentration_pct)
        .unwrap_or(Decimal::ZERO);
    let num_significant_positions = concentrations
        .iter()
        .filter(|c| c.concentration_pct > SIGNIFICANT_POSITION_PCT)
        .count();

    let shortfall =
        DIVERSIFIED_POSITION_COUNT - num_significant_positions.min(DIVERSIFIED_POSITION_COUNT);
    let penalty = Decimal::from(shortfall as u64) * dec!(2);
    let risk_score = round_to_precision(
        max_concentration_pct
            .saturating_add(penalty)
            .min(Decimal::ONE_HUNDRED),
        2,
    );
    let risk_level = RiskLevel::from_score(risk_score);

    concentrations.truncate(TOP_CONCENTRATIONS);

    debug!(
        %risk_score,
        %risk_level,
        significant = num_significant_positions,
        "Assessed concentration risk"
    );

    RiskAssessment {
        risk_score,
        risk_level,
        max_concentration_pct: round_to_precision(max_concentration_pct, 2),
        num_significant_positions,
        top_concentrations: concentrations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_concentration_and_hhi() {
        let snapshot = PortfolioSnapshot::new(dec!(10000))
            .with_position("AAPL", dec!(7500))
            .with_position("BONDS", dec!(2500));

        let metrics = risk_metrics(&snapshot);
        assert_eq!(metrics.concentrations["AAPL"], dec!(0.75));
        assert_eq!(metrics.concentrations["BONDS"], dec!(0.25));
        assert_eq!(metrics.max_concentration, dec!(0.75));
        assert_eq!(metrics.num_positions, 2);
        assert_eq!(metrics.herfindahl_index, dec!(0.625));
        assert_eq!(metrics.diversification_ratio, dec!(1.6));
    }

    #[test]
    fn test_zero_value_positions_are_ignored() {
        let snapshot = PortfolioSnapshot::new(dec!(1000))
            .with_position("AAPL", dec!(1000))
            .with_position("CLOSED", Decimal::ZERO);

        let metrics = risk_metrics(&snapshot);
        assert_eq!(metrics.num_positions, 1);
        assert!(!metrics.concentrations.contains_key("CLOSED"));
        assert_eq!(metrics.herfindahl_index, dec!(1));
        assert_eq!(metrics.diversification_ratio, dec!(1));
    }

    #[test]
    fn test_valueless_portfolio_is_empty() {
        let snapshot = PortfolioSnapshot::new(Decimal::ZERO).with_position("AAPL", dec!(100));
        let metrics = risk_metrics(&snapshot);
        assert!(metrics.is_empty());
        assert_eq!(metrics, RiskMetrics::default());
    }

    #[test]
    fn test_no_positions_has_zero_ratio() {
        let metrics = risk_metrics(&PortfolioSnapshot::new(dec!(500)));
        assert_eq!(metrics.num_positions, 0);
        assert_eq!(metrics.herfindahl_index, Decimal::ZERO);
        assert_eq!(metrics.diversification_ratio, Decimal::ZERO);
    }

    #[test]
    fn test_inconsistent_snapshot_saturates() {
        let snapshot =
            PortfolioSnapshot::new(dec!(0.0000000001)).with_position("HUGE", Decimal::MAX);
        let metrics = risk_metrics(&snapshot);
        assert_eq!(metrics.max_concentration, Decimal::MAX);
        assert_eq!(metrics.herfindahl_index, Decimal::MAX);

        let assessment = risk_assessment(&snapshot);
        assert_eq!(assessment.risk_score, dec!(100));
        assert_eq!(assessment.risk_level, RiskLevel::High);
    }

    /// Ten significant positions, the largest worth `largest` out of 1000.
    fn ten_position_snapshot(largest: Decimal, second: Decimal) -> PortfolioSnapshot {
        let rest = (dec!(1000) - largest - second) / dec!(8);
        let mut snapshot = PortfolioSnapshot::new(dec!(1000))
            .with_position("BIG", largest)
            .with_position("MID", second);
        for i in 0..8 {
            snapshot = snapshot.with_position(&format!("S{i}"), rest);
        }
        snapshot
    }

    #[test]
    fn test_risk_level_thresholds() {
        let at_40 = risk_assessment(&ten_position_snapshot(dec!(400), dec!(120)));
        assert_eq!(at_40.num_significant_positions, 10);
        assert_eq!(at_40.risk_score, dec!(40));
        assert_eq!(at_40.risk_level, RiskLevel::Low);

        let above_40 = risk_assessment(&ten_position_snapshot(dec!(401), dec!(119)));
        assert_eq!(above_40.risk_score, dec!(40.1));
        assert_eq!(above_40.risk_level, RiskLevel::Medium);

        let at_70 = risk_assessment(&ten_position_snapshot(dec!(700), dec!(60)));
        assert_eq!(at_70.risk_score, dec!(70));
        assert_eq!(at_70.risk_level, RiskLevel::Medium);

        let above_70 = risk_assessment(&ten_position_snapshot(dec!(705), dec!(55)));
        assert_eq!(above_70.risk_score, dec!(70.5));
        assert_eq!(above_70.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_few_positions_are_penalized() {
        let snapshot = PortfolioSnapshot::new(dec!(10000))
            .with_position("AAPL", dec!(5000))
            .with_position("BONDS", dec!(4950))
            .with_position("DUST", dec!(50));

        let assessment = risk_assessment(&snapshot);
        // DUST is 0.5%, below the significance cutoff
        assert_eq!(assessment.num_significant_positions, 2);
        assert_eq!(assessment.max_concentration_pct, dec!(50));
        assert_eq!(assessment.risk_score, dec!(66));
        assert_eq!(assessment.risk_level, RiskLevel::Medium);

        let single = PortfolioSnapshot::new(dec!(100)).with_position("AAPL", dec!(100));
        let assessment = risk_assessment(&single);
        assert_eq!(assessment.risk_score, dec!(100));
        assert_eq!(assessment.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_top_concentrations_are_sorted_and_capped() {
        let mut snapshot = PortfolioSnapshot::new(dec!(2800));
        for (symbol, value) in [
            ("A", 100),
            ("B", 700),
            ("C", 300),
            ("D", 600),
            ("E", 200),
            ("F", 500),
            ("G", 400),
        ] {
            snapshot = snapshot.with_position(symbol, Decimal::from(value));
        }

        let assessment = risk_assessment(&snapshot);
        let top: Vec<&str> = assessment
            .top_concentrations
            .iter()
            .map(|c| c.symbol.as_str())
            .collect();
        assert_eq!(top, vec!["B", "D", "F", "G", "C"]);
        assert_eq!(assessment.top_concentrations[0].concentration_pct, dec!(25));
        assert_eq!(assessment.top_concentrations[0].market_value, dec!(700));
        assert_eq!(assessment.num_significant_positions, 7);
    }

    #[test]
    fn test_valueless_portfolio_assessment() {
        let assessment = risk_assessment(&PortfolioSnapshot::new(Decimal::ZERO));
        assert_eq!(assessment.max_concentration_pct, Decimal::ZERO);
        assert_eq!(assessment.risk_score, dec!(20));
        assert_eq!(assessment.risk_level, RiskLevel::Low);
        assert!(assessment.top_concentrations.is_empty());
    }
}
