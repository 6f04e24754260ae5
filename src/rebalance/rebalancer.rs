//! Allocation drift detection.

use super::netting::optimize;
use super::snapshot::{PortfolioSnapshot, RebalanceAction, RebalancePlan};
use crate::config::RebalanceSettings;
use crate::types::Side;
use crate::utils::decimal::{from_percent, safe_div, to_percent};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Compares current allocations against targets and proposes corrective trades.
#[derive(Debug, Clone, Default)]
pub struct PortfolioRebalancer {
    settings: RebalanceSettings,
}

impl PortfolioRebalancer {
    pub fn new(settings: RebalanceSettings) -> Self {
        Self { settings }
    }

    /// Propose one trade per target symbol whose allocation is outside its band.
    ///
    /// The plan carries both the raw proposals and their netted form.
    pub fn compute_actions(&self, snapshot: &PortfolioSnapshot) -> RebalancePlan {
        let total_value = snapshot.total_value;
        let mut proposed = Vec::new();

        for (symbol, target_pct) in &snapshot.allocation_targets {
            let current_value = snapshot.position_value(symbol);
            let current_pct = if total_value > Decimal::ZERO {
                safe_div(current_value, total_value)
            } else {
                Decimal::ZERO
            };

            let target_allocation = from_percent(*target_pct);
            let deviation = (current_pct - target_allocation).abs();
            let band = from_percent(
                snapshot
                    .rebalance_bands
                    .get(symbol)
                    .copied()
                    .unwrap_or(self.settings.default_band),
            );

            debug!(
                %symbol,
                %current_pct,
                target = %target_allocation,
                %deviation,
                %band,
                "Checked allocation drift"
            );

            if deviation <= band {
                continue;
            }

            let trade_value = total_value * target_allocation - current_value;
            let side = if trade_value > Decimal::ZERO {
                Side::Buy
            } else {
                Side::Sell
            };

            proposed.push(RebalanceAction {
                symbol: symbol.clone(),
                side,
                value: trade_value.abs(),
                deviation,
                reason: format!("Outside rebalance band by {:.2}%", to_percent(deviation)),
            });
        }

        let netted = optimize(&proposed);

        if !proposed.is_empty() && netted.is_empty() {
            warn!(
                proposed = proposed.len(),
                "Cross-symbol netting cancelled every out-of-band trade"
            );
        }

        info!(
            %total_value,
            proposed = proposed.len(),
            netted = netted.len(),
            netting_applied = self.settings.apply_netting,
            "Computed rebalance plan"
        );

        RebalancePlan {
            proposed,
            netted,
            netting_applied: self.settings.apply_netting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sixty_forty() -> PortfolioSnapshot {
        PortfolioSnapshot::new(dec!(10000))
            .with_position("AAPL", dec!(6000))
            .with_position("BONDS", dec!(4000))
            .with_target("AAPL", dec!(50))
            .with_target("BONDS", dec!(50))
            .with_band("AAPL", dec!(5))
            .with_band("BONDS", dec!(5))
    }

    #[test]
    fn test_out_of_band_symbols_propose_trades() {
        let plan = PortfolioRebalancer::default().compute_actions(&sixty_forty());

        assert_eq!(plan.proposed.len(), 2);
        let aapl = &plan.proposed[0];
        assert_eq!(aapl.symbol, "AAPL");
        assert_eq!(aapl.side, Side::Sell);
        assert_eq!(aapl.value, dec!(1000));
        assert_eq!(aapl.deviation, dec!(0.1));
        assert_eq!(aapl.reason, "Outside rebalance band by 10.00%");

        let bonds = &plan.proposed[1];
        assert_eq!(bonds.symbol, "BONDS");
        assert_eq!(bonds.side, Side::Buy);
        assert_eq!(bonds.value, dec!(1000));
    }

    #[test]
    fn test_netting_cancels_real_cross_symbol_deviations() {
        let plan = PortfolioRebalancer::default().compute_actions(&sixty_forty());

        // Both symbols breach their band, yet the net dollar amounts cancel.
        assert!(plan.netted.is_empty());
        assert!(plan.actions().is_empty());
        assert!(plan.netting_erased_deviations());
    }

    #[test]
    fn test_netting_can_be_disabled() {
        let rebalancer = PortfolioRebalancer::new(RebalanceSettings {
            apply_netting: false,
            ..Default::default()
        });
        let plan = rebalancer.compute_actions(&sixty_forty());
        assert_eq!(plan.actions().len(), 2);
        assert!(plan.netted.is_empty());
    }

    #[test]
    fn test_on_target_portfolio_is_quiet() {
        let snapshot = PortfolioSnapshot::new(dec!(10000))
            .with_position("AAPL", dec!(5000))
            .with_position("BONDS", dec!(5000))
            .with_target("AAPL", dec!(50))
            .with_target("BONDS", dec!(50));

        let plan = PortfolioRebalancer::default().compute_actions(&snapshot);
        assert!(plan.proposed.is_empty());
        assert!(plan.netted.is_empty());
        assert!(!plan.netting_erased_deviations());
    }

    #[test]
    fn test_deviation_equal_to_band_is_within_band() {
        let snapshot = PortfolioSnapshot::new(dec!(10000))
            .with_position("AAPL", dec!(5500))
            .with_target("AAPL", dec!(50));

        let plan = PortfolioRebalancer::default().compute_actions(&snapshot);
        assert!(plan.proposed.is_empty());
    }

    #[test]
    fn test_default_band_applies_when_absent() {
        let snapshot = PortfolioSnapshot::new(dec!(10000))
            .with_position("AAPL", dec!(5600))
            .with_target("AAPL", dec!(50));

        let plan = PortfolioRebalancer::default().compute_actions(&snapshot);
        assert_eq!(plan.proposed.len(), 1);
        assert_eq!(plan.proposed[0].side, Side::Sell);
        assert_eq!(plan.proposed[0].value, dec!(600));

        let tight = PortfolioRebalancer::new(RebalanceSettings {
            default_band: dec!(10),
            ..Default::default()
        });
        assert!(tight.compute_actions(&snapshot).proposed.is_empty());
    }

    #[test]
    fn test_missing_position_is_bought_up_to_target() {
        let snapshot = PortfolioSnapshot::new(dec!(20000))
            .with_position("VTI", dec!(20000))
            .with_target("VTI", dec!(70))
            .with_target("GLD", dec!(30));

        let plan = PortfolioRebalancer::default().compute_actions(&snapshot);
        let gld = plan.proposed.iter().find(|a| a.symbol == "GLD").unwrap();
        assert_eq!(gld.side, Side::Buy);
        assert_eq!(gld.value, dec!(6000));

        // VTI sells 6000, which fully funds the GLD buy.
        assert!(plan.netted.is_empty());
    }

    #[test]
    fn test_empty_portfolio_does_not_divide_by_zero() {
        let snapshot = PortfolioSnapshot::new(Decimal::ZERO).with_target("AAPL", dec!(50));

        let plan = PortfolioRebalancer::default().compute_actions(&snapshot);
        assert_eq!(plan.proposed.len(), 1);
        assert_eq!(plan.proposed[0].value, Decimal::ZERO);
        assert!(plan.netted.is_empty());
    }

    #[test]
    fn test_partial_netting_keeps_remainder() {
        let snapshot = PortfolioSnapshot::new(dec!(10000))
            .with_position("AAPL", dec!(7000))
            .with_position("BONDS", dec!(3000))
            .with_target("AAPL", dec!(40))
            .with_target("BONDS", dec!(40))
            .with_target("GLD", dec!(20));

        let plan = PortfolioRebalancer::default().compute_actions(&snapshot);
        // SELL AAPL 3000, BUY BONDS 1000, BUY GLD 2000.
        assert_eq!(plan.proposed.len(), 3);
        assert!(plan.netted.is_empty());

        let snapshot = snapshot.with_position("AAPL", dec!(6000)).with_position("CASH", dec!(1000));
        let plan = PortfolioRebalancer::default().compute_actions(&snapshot);
        // SELL AAPL 2000 against BUY GLD 2000 and BUY BONDS 1000.
        assert_eq!(plan.netted.len(), 1);
        assert_eq!(plan.netted[0].symbol, "BONDS");
        assert_eq!(plan.netted[0].value, dec!(1000));
    }
}
