//! Dollar-value netting of opposite-side rebalance trades.
//!
//! Each BUY is funded from SELL proceeds, largest first, to reduce the number
//! of transactions. Netting ignores symbols: a BUY of one symbol can absorb a
//! SELL of an unrelated one, so equal and opposite breaches cancel entirely.

use super::snapshot::RebalanceAction;
use crate::types::Side;
use rust_decimal::Decimal;
use tracing::debug;

/// Net BUY actions against SELL actions.
///
/// Both sides are sorted by value descending before netting, ties keeping
/// input order. Output holds the surviving BUYs, then the surviving SELLs, in
/// that pre-netting order and carrying only the unabsorbed remainder.
pub fn optimize(actions: &[RebalanceAction]) -> Vec<RebalanceAction> {
    let mut buys: Vec<RebalanceAction> = by_side(actions, Side::Buy);
    let mut sells: Vec<RebalanceAction> = by_side(actions, Side::Sell);

    let mut netted = Vec::with_capacity(actions.len());

    for buy in buys.iter_mut() {
        let mut remaining = buy.value;

        for sell in sells.iter_mut() {
            if remaining <= Decimal::ZERO {
                break;
            }
            if sell.value <= Decimal::ZERO {
                continue;
            }
            let amount = remaining.min(sell.value);
            sell.value -= amount;
            remaining -= amount;

            debug!(
                buy = %buy.symbol,
                sell = %sell.symbol,
                %amount,
                "Netted rebalance trades"
            );
        }

        if remaining > Decimal::ZERO {
            buy.value = remaining;
            netted.push(buy.clone());
        }
    }

    netted.extend(sells.into_iter().filter(|s| s.value > Decimal::ZERO));
    netted
}

fn by_side(actions: &[RebalanceAction], side: Side) -> Vec<RebalanceAction> {
    let mut selected: Vec<RebalanceAction> =
        actions.iter().filter(|a| a.side == side).cloned().collect();
    // Stable: equal values keep their original relative order.
    selected.sort_by(|a, b| b.value.cmp(&a.value));
    selected
}
