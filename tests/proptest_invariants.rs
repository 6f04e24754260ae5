//! Property-based invariants for the grid and rebalancing engines.
//!
//! These tests use proptest to verify that key invariants hold
//! across randomly generated ladders and portfolios.

use gridtrader::grid::{
    check_triggers, generate_levels, GridLevelConfig, GridLevelEngine, LadderMode,
};
use gridtrader::rebalance::{optimize, risk_metrics, PortfolioSnapshot, RebalanceAction};
use gridtrader::Side;
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Price in cents, 1.00 .. 100000.00
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (100i64..=10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Spacing in basis points of percent, 0.01% .. 4.99%
fn spacing_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=499i64).prop_map(|bps| Decimal::new(bps, 2))
}

fn config_strategy() -> impl Strategy<Value = GridLevelConfig> {
    (price_strategy(), spacing_strategy(), 0i32..=20, 0i32..=20).prop_map(
        |(base_price, grid_spacing, up, down)| GridLevelConfig {
            symbol: "TEST".to_string(),
            base_price,
            grid_spacing,
            num_levels_up: up,
            num_levels_down: down,
            position_size: Decimal::new(1000, 0),
            total_investment: Decimal::ZERO,
            ladder_mode: LadderMode::Percentage,
        },
    )
}

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Buy), Just(Side::Sell)]
}

fn action_strategy() -> impl Strategy<Value = RebalanceAction> {
    ("[A-Z]{3,4}", side_strategy(), 0i64..=1_000_000i64).prop_map(|(symbol, side, cents)| {
        RebalanceAction {
            symbol,
            side,
            value: Decimal::new(cents, 2),
            deviation: Decimal::ZERO,
            reason: String::new(),
        }
    })
}

fn total(actions: &[RebalanceAction], side: Side) -> Decimal {
    actions
        .iter()
        .filter(|a| a.side == side)
        .map(|a| a.value)
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // ========================================================================
    // LADDER SHAPE
    // ========================================================================

    /// Level count matches config and tiers are strictly ordered away from base
    #[test]
    fn ladder_is_symmetric_and_ordered(config in config_strategy()) {
        let levels = generate_levels(&config).unwrap();
        prop_assert_eq!(
            levels.len(),
            (config.num_levels_up + config.num_levels_down) as usize
        );

        let mut numbers: Vec<i32> = levels.iter().map(|l| l.level_number).collect();
        numbers.sort_unstable();
        numbers.dedup();
        prop_assert_eq!(numbers.len(), levels.len(), "level numbers must be unique");

        for level in &levels {
            prop_assert!(!level.is_filled);
            match level.side {
                Side::Buy => {
                    prop_assert!(level.level_number < 0);
                    prop_assert!(level.trigger_price < config.base_price);
                    prop_assert!(level.trigger_price > Decimal::ZERO);
                }
                Side::Sell => {
                    prop_assert!(level.level_number > 0);
                    prop_assert!(level.trigger_price > config.base_price);
                }
            }
        }

        for pair in levels.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if a.side == b.side {
                prop_assert!(a.level_number.abs() < b.level_number.abs());
                match a.side {
                    Side::Buy => prop_assert!(a.trigger_price > b.trigger_price),
                    Side::Sell => prop_assert!(a.trigger_price < b.trigger_price),
                }
            }
        }
    }

    // ========================================================================
    // TRIGGERS
    // ========================================================================

    /// Repeated checks against an unchanged set return the same actions
    #[test]
    fn trigger_check_is_idempotent(config in config_strategy(), price in price_strategy()) {
        let levels = generate_levels(&config).unwrap();
        prop_assert_eq!(check_triggers(&levels, price), check_triggers(&levels, price));
    }

    /// Every fired level is crossed, every crossed unfilled level fires
    #[test]
    fn fired_levels_are_exactly_the_crossed_ones(
        config in config_strategy(),
        price in price_strategy(),
    ) {
        let levels = generate_levels(&config).unwrap();
        let fired: Vec<i32> = check_triggers(&levels, price)
            .iter()
            .map(|a| a.level_number)
            .collect();
        let crossed: Vec<i32> = levels
            .iter()
            .filter(|l| l.is_crossed_by(price))
            .map(|l| l.level_number)
            .collect();
        prop_assert_eq!(fired, crossed);
    }

    // ========================================================================
    // SPACING
    // ========================================================================

    /// Spacing stays within [0.5x, 2.0x] of its pre-update value
    #[test]
    fn spacing_update_is_clamped(
        config in config_strategy(),
        volatility_bps in -10_000i64..=100_000i64,
    ) {
        let volatility = Decimal::new(volatility_bps, 4);
        let update = GridLevelEngine::default()
            .update_spacing(&config, volatility, &[], Default::default())
            .unwrap();
        prop_assert_eq!(
            update.levels.len(),
            (config.num_levels_up + config.num_levels_down) as usize
        );

        let lower = config.grid_spacing * Decimal::new(5, 1);
        let upper = config.grid_spacing * Decimal::new(2, 0);
        prop_assert!(update.config.grid_spacing >= lower);
        prop_assert!(update.config.grid_spacing <= upper);
    }

    // ========================================================================
    // NETTING AND METRICS
    // ========================================================================

    /// Netting removes the same dollar amount from both sides
    #[test]
    fn netting_conserves_net_value(
        actions in prop::collection::vec(action_strategy(), 0..12),
    ) {
        let netted = optimize(&actions);

        let net_before = total(&actions, Side::Buy) - total(&actions, Side::Sell);
        let net_after = total(&netted, Side::Buy) - total(&netted, Side::Sell);
        prop_assert_eq!(net_before, net_after);

        prop_assert!(netted.iter().all(|a| a.value > Decimal::ZERO));
        // Only one side can survive netting.
        prop_assert!(total(&netted, Side::Buy).is_zero() || total(&netted, Side::Sell).is_zero());
    }

    /// Concentrations of a fully invested portfolio sum to one
    #[test]
    fn concentrations_sum_to_one(
        values in prop::collection::vec(1i64..=1_000_000i64, 1..10),
    ) {
        let mut snapshot = PortfolioSnapshot::default();
        for (i, cents) in values.iter().enumerate() {
            snapshot = snapshot.with_position(&format!("S{i}"), Decimal::new(*cents, 2));
        }
        snapshot.total_value = snapshot.positions.values().copied().sum();

        let metrics = risk_metrics(&snapshot);
        let sum: Decimal = metrics.concentrations.values().copied().sum();
        prop_assert!((sum - Decimal::ONE).abs() < Decimal::new(1, 20));
        prop_assert!(metrics.herfindahl_index <= Decimal::ONE);
        prop_assert!(metrics.diversification_ratio >= Decimal::ONE - Decimal::new(1, 20));
        prop_assert_eq!(metrics.num_positions, values.len());
    }
}
