//! Grid ladder generation and trigger detection.

use super::types::{
    FillCarryPolicy, FillDetails, GridAction, GridLevel, GridLevelConfig, GridStatistics,
    LadderMode, SpacingUpdate,
};
use crate::config::GridSettings;
use crate::error::{EngineError, Result};
use crate::types::Side;
use crate::utils::decimal::{from_percent, safe_div};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Generate the full ladder for a config.
///
/// BUY tiers `-1..=-num_levels_down` come first, then SELL tiers
/// `1..=num_levels_up`. Every level starts unfilled.
pub fn generate_levels(config: &GridLevelConfig) -> Result<Vec<GridLevel>> {
    validate(config)?;

    let capacity = (config.num_levels_down + config.num_levels_up) as usize;
    let mut levels = Vec::with_capacity(capacity);

    for i in 1..=config.num_levels_down {
        levels.push(GridLevel::unfilled(
            -i,
            tier_price(config, i, Side::Buy)?,
            Side::Buy,
            config.position_size,
        ));
    }

    for i in 1..=config.num_levels_up {
        levels.push(GridLevel::unfilled(
            i,
            tier_price(config, i, Side::Sell)?,
            Side::Sell,
            config.position_size,
        ));
    }

    info!(
        symbol = %config.symbol,
        base_price = %config.base_price,
        spacing = %config.grid_spacing,
        buy_levels = config.num_levels_down,
        sell_levels = config.num_levels_up,
        "Generated grid ladder"
    );

    Ok(levels)
}

fn validate(config: &GridLevelConfig) -> Result<()> {
    if config.ladder_mode != LadderMode::Percentage {
        return Err(EngineError::UnsupportedLadderMode(config.ladder_mode));
    }
    if config.base_price <= Decimal::ZERO {
        return Err(EngineError::invalid("base_price", "must be positive"));
    }
    if config.grid_spacing <= Decimal::ZERO {
        return Err(EngineError::invalid("grid_spacing", "must be positive"));
    }
    if config.num_levels_up < 0 {
        return Err(EngineError::invalid("num_levels_up", "must not be negative"));
    }
    if config.num_levels_down < 0 {
        return Err(EngineError::invalid("num_levels_down", "must not be negative"));
    }
    Ok(())
}

/// `base_price x (1 -/+ spacing x tier / 100)`.
///
/// Deep BUY tiers may reach zero or go negative; such levels are still
/// generated and simply never fire for a positive price.
fn tier_price(config: &GridLevelConfig, tier: i32, side: Side) -> Result<Decimal> {
    let offset = config
        .grid_spacing
        .checked_mul(Decimal::from(tier))
        .map(from_percent)
        .ok_or_else(|| EngineError::invalid("grid_spacing", "tier offset overflows"))?;

    let factor = match side {
        Side::Buy => Decimal::ONE - offset,
        Side::Sell => Decimal::ONE + offset,
    };

    config
        .base_price
        .checked_mul(factor)
        .ok_or_else(|| EngineError::invalid("base_price", "tier price overflows"))
}

/// Propose an action for every unfilled level crossed by `current_price`.
///
/// All qualifying levels fire in one call, so a price gap catches up on every
/// skipped tier. Levels are never mutated here: until the caller records a fill
/// with [`mark_filled`], the same level fires again at the same price.
pub fn check_triggers(levels: &[GridLevel], current_price: Decimal) -> Vec<GridAction> {
    let actions: Vec<GridAction> = levels
        .iter()
        .filter(|level| !level.is_filled && level.is_crossed_by(current_price))
        .map(|level| GridAction {
            level_number: level.level_number,
            side: level.side,
            value: level.target_allocation,
            price: current_price,
        })
        .collect();

    debug!(
        %current_price,
        levels = levels.len(),
        fired = actions.len(),
        "Checked grid triggers"
    );

    actions
}

/// Record a fill on one level. This is the only mutation of a level set.
pub fn mark_filled<'a>(
    levels: &'a mut [GridLevel],
    level_number: i32,
    fill: &FillDetails,
) -> Result<&'a GridLevel> {
    let level = levels
        .iter_mut()
        .find(|l| l.level_number == level_number)
        .ok_or(EngineError::UnknownLevel(level_number))?;

    if level.is_filled {
        warn!(level_number, "Rejected fill on already-filled level");
        return Err(EngineError::AlreadyFilled(level_number));
    }

    level.apply_fill(fill);

    info!(
        level_number,
        side = %level.side,
        price = %fill.price,
        quantity = %fill.quantity,
        "Grid level filled"
    );

    Ok(level)
}

/// Summarize fill progress and the price range of a level set.
pub fn statistics(levels: &[GridLevel]) -> GridStatistics {
    let count = |side: Side, filled_only: bool| {
        levels
            .iter()
            .filter(|l| l.side == side && (!filled_only || l.is_filled))
            .count()
    };

    let total_levels = levels.len();
    let filled_levels = levels.iter().filter(|l| l.is_filled).count();

    GridStatistics {
        total_levels,
        filled_levels,
        utilization_rate: safe_div(
            Decimal::from(filled_levels as u64),
            Decimal::from(total_levels as u64),
        ),
        buy_levels: count(Side::Buy, false),
        sell_levels: count(Side::Sell, false),
        buy_levels_filled: count(Side::Buy, true),
        sell_levels_filled: count(Side::Sell, true),
        min_price: levels.iter().map(|l| l.trigger_price).min(),
        max_price: levels.iter().map(|l| l.trigger_price).max(),
    }
}

/// Adapts ladder spacing to observed volatility.
#[derive(Debug, Clone, Default)]
pub struct GridLevelEngine {
    settings: GridSettings,
}

impl GridLevelEngine {
    pub fn new(settings: GridSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    /// `clamp(volatility / reference_volatility, min, max)`.
    pub fn spacing_multiplier(&self, volatility: Decimal) -> Decimal {
        let ratio = safe_div(volatility, self.settings.reference_volatility);
        ratio
            .max(self.settings.min_spacing_multiplier)
            .min(self.settings.max_spacing_multiplier)
    }

    /// Rescale the config's spacing by volatility and regenerate the ladder.
    ///
    /// `prior_levels` is the set being replaced; `policy` decides whether its
    /// fills survive on the tier with the same level number.
    pub fn update_spacing(
        &self,
        config: &GridLevelConfig,
        volatility: Decimal,
        prior_levels: &[GridLevel],
        policy: FillCarryPolicy,
    ) -> Result<SpacingUpdate> {
        let multiplier = self.spacing_multiplier(volatility);

        let mut updated = config.clone();
        updated.grid_spacing = config
            .grid_spacing
            .checked_mul(multiplier)
            .ok_or_else(|| EngineError::invalid("grid_spacing", "rescaled spacing overflows"))?;

        let mut levels = generate_levels(&updated)?;

        let prior_fills: Vec<&GridLevel> = prior_levels.iter().filter(|l| l.is_filled).collect();
        let mut carried_fills = 0;

        if policy == FillCarryPolicy::ReassociateByTier {
            for prior in &prior_fills {
                if let Some(level) = levels
                    .iter_mut()
                    .find(|l| l.level_number == prior.level_number)
                {
                    level.is_filled = true;
                    level.filled_price = prior.filled_price;
                    level.filled_quantity = prior.filled_quantity;
                    level.last_triggered = prior.last_triggered;
                    carried_fills += 1;
                }
            }
        }

        let dropped_fills = prior_fills.len() - carried_fills;
        if dropped_fills > 0 {
            warn!(
                symbol = %config.symbol,
                dropped_fills,
                ?policy,
                "Spacing update discarded recorded fills"
            );
        }

        info!(
            symbol = %config.symbol,
            %volatility,
            %multiplier,
            old_spacing = %config.grid_spacing,
            new_spacing = %updated.grid_spacing,
            carried_fills,
            "Grid spacing updated"
        );

        Ok(SpacingUpdate {
            config: updated,
            levels,
            multiplier,
            carried_fills,
            dropped_fills,
        })
    }
}
