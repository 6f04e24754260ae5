//! Per-config ownership of a level set.
//!
//! A [`GridBook`] serializes trigger-check-then-fill sequences for one grid so
//! that two callers can never both observe a level as unfilled and both fill it.
//! Callers either hold a [`GridSession`] across the whole sequence, or commit
//! through [`GridBook::commit_versioned`] with the version they evaluated at.

use super::engine::{self, GridLevelEngine};
use super::types::{
    FillCarryPolicy, FillDetails, GridAction, GridLevel, GridLevelConfig, GridStatistics,
    SpacingUpdate,
};
use crate::error::{EngineError, Result};
use rust_decimal::Decimal;
use std::sync::{Mutex, MutexGuard, TryLockError};
use tracing::{debug, warn};

#[derive(Debug)]
struct BookState {
    config: GridLevelConfig,
    levels: Vec<GridLevel>,
    version: u64,
}

/// Trigger evaluation tagged with the level-set version it was computed on.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub version: u64,
    pub actions: Vec<GridAction>,
}

/// One grid config and its level set, guarded for exclusive evaluation.
#[derive(Debug)]
pub struct GridBook {
    engine: GridLevelEngine,
    state: Mutex<BookState>,
}

impl GridBook {
    /// Generate the ladder for `config` and take ownership of it.
    pub fn new(engine: GridLevelEngine, config: GridLevelConfig) -> Result<Self> {
        let levels = engine::generate_levels(&config)?;
        Ok(Self::from_levels(engine, config, levels, 0))
    }

    /// Wrap an existing level set, e.g. one restored from storage.
    pub fn from_levels(
        engine: GridLevelEngine,
        config: GridLevelConfig,
        levels: Vec<GridLevel>,
        version: u64,
    ) -> Self {
        Self {
            engine,
            state: Mutex::new(BookState {
                config,
                levels,
                version,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BookState>> {
        self.state.lock().map_err(|_| EngineError::LockPoisoned)
    }

    /// Block until no other session holds this grid.
    pub fn session(&self) -> Result<GridSession<'_>> {
        Ok(GridSession { state: self.lock()? })
    }

    /// Open a session only if no evaluation is in flight.
    pub fn try_session(&self) -> Result<GridSession<'_>> {
        match self.state.try_lock() {
            Ok(state) => Ok(GridSession { state }),
            Err(TryLockError::WouldBlock) => Err(EngineError::EvaluationInFlight),
            Err(TryLockError::Poisoned(_)) => Err(EngineError::LockPoisoned),
        }
    }

    /// Evaluate triggers without holding the grid afterwards.
    pub fn evaluate(&self, current_price: Decimal) -> Result<Evaluation> {
        let state = self.lock()?;
        Ok(Evaluation {
            version: state.version,
            actions: engine::check_triggers(&state.levels, current_price),
        })
    }

    /// Record a fill only if the level set is still at `expected_version`.
    pub fn commit_versioned(
        &self,
        expected_version: u64,
        level_number: i32,
        fill: &FillDetails,
    ) -> Result<GridLevel> {
        let mut state = self.lock()?;
        if state.version != expected_version {
            warn!(
                symbol = %state.config.symbol,
                expected = expected_version,
                actual = state.version,
                level_number,
                "Rejected fill against stale level set"
            );
            return Err(EngineError::StaleVersion {
                expected: expected_version,
                actual: state.version,
            });
        }
        commit(&mut state, level_number, fill)
    }

    /// Rescale spacing by volatility and replace the level set.
    pub fn update_spacing(
        &self,
        volatility: Decimal,
        policy: FillCarryPolicy,
    ) -> Result<SpacingUpdate> {
        let mut state = self.lock()?;
        let update = self
            .engine
            .update_spacing(&state.config, volatility, &state.levels, policy)?;

        state.config = update.config.clone();
        state.levels = update.levels.clone();
        state.version += 1;

        Ok(update)
    }

    pub fn statistics(&self) -> Result<GridStatistics> {
        Ok(engine::statistics(&self.lock()?.levels))
    }

    pub fn version(&self) -> Result<u64> {
        Ok(self.lock()?.version)
    }

    pub fn config(&self) -> Result<GridLevelConfig> {
        Ok(self.lock()?.config.clone())
    }

    pub fn levels(&self) -> Result<Vec<GridLevel>> {
        Ok(self.lock()?.levels.clone())
    }
}

fn commit(state: &mut BookState, level_number: i32, fill: &FillDetails) -> Result<GridLevel> {
    let level = engine::mark_filled(&mut state.levels, level_number, fill)?.clone();
    state.version += 1;
    debug!(
        symbol = %state.config.symbol,
        version = state.version,
        level_number,
        "Committed grid fill"
    );
    Ok(level)
}

/// Exclusive hold on a grid for one evaluate-then-commit sequence.
pub struct GridSession<'a> {
    state: MutexGuard<'a, BookState>,
}

impl GridSession<'_> {
    /// Pure trigger check against the held level set.
    pub fn evaluate(&self, current_price: Decimal) -> Vec<GridAction> {
        engine::check_triggers(&self.state.levels, current_price)
    }

    /// Record a fill for an action returned by [`GridSession::evaluate`].
    pub fn commit(&mut self, level_number: i32, fill: &FillDetails) -> Result<GridLevel> {
        commit(&mut self.state, level_number, fill)
    }

    pub fn version(&self) -> u64 {
        self.state.version
    }

    pub fn levels(&self) -> &[GridLevel] {
        &self.state.levels
    }

    pub fn config(&self) -> &GridLevelConfig {
        &self.state.config
    }
}
