//! Grid ladder engine.
//!
//! Derives a symmetric price ladder from a base price and spacing, and decides
//! which untriggered levels a market price has crossed:
//! - `engine`: pure generation, trigger checks, fill recording and statistics
//! - `book`: per-config exclusive evaluate-then-commit contract

mod book;
mod engine;
mod types;

pub use book::{Evaluation, GridBook, GridSession};
pub use engine::{check_triggers, generate_levels, mark_filled, statistics, GridLevelEngine};
pub use types::{
    FillCarryPolicy, FillDetails, GridAction, GridLevel, GridLevelConfig, GridStatistics,
    LadderMode, SpacingUpdate,
};
