//! # GridTrader
//!
//! Decision engines for systematic trading: a grid ladder that turns a base
//! price into BUY/SELL thresholds and detects when price crosses them, and a
//! portfolio rebalancer that proposes, nets and risk-scores allocation trades.
//!
//! Both engines are pure computations over in-memory inputs. They only emit
//! proposed actions; executing and persisting fills belongs to the caller.
//!
//! ## Architecture
//!
//! - `grid`: Ladder generation, trigger detection, fill recording, spacing updates
//! - `rebalance`: Allocation drift, trade netting, concentration metrics
//! - `config`: Configuration management and validation
//! - `persistence`: SQLite-backed grid state for orchestrators
//! - `error`: Engine error types
//! - `utils`: Shared utilities and decimal arithmetic

pub mod config;
pub mod error;
pub mod grid;
pub mod persistence;
pub mod rebalance;
pub mod types;
pub mod utils;

pub use config::Config;
pub use error::{EngineError, Result};
pub use types::Side;
