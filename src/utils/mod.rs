//! Shared utilities.

pub mod decimal;

pub use decimal::{from_percent, round_to_precision, safe_div, to_percent};
