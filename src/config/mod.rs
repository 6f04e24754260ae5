//! Configuration management for the grid and rebalancing engines.
//!
//! Loads settings from environment variables and config files.

use crate::grid::FillCarryPolicy;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Grid ladder behavior
    #[serde(default)]
    pub grid: GridSettings,
    /// Portfolio rebalancing behavior
    #[serde(default)]
    pub rebalance: RebalanceSettings,
    /// Grid state storage
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSettings {
    /// Volatility at which spacing stays at its configured value (e.g., 0.02 = 2%)
    #[serde(default = "default_reference_volatility")]
    pub reference_volatility: Decimal,
    /// Lower bound on the volatility spacing factor
    #[serde(default = "default_min_spacing_multiplier")]
    pub min_spacing_multiplier: Decimal,
    /// Upper bound on the volatility spacing factor
    #[serde(default = "default_max_spacing_multiplier")]
    pub max_spacing_multiplier: Decimal,
    /// What happens to recorded fills when spacing changes
    #[serde(default)]
    pub fill_carry: FillCarryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceSettings {
    /// Band in percentage points for symbols without their own
    #[serde(default = "default_band")]
    pub default_band: Decimal,
    /// Act on the netted list instead of the raw proposals
    #[serde(default = "default_apply_netting")]
    pub apply_netting: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

// Default value functions
fn default_reference_volatility() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

fn default_min_spacing_multiplier() -> Decimal {
    Decimal::new(5, 1) // 0.5x
}

fn default_max_spacing_multiplier() -> Decimal {
    Decimal::new(2, 0) // 2.0x
}

fn default_band() -> Decimal {
    Decimal::new(5, 0) // 5 percentage points
}

fn default_apply_netting() -> bool {
    true
}

fn default_db_path() -> String {
    "data/gridtrader.db".to_string()
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .prefix("GRIDTRADER"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.grid.reference_volatility > Decimal::ZERO,
            "reference_volatility must be positive"
        );

        anyhow::ensure!(
            self.grid.min_spacing_multiplier > Decimal::ZERO
                && self.grid.min_spacing_multiplier <= Decimal::ONE
                && self.grid.max_spacing_multiplier >= Decimal::ONE,
            "spacing multipliers must satisfy 0 < min <= 1 <= max"
        );

        anyhow::ensure!(
            self.rebalance.default_band >= Decimal::ZERO,
            "default_band must not be negative"
        );

        Ok(())
    }
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            reference_volatility: default_reference_volatility(),
            min_spacing_multiplier: default_min_spacing_multiplier(),
            max_spacing_multiplier: default_max_spacing_multiplier(),
            fill_carry: FillCarryPolicy::default(),
        }
    }
}

impl Default for RebalanceSettings {
    fn default() -> Self {
        Self {
            default_band: default_band(),
            apply_netting: default_apply_netting(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}
