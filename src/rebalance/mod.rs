//! Portfolio rebalancing.
//!
//! Contains the logic for:
//! - Allocation drift detection against per-symbol bands
//! - Dollar-value netting of opposite-side trades
//! - Concentration and diversification risk metrics
//! - A 0-100 concentration risk score

mod metrics;
mod netting;
mod rebalancer;
mod snapshot;

pub use metrics::{
    risk_assessment, risk_metrics, Concentration, RiskAssessment, RiskLevel, RiskMetrics,
};
pub use netting::optimize;
pub use rebalancer::PortfolioRebalancer;
pub use snapshot::{PortfolioSnapshot, RebalanceAction, RebalancePlan};
