//! GridTrader - command line orchestrator
//!
//! Thin wrapper over the library: builds and evaluates grid ladders, records
//! fills in the SQLite store, and prints rebalance plans for portfolio snapshots.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use gridtrader::config::Config;
use gridtrader::grid::{
    self, FillDetails, GridLevel, GridLevelConfig, GridLevelEngine, LadderMode,
};
use gridtrader::persistence::GridStore;
use gridtrader::rebalance::{
    risk_assessment, risk_metrics, PortfolioRebalancer, PortfolioSnapshot, RebalanceAction,
    RebalancePlan, RiskAssessment, RiskMetrics,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// GridTrader CLI
#[derive(Parser)]
#[command(name = "gridtrader")]
#[command(version, about = "Grid ladder triggers and portfolio rebalancing")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Override the SQLite database path from configuration
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a grid ladder, optionally checking a price against it
    Grid {
        /// Instrument symbol
        #[arg(short, long)]
        symbol: String,

        /// Center price of the ladder
        #[arg(short, long)]
        base_price: Decimal,

        /// Spacing between tiers in percent
        #[arg(long, default_value = "5")]
        spacing: Decimal,

        /// Number of SELL tiers above base price
        #[arg(long, default_value_t = 10)]
        up: i32,

        /// Number of BUY tiers below base price
        #[arg(long, default_value_t = 10)]
        down: i32,

        /// Amount transacted per tier
        #[arg(long)]
        position_size: Decimal,

        /// Capital earmarked for the grid (default: size x buy tiers)
        #[arg(long)]
        total_investment: Option<Decimal>,

        /// Check triggers at this market price
        #[arg(short, long)]
        price: Option<Decimal>,

        /// Rescale spacing for this observed volatility (0.02 = 2%)
        #[arg(long)]
        volatility: Option<Decimal>,

        /// Persist the ladder to the grid store
        #[arg(long)]
        save: bool,
    },

    /// Record a fill on a stored grid level
    ///
    /// Pass `--expected-version` with the version the level was evaluated at
    /// (shown by `status`) so a fill against a changed grid is rejected.
    /// Without it the fill is a manual override against the current version.
    /// Whether the level actually triggered is not checked.
    Fill {
        /// Stored grid id
        #[arg(short, long)]
        grid: i64,

        /// Level number (negative = BUY tier)
        #[arg(short, long, allow_hyphen_values = true)]
        level: i32,

        /// Execution price
        #[arg(short, long)]
        price: Decimal,

        /// Executed quantity
        #[arg(short, long)]
        quantity: Decimal,

        /// Grid version the fill was decided against
        #[arg(long)]
        expected_version: Option<u64>,
    },

    /// Print the rebalance plan and risk metrics for a portfolio snapshot
    Rebalance {
        /// Path to a JSON portfolio snapshot
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Show stored grids and their fill progress
    Status {
        /// Show every level
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Serialize)]
struct RebalanceReport<'a> {
    plan: &'a RebalancePlan,
    risk: &'a RiskMetrics,
    assessment: &'a RiskAssessment,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = init_logging(cli.json_logs)?;

    let mut config = Config::load()?;
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }
    config.validate()?;

    match cli.command {
        Commands::Grid {
            symbol,
            base_price,
            spacing,
            up,
            down,
            position_size,
            total_investment,
            price,
            volatility,
            save,
        } => {
            let mut grid_config = GridLevelConfig {
                symbol: symbol.to_uppercase(),
                base_price,
                grid_spacing: spacing,
                num_levels_up: up,
                num_levels_down: down,
                position_size,
                total_investment: Decimal::ZERO,
                ladder_mode: LadderMode::Percentage,
            };
            grid_config.total_investment =
                total_investment.unwrap_or_else(|| grid_config.capital_required());
            run_grid(&config, grid_config, price, volatility, save)
        }
        Commands::Fill {
            grid,
            level,
            price,
            quantity,
            expected_version,
        } => run_fill(&config, grid, level, price, quantity, expected_version),
        Commands::Rebalance { snapshot, json } => run_rebalance(&config, &snapshot, json),
        Commands::Status { verbose } => show_status(&config, verbose),
    }
}

/// Initialize logging to stderr and an hourly rolling file.
fn init_logging(json: bool) -> Result<WorkerGuard> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "gridtrader.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::from_default_env()
        .add_directive("gridtrader=debug".parse()?)
        .add_directive(Level::INFO.into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr.and(file_writer))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE);

    if json {
        builder.json().init();
    } else {
        builder.with_ansi(true).init();
    }

    Ok(guard)
}

fn open_store(config: &Config) -> Result<GridStore> {
    if let Some(parent) = Path::new(&config.storage.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
    }
    GridStore::new(&config.storage.db_path)
}

fn run_grid(
    config: &Config,
    mut grid_config: GridLevelConfig,
    price: Option<Decimal>,
    volatility: Option<Decimal>,
    save: bool,
) -> Result<()> {
    let mut levels = grid::generate_levels(&grid_config)?;

    if let Some(volatility) = volatility {
        let engine = GridLevelEngine::new(config.grid.clone());
        let update =
            engine.update_spacing(&grid_config, volatility, &levels, config.grid.fill_carry)?;
        println!(
            "Spacing {}% -> {}% (x{})",
            grid_config.grid_spacing, update.config.grid_spacing, update.multiplier
        );
        grid_config = update.config;
        levels = update.levels;
    }

    println!(
        "\n{} ladder around ${} ({} buy / {} sell tiers, ${} per tier)",
        grid_config.symbol,
        grid_config.base_price,
        grid_config.num_levels_down,
        grid_config.num_levels_up,
        grid_config.position_size
    );
    print_levels(&levels);

    if let Some(price) = price {
        let actions = grid::check_triggers(&levels, price);
        if actions.is_empty() {
            println!("\nNo levels triggered at ${}", price);
        } else {
            println!("\nTriggered at ${}:", price);
            for action in &actions {
                println!(
                    "   {:>4}  {:<4}  ${}",
                    action.level_number, action.side, action.value
                );
            }
        }
    }

    if save {
        let store = open_store(config)?;
        let id = store.save_grid(&grid_config, &levels)?;
        println!("\nSaved as grid {}", id);
    }

    Ok(())
}

fn run_fill(
    config: &Config,
    id: i64,
    level: i32,
    price: Decimal,
    quantity: Decimal,
    expected_version: Option<u64>,
) -> Result<()> {
    let store = open_store(config)?;
    let grid = store
        .load_grid(id)?
        .with_context(|| format!("grid {} not found", id))?;

    let expected_version = expected_version.unwrap_or_else(|| {
        warn!(id, level, version = grid.version, "Manual fill without an expected version");
        grid.version
    });

    let fill = FillDetails {
        price,
        quantity,
        timestamp: Utc::now(),
    };
    let version = store.mark_filled(id, expected_version, level, &fill)?;

    info!(id, level, %price, %quantity, version, "Fill recorded");
    println!("Recorded fill on {} level {} @ ${}", grid.config.symbol, level, price);
    Ok(())
}

fn run_rebalance(config: &Config, path: &Path, json: bool) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {:?}", path))?;
    let snapshot: PortfolioSnapshot =
        serde_json::from_str(&raw).context("Failed to parse portfolio snapshot")?;

    let plan = PortfolioRebalancer::new(config.rebalance.clone()).compute_actions(&snapshot);
    let risk = risk_metrics(&snapshot);
    let assessment = risk_assessment(&snapshot);

    if json {
        let report = RebalanceReport {
            plan: &plan,
            risk: &risk,
            assessment: &assessment,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\nPortfolio value: ${:.2}", snapshot.total_value);

    println!("\nProposed trades");
    print_actions(&plan.proposed);

    println!("\nAfter netting");
    print_actions(&plan.netted);

    if plan.netting_erased_deviations() {
        warn!("Netting cancelled every out-of-band trade");
        println!("   ! netting cancelled every out-of-band trade; review the proposed list");
    }

    if risk.is_empty() {
        println!("\nRisk metrics: portfolio has no value");
    } else {
        println!("\nRisk metrics");
        println!("   ├─ Positions:         {}", risk.num_positions);
        println!(
            "   ├─ Max Concentration: {:.2}%",
            risk.max_concentration * dec!(100)
        );
        println!("   ├─ HHI:               {:.4}", risk.herfindahl_index);
        println!("   └─ Diversification:   {:.2}", risk.diversification_ratio);
    }

    println!(
        "\nRisk score: {} ({}), {} significant positions",
        assessment.risk_score, assessment.risk_level, assessment.num_significant_positions
    );
    for c in &assessment.top_concentrations {
        println!(
            "   {:<8} {:>6.2}%  ${:.2}",
            c.symbol, c.concentration_pct, c.market_value
        );
    }

    println!();
    Ok(())
}

fn show_status(config: &Config, verbose: bool) -> Result<()> {
    if !Path::new(&config.storage.db_path).exists() {
        println!("Database not found: {}", config.storage.db_path);
        return Ok(());
    }

    let store = open_store(config)?;
    let grids = store.list_grids()?;

    if grids.is_empty() {
        println!("No active grids.");
        return Ok(());
    }

    for stored in &grids {
        let stats = grid::statistics(&stored.levels);
        println!(
            "\n[{}] {} @ ${} spacing {}% (v{})",
            stored.id,
            stored.config.symbol,
            stored.config.base_price,
            stored.config.grid_spacing,
            stored.version
        );
        println!(
            "   ├─ Filled:  {}/{} ({:.1}%)",
            stats.filled_levels,
            stats.total_levels,
            stats.utilization_rate * dec!(100)
        );
        println!(
            "   ├─ Buys:    {}/{} filled",
            stats.buy_levels_filled, stats.buy_levels
        );
        println!(
            "   ├─ Sells:   {}/{} filled",
            stats.sell_levels_filled, stats.sell_levels
        );
        if let (Some(min), Some(max)) = (stats.min_price, stats.max_price) {
            println!("   └─ Range:   ${:.2} - ${:.2}", min, max);
        }

        if verbose {
            print_levels(&stored.levels);
        }
    }

    println!();
    Ok(())
}

fn print_levels(levels: &[GridLevel]) {
    for level in levels {
        let fill = match (level.filled_price, level.filled_quantity) {
            (Some(price), Some(qty)) if level.is_filled => format!("filled {} @ ${}", qty, price),
            _ => String::new(),
        };
        println!(
            "   {:>4}  {:<4}  ${:<14.4} {}",
            level.level_number, level.side, level.trigger_price, fill
        );
    }
}

fn print_actions(actions: &[RebalanceAction]) {
    if actions.is_empty() {
        println!("   (none)");
        return;
    }
    for action in actions {
        println!(
            "   {:<4} {:<8} ${:<12.2} {}",
            action.side, action.symbol, action.value, action.reason
        );
    }
}
