//! SQLite persistence for grid configurations and fill state.
//!
//! This is the orchestrator side of the grid engine: the engine never touches
//! storage, callers load a level set from here, evaluate it, and commit fills
//! back through [`GridStore::mark_filled`]. Each grid carries a version that
//! every mutation bumps, so a fill computed against an outdated level set is
//! rejected instead of double-filling a tier.

use crate::error::EngineError;
use crate::grid::{FillDetails, GridLevel, GridLevelConfig, LadderMode};
use crate::types::Side;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// A grid config with its level set as stored.
#[derive(Debug, Clone)]
pub struct StoredGrid {
    pub id: i64,
    pub config: GridLevelConfig,
    pub levels: Vec<GridLevel>,
    pub version: u64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// SQLite-based grid store.
pub struct GridStore {
    conn: Connection,
}

impl GridStore {
    /// Open the store, initializing the database if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        let store = Self { conn };
        store.init_schema()?;

        info!("Grid store initialized at {:?}", db_path.as_ref());
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS grid_configs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                base_price TEXT NOT NULL,
                grid_spacing TEXT NOT NULL,
                num_levels_up INTEGER NOT NULL,
                num_levels_down INTEGER NOT NULL,
                position_size TEXT NOT NULL,
                total_investment TEXT NOT NULL,
                ladder_mode TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                version INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_grid_configs_symbol ON grid_configs(symbol);

            CREATE TABLE IF NOT EXISTS grid_levels (
                grid_id INTEGER NOT NULL REFERENCES grid_configs(id),
                level_number INTEGER NOT NULL,
                trigger_price TEXT NOT NULL,
                side TEXT NOT NULL,
                target_allocation TEXT NOT NULL,
                is_filled INTEGER NOT NULL DEFAULT 0,
                filled_price TEXT,
                filled_quantity TEXT,
                last_triggered TEXT,
                PRIMARY KEY (grid_id, level_number)
            );
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Store a new grid and its generated levels. Returns the grid id.
    pub fn save_grid(&self, config: &GridLevelConfig, levels: &[GridLevel]) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO grid_configs (symbol, base_price, grid_spacing, num_levels_up,
                                      num_levels_down, position_size, total_investment,
                                      ladder_mode, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                config.symbol,
                config.base_price.to_string(),
                config.grid_spacing.to_string(),
                config.num_levels_up,
                config.num_levels_down,
                config.position_size.to_string(),
                config.total_investment.to_string(),
                config.ladder_mode.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        insert_levels(&tx, id, levels)?;
        tx.commit()?;

        info!(id, symbol = %config.symbol, levels = levels.len(), "Grid saved");
        Ok(id)
    }

    /// Replace a grid's config and full level set, e.g. after a spacing update.
    ///
    /// Returns the new version.
    pub fn replace_levels(
        &self,
        id: i64,
        config: &GridLevelConfig,
        levels: &[GridLevel],
    ) -> Result<u64> {
        let tx = self.conn.unchecked_transaction()?;

        let updated = tx.execute(
            r#"
            UPDATE grid_configs
            SET base_price = ?2, grid_spacing = ?3, num_levels_up = ?4, num_levels_down = ?5,
                position_size = ?6, total_investment = ?7, ladder_mode = ?8,
                version = version + 1
            WHERE id = ?1
            "#,
            params![
                id,
                config.base_price.to_string(),
                config.grid_spacing.to_string(),
                config.num_levels_up,
                config.num_levels_down,
                config.position_size.to_string(),
                config.total_investment.to_string(),
                config.ladder_mode.as_str(),
            ],
        )?;
        anyhow::ensure!(updated == 1, "grid {} not found", id);

        tx.execute("DELETE FROM grid_levels WHERE grid_id = ?1", params![id])?;
        insert_levels(&tx, id, levels)?;

        let version = read_version(&tx, id)?;
        tx.commit()?;

        info!(id, version, levels = levels.len(), "Grid levels replaced");
        Ok(version)
    }

    /// Record a fill if the grid is still at `expected_version`.
    ///
    /// Stale versions, unknown levels and already-filled levels fail with the
    /// matching [`EngineError`] inside the returned error.
    pub fn mark_filled(
        &self,
        id: i64,
        expected_version: u64,
        level_number: i32,
        fill: &FillDetails,
    ) -> Result<u64> {
        let tx = self.conn.unchecked_transaction()?;

        let actual = read_version(&tx, id)?;
        if actual != expected_version {
            warn!(id, expected_version, actual, "Rejected fill against stale grid");
            return Err(EngineError::StaleVersion {
                expected: expected_version,
                actual,
            }
            .into());
        }

        let is_filled: Option<bool> = tx
            .query_row(
                "SELECT is_filled FROM grid_levels WHERE grid_id = ?1 AND level_number = ?2",
                params![id, level_number],
                |row| row.get(0),
            )
            .optional()?;

        match is_filled {
            None => return Err(EngineError::UnknownLevel(level_number).into()),
            Some(true) => return Err(EngineError::AlreadyFilled(level_number).into()),
            Some(false) => {}
        }

        tx.execute(
            r#"
            UPDATE grid_levels
            SET is_filled = 1, filled_price = ?3, filled_quantity = ?4, last_triggered = ?5
            WHERE grid_id = ?1 AND level_number = ?2
            "#,
            params![
                id,
                level_number,
                fill.price.to_string(),
                fill.quantity.to_string(),
                fill.timestamp.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "UPDATE grid_configs SET version = version + 1 WHERE id = ?1",
            params![id],
        )?;

        let version = read_version(&tx, id)?;
        tx.commit()?;

        debug!(id, level_number, version, price = %fill.price, "Fill persisted");
        Ok(version)
    }

    /// Load one grid with its levels ordered by level number.
    pub fn load_grid(&self, id: i64) -> Result<Option<StoredGrid>> {
        let grid = self
            .conn
            .query_row(
                r#"
                SELECT id, symbol, base_price, grid_spacing, num_levels_up, num_levels_down,
                       position_size, total_investment, ladder_mode, is_active, version, created_at
                FROM grid_configs WHERE id = ?1
                "#,
                params![id],
                grid_from_row,
            )
            .optional()?;

        let Some(mut grid) = grid else {
            return Ok(None);
        };
        grid.levels = self.load_levels(id)?;
        Ok(Some(grid))
    }

    /// Load every active grid.
    pub fn list_grids(&self) -> Result<Vec<StoredGrid>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, symbol, base_price, grid_spacing, num_levels_up, num_levels_down,
                   position_size, total_investment, ladder_mode, is_active, version, created_at
            FROM grid_configs WHERE is_active = 1 ORDER BY id
            "#,
        )?;

        let mut grids: Vec<StoredGrid> = stmt
            .query_map([], grid_from_row)?
            .collect::<rusqlite::Result<_>>()?;

        for grid in &mut grids {
            grid.levels = self.load_levels(grid.id)?;
        }
        Ok(grids)
    }

    /// Stop listing a grid without deleting its history.
    pub fn deactivate(&self, id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE grid_configs SET is_active = 0, version = version + 1 WHERE id = ?1",
            params![id],
        )?;
        info!(id, "Grid deactivated");
        Ok(())
    }

    fn load_levels(&self, id: i64) -> Result<Vec<GridLevel>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT level_number, trigger_price, side, target_allocation, is_filled,
                   filled_price, filled_quantity, last_triggered
            FROM grid_levels WHERE grid_id = ?1 ORDER BY level_number
            "#,
        )?;

        let levels = stmt
            .query_map(params![id], |row| {
                Ok(GridLevel {
                    level_number: row.get(0)?,
                    trigger_price: decimal(row, 1)?,
                    side: parse_column::<Side>(row, 2)?,
                    target_allocation: decimal(row, 3)?,
                    is_filled: row.get(4)?,
                    filled_price: optional_decimal(row, 5)?,
                    filled_quantity: optional_decimal(row, 6)?,
                    last_triggered: row
                        .get::<_, Option<String>>(7)?
                        .and_then(|s| parse_timestamp(&s)),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load grid levels")?;

        Ok(levels)
    }
}

fn insert_levels(conn: &Connection, id: i64, levels: &[GridLevel]) -> Result<()> {
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO grid_levels (grid_id, level_number, trigger_price, side, target_allocation,
                                 is_filled, filled_price, filled_quantity, last_triggered)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )?;

    for level in levels {
        stmt.execute(params![
            id,
            level.level_number,
            level.trigger_price.to_string(),
            level.side.as_str(),
            level.target_allocation.to_string(),
            level.is_filled,
            level.filled_price.map(|p| p.to_string()),
            level.filled_quantity.map(|q| q.to_string()),
            level.last_triggered.map(|t| t.to_rfc3339()),
        ])?;
    }
    Ok(())
}

fn read_version(conn: &Connection, id: i64) -> Result<u64> {
    let version: Option<i64> = conn
        .query_row(
            "SELECT version FROM grid_configs WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    let version = version.with_context(|| format!("grid {} not found", id))?;
    Ok(version as u64)
}

fn grid_from_row(row: &Row<'_>) -> rusqlite::Result<StoredGrid> {
    let created_at: String = row.get(11)?;
    let version: i64 = row.get(10)?;

    Ok(StoredGrid {
        id: row.get(0)?,
        config: GridLevelConfig {
            symbol: row.get(1)?,
            base_price: decimal(row, 2)?,
            grid_spacing: decimal(row, 3)?,
            num_levels_up: row.get(4)?,
            num_levels_down: row.get(5)?,
            position_size: decimal(row, 6)?,
            total_investment: decimal(row, 7)?,
            ladder_mode: parse_column::<LadderMode>(row, 8)?,
        },
        levels: Vec::new(),
        version: version as u64,
        is_active: row.get(9)?,
        created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
    })
}

/// Parse an enum stored as TEXT. Unknown values are a conversion error,
/// never a fallback variant.
fn parse_column<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    Ok(Decimal::from_str(&row.get::<_, String>(idx)?).unwrap_or_default())
}

fn optional_decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .and_then(|s| Decimal::from_str(&s).ok()))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
