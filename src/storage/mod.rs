//! Persistence layer.
//!
//! Stores watched securities and the append-only valuation snapshot
//! history in SQLite via `sqlx`. The schema is created on open.
//! `valuation_snapshots` is unique on (symbol, period_date); the storage
//! layer is the authority for that constraint and reports violations as
//! `InsertOutcome::Duplicate` rather than an error.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::types::{DcfAssumptions, Pipeline, ValuationSnapshot, WatchedSecurity};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS securities (
        symbol TEXT PRIMARY KEY,
        active INTEGER NOT NULL DEFAULT 1,
        eps_growth_rate REAL NOT NULL,
        eps_terminal_multiple REAL NOT NULL,
        fcf_growth_rate REAL NOT NULL,
        fcf_terminal_multiple REAL NOT NULL,
        desired_return REAL NOT NULL,
        projection_years INTEGER NOT NULL,
        preferred_pipeline TEXT NOT NULL DEFAULT 'eps',
        trailing_eps REAL,
        fcf_per_share REAL,
        eps_intrinsic_value REAL,
        fcf_intrinsic_value REAL,
        valued_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS valuation_snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL REFERENCES securities(symbol),
        period_date TEXT NOT NULL,
        eps_intrinsic_value REAL,
        fcf_intrinsic_value REAL,
        trailing_eps REAL,
        fcf_per_share REAL,
        eps_growth_rate REAL NOT NULL,
        eps_terminal_multiple REAL NOT NULL,
        fcf_growth_rate REAL NOT NULL,
        fcf_terminal_multiple REAL NOT NULL,
        desired_return REAL NOT NULL,
        projection_years INTEGER NOT NULL,
        preferred_pipeline TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (symbol, period_date)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_snapshots_period ON valuation_snapshots(period_date)",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_symbol_period ON valuation_snapshots(symbol, period_date DESC)",
];

const SNAPSHOT_COLUMNS: &str = "symbol, period_date, eps_intrinsic_value, fcf_intrinsic_value, \
     trailing_eps, fcf_per_share, eps_growth_rate, eps_terminal_multiple, fcf_growth_rate, \
     fcf_terminal_multiple, desired_return, projection_years, preferred_pipeline, created_at";

/// Computed fields written after a valuation run. `None` leaves the stored
/// value untouched; a `clear_*` flag nulls that intrinsic value instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValuationUpdate {
    pub trailing_eps: Option<f64>,
    pub fcf_per_share: Option<f64>,
    pub eps_intrinsic_value: Option<f64>,
    pub fcf_intrinsic_value: Option<f64>,
    pub clear_eps_intrinsic_value: bool,
    pub clear_fcf_intrinsic_value: bool,
    pub valued_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open (creating if needed) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .with_context(|| format!("Failed to open database: {url}"))?;
        let storage = Self { pool };
        storage.migrate().await?;
        info!(url, "Storage ready");
        Ok(storage)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub async fn in_memory() -> Result<Self> {
        // One connection that never recycles, otherwise the database vanishes.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;
        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    /// Close the pool; later queries fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<()> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Migration failed")?;
        }
        Ok(())
    }

    // -- Securities ------------------------------------------------------

    /// Insert or fully replace a security, computed fields included.
    pub async fn save_security(&self, security: &WatchedSecurity) -> Result<()> {
        let a = &security.assumptions;
        sqlx::query(
            r#"
            INSERT INTO securities (
                symbol, active, eps_growth_rate, eps_terminal_multiple, fcf_growth_rate,
                fcf_terminal_multiple, desired_return, projection_years, preferred_pipeline,
                trailing_eps, fcf_per_share, eps_intrinsic_value, fcf_intrinsic_value, valued_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                active = excluded.active,
                eps_growth_rate = excluded.eps_growth_rate,
                eps_terminal_multiple = excluded.eps_terminal_multiple,
                fcf_growth_rate = excluded.fcf_growth_rate,
                fcf_terminal_multiple = excluded.fcf_terminal_multiple,
                desired_return = excluded.desired_return,
                projection_years = excluded.projection_years,
                preferred_pipeline = excluded.preferred_pipeline,
                trailing_eps = excluded.trailing_eps,
                fcf_per_share = excluded.fcf_per_share,
                eps_intrinsic_value = excluded.eps_intrinsic_value,
                fcf_intrinsic_value = excluded.fcf_intrinsic_value,
                valued_at = excluded.valued_at
            "#,
        )
        .bind(&security.symbol)
        .bind(security.active)
        .bind(a.eps_growth_rate)
        .bind(a.eps_terminal_multiple)
        .bind(a.fcf_growth_rate)
        .bind(a.fcf_terminal_multiple)
        .bind(a.desired_return)
        .bind(a.projection_years as i64)
        .bind(security.preferred_pipeline.as_str())
        .bind(security.trailing_eps)
        .bind(security.fcf_per_share)
        .bind(security.eps_intrinsic_value)
        .bind(security.fcf_intrinsic_value)
        .bind(security.valued_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save security {}", security.symbol))?;
        Ok(())
    }

    /// Seed a security without touching an existing row. Returns `true` if inserted.
    pub async fn insert_security_if_absent(&self, security: &WatchedSecurity) -> Result<bool> {
        if self.get_security(&security.symbol).await?.is_some() {
            return Ok(false);
        }
        self.save_security(security).await?;
        Ok(true)
    }

    pub async fn get_security(&self, symbol: &str) -> Result<Option<WatchedSecurity>> {
        let row = sqlx::query("SELECT * FROM securities WHERE symbol = ?")
            .bind(symbol.to_uppercase())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to load security {symbol}"))?;
        row.map(|r| row_to_security(&r)).transpose()
    }

    pub async fn list_active_securities(&self) -> Result<Vec<WatchedSecurity>> {
        let rows = sqlx::query("SELECT * FROM securities WHERE active = 1 ORDER BY symbol")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list active securities")?;
        rows.iter().map(row_to_security).collect()
    }

    /// Write computed fields in one statement; `None` fields keep their
    /// previous value unless the matching clear flag is set. Returns `false`
    /// if the symbol is unknown.
    pub async fn record_valuation(&self, symbol: &str, update: &ValuationUpdate) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE securities SET
                trailing_eps = COALESCE(?, trailing_eps),
                fcf_per_share = COALESCE(?, fcf_per_share),
                eps_intrinsic_value = CASE WHEN ? THEN NULL ELSE COALESCE(?, eps_intrinsic_value) END,
                fcf_intrinsic_value = CASE WHEN ? THEN NULL ELSE COALESCE(?, fcf_intrinsic_value) END,
                valued_at = COALESCE(?, valued_at)
            WHERE symbol = ?
            "#,
        )
        .bind(update.trailing_eps)
        .bind(update.fcf_per_share)
        .bind(update.clear_eps_intrinsic_value)
        .bind(update.eps_intrinsic_value)
        .bind(update.clear_fcf_intrinsic_value)
        .bind(update.fcf_intrinsic_value)
        .bind(update.valued_at)
        .bind(symbol.to_uppercase())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to record valuation for {symbol}"))?;

        debug!(symbol, rows = result.rows_affected(), "Valuation recorded");
        Ok(result.rows_affected() > 0)
    }

    // -- Snapshots -------------------------------------------------------

    pub async fn find_snapshot(
        &self,
        symbol: &str,
        period_date: NaiveDate,
    ) -> Result<Option<ValuationSnapshot>> {
        let row = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM valuation_snapshots WHERE symbol = ? AND period_date = ?"
        ))
        .bind(symbol.to_uppercase())
        .bind(period_date)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load snapshot {symbol} {period_date}"))?;
        row.map(|r| row_to_snapshot(&r)).transpose()
    }

    /// Append a snapshot; a clash on (symbol, period_date) is `Duplicate`.
    pub async fn insert_snapshot(&self, snapshot: &ValuationSnapshot) -> Result<InsertOutcome> {
        match bind_snapshot(&insert_snapshot_sql(), snapshot).execute(&self.pool).await {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e).with_context(|| {
                format!("Failed to insert snapshot {} {}", snapshot.symbol, snapshot.period_date)
            }),
        }
    }

    /// Remove one snapshot. Returns false when nothing matched.
    pub async fn delete_snapshot(&self, symbol: &str, period_date: NaiveDate) -> Result<bool> {
        let result = sqlx::query("DELETE FROM valuation_snapshots WHERE symbol = ? AND period_date = ?")
            .bind(symbol.to_uppercase())
            .bind(period_date)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete snapshot {symbol} {period_date}"))?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete any snapshot for the same (symbol, period_date) and insert the
    /// new one in a single transaction.
    pub async fn replace_snapshot(&self, snapshot: &ValuationSnapshot) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM valuation_snapshots WHERE symbol = ? AND period_date = ?")
            .bind(&snapshot.symbol)
            .bind(snapshot.period_date)
            .execute(&mut *tx)
            .await
            .context("Failed to delete existing snapshot")?;

        bind_snapshot(&insert_snapshot_sql(), snapshot)
            .execute(&mut *tx)
            .await
            .context("Failed to insert replacement snapshot")?;

        tx.commit().await.context("Failed to commit snapshot replacement")?;
        Ok(())
    }

    /// All snapshots for a security, most recent period first.
    pub async fn snapshots_for(&self, symbol: &str) -> Result<Vec<ValuationSnapshot>> {
        let rows = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM valuation_snapshots WHERE symbol = ? ORDER BY period_date DESC"
        ))
        .bind(symbol.to_uppercase())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to list snapshots for {symbol}"))?;
        rows.iter().map(row_to_snapshot).collect()
    }

    pub async fn snapshots_for_period(&self, period_date: NaiveDate) -> Result<Vec<ValuationSnapshot>> {
        let rows = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM valuation_snapshots WHERE period_date = ? ORDER BY symbol"
        ))
        .bind(period_date)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to list snapshots for {period_date}"))?;
        rows.iter().map(row_to_snapshot).collect()
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn insert_snapshot_sql() -> String {
    format!(
        "INSERT INTO valuation_snapshots ({SNAPSHOT_COLUMNS}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    )
}

fn bind_snapshot<'q>(
    sql: &'q str,
    s: &'q ValuationSnapshot,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    let a = &s.assumptions;
    sqlx::query(sql)
        .bind(&s.symbol)
        .bind(s.period_date)
        .bind(s.eps_intrinsic_value)
        .bind(s.fcf_intrinsic_value)
        .bind(s.trailing_eps)
        .bind(s.fcf_per_share)
        .bind(a.eps_growth_rate)
        .bind(a.eps_terminal_multiple)
        .bind(a.fcf_growth_rate)
        .bind(a.fcf_terminal_multiple)
        .bind(a.desired_return)
        .bind(a.projection_years as i64)
        .bind(s.preferred_pipeline.as_str())
        .bind(s.created_at)
}

fn row_to_assumptions(row: &SqliteRow) -> Result<DcfAssumptions> {
    let years: i64 = row.try_get("projection_years")?;
    Ok(DcfAssumptions {
        eps_growth_rate: row.try_get("eps_growth_rate")?,
        eps_terminal_multiple: row.try_get("eps_terminal_multiple")?,
        fcf_growth_rate: row.try_get("fcf_growth_rate")?,
        fcf_terminal_multiple: row.try_get("fcf_terminal_multiple")?,
        desired_return: row.try_get("desired_return")?,
        projection_years: u32::try_from(years).context("projection_years out of range")?,
    })
}

fn row_to_pipeline(row: &SqliteRow) -> Result<Pipeline> {
    let raw: String = row.try_get("preferred_pipeline")?;
    raw.parse()
}

fn row_to_security(row: &SqliteRow) -> Result<WatchedSecurity> {
    Ok(WatchedSecurity {
        symbol: row.try_get("symbol")?,
        active: row.try_get("active")?,
        assumptions: row_to_assumptions(row)?,
        preferred_pipeline: row_to_pipeline(row)?,
        trailing_eps: row.try_get("trailing_eps")?,
        fcf_per_share: row.try_get("fcf_per_share")?,
        eps_intrinsic_value: row.try_get("eps_intrinsic_value")?,
        fcf_intrinsic_value: row.try_get("fcf_intrinsic_value")?,
        valued_at: row.try_get("valued_at")?,
    })
}

fn row_to_snapshot(row: &SqliteRow) -> Result<ValuationSnapshot> {
    Ok(ValuationSnapshot {
        symbol: row.try_get("symbol")?,
        period_date: row.try_get("period_date")?,
        eps_intrinsic_value: row.try_get("eps_intrinsic_value")?,
        fcf_intrinsic_value: row.try_get("fcf_intrinsic_value")?,
        trailing_eps: row.try_get("trailing_eps")?,
        fcf_per_share: row.try_get("fcf_per_share")?,
        assumptions: row_to_assumptions(row)?,
        preferred_pipeline: row_to_pipeline(row)?,
        created_at: row.try_get("created_at")?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn security(symbol: &str) -> WatchedSecurity {
        let mut sec = WatchedSecurity::new(symbol, DcfAssumptions::default());
        sec.eps_intrinsic_value = Some(122.39);
        sec
    }

    #[tokio::test]
    async fn test_save_and_load_security() {
        let storage = Storage::in_memory().await.unwrap();
        let mut sec = security("AAPL");
        sec.preferred_pipeline = Pipeline::Fcf;
        sec.fcf_per_share = Some(-0.42);
        storage.save_security(&sec).await.unwrap();

        let loaded = storage.get_security("aapl").await.unwrap().unwrap();
        assert_eq!(loaded.symbol, "AAPL");
        assert_eq!(loaded.preferred_pipeline, Pipeline::Fcf);
        assert_eq!(loaded.assumptions, DcfAssumptions::default());
        assert_eq!(loaded.fcf_per_share, Some(-0.42));
        assert_eq!(loaded.eps_intrinsic_value, Some(122.39));
        assert_eq!(loaded.fcf_intrinsic_value, None);
    }

    #[tokio::test]
    async fn test_insert_if_absent_keeps_operator_edits() {
        let storage = Storage::in_memory().await.unwrap();
        let mut sec = security("KO");
        sec.assumptions.desired_return = 0.12;
        assert!(storage.insert_security_if_absent(&sec).await.unwrap());

        let seeded = security("KO");
        assert!(!storage.insert_security_if_absent(&seeded).await.unwrap());

        let loaded = storage.get_security("KO").await.unwrap().unwrap();
        assert!((loaded.assumptions.desired_return - 0.12).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_list_active_only() {
        let storage = Storage::in_memory().await.unwrap();
        storage.save_security(&security("MSFT")).await.unwrap();
        let mut inactive = security("IBM");
        inactive.active = false;
        storage.save_security(&inactive).await.unwrap();

        let active = storage.list_active_securities().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].symbol, "MSFT");
    }

    #[tokio::test]
    async fn test_record_valuation_keeps_prior_values_on_none() {
        let storage = Storage::in_memory().await.unwrap();
        let mut sec = security("AAPL");
        sec.fcf_intrinsic_value = Some(68.0);
        storage.save_security(&sec).await.unwrap();

        let updated = storage
            .record_valuation(
                "AAPL",
                &ValuationUpdate {
                    eps_intrinsic_value: Some(130.0),
                    trailing_eps: Some(6.5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated);

        let loaded = storage.get_security("AAPL").await.unwrap().unwrap();
        assert_eq!(loaded.eps_intrinsic_value, Some(130.0));
        assert_eq!(loaded.fcf_intrinsic_value, Some(68.0));
        assert_eq!(loaded.trailing_eps, Some(6.5));
    }

    #[tokio::test]
    async fn test_record_valuation_clears_flagged_value() {
        let storage = Storage::in_memory().await.unwrap();
        let mut sec = security("AAPL");
        sec.fcf_intrinsic_value = Some(68.0);
        storage.save_security(&sec).await.unwrap();

        storage
            .record_valuation(
                "AAPL",
                &ValuationUpdate {
                    fcf_per_share: Some(-1.33),
                    clear_fcf_intrinsic_value: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let loaded = storage.get_security("AAPL").await.unwrap().unwrap();
        assert_eq!(loaded.fcf_intrinsic_value, None);
        assert_eq!(loaded.fcf_per_share, Some(-1.33));
        assert_eq!(loaded.eps_intrinsic_value, Some(122.39));
    }

    #[tokio::test]
    async fn test_record_valuation_unknown_symbol() {
        let storage = Storage::in_memory().await.unwrap();
        let updated = storage
            .record_valuation("NOPE", &ValuationUpdate::default())
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn test_duplicate_snapshot_reported() {
        let storage = Storage::in_memory().await.unwrap();
        let sec = security("AAPL");
        storage.save_security(&sec).await.unwrap();
        let snap = ValuationSnapshot::capture(&sec, date(2026, 7, 1));

        assert_eq!(storage.insert_snapshot(&snap).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(storage.insert_snapshot(&snap).await.unwrap(), InsertOutcome::Duplicate);
        assert_eq!(storage.snapshots_for("AAPL").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_snapshot() {
        let storage = Storage::in_memory().await.unwrap();
        let sec = security("AAPL");
        storage.save_security(&sec).await.unwrap();
        storage
            .insert_snapshot(&ValuationSnapshot::capture(&sec, date(2026, 7, 1)))
            .await
            .unwrap();

        assert!(storage.delete_snapshot("aapl", date(2026, 7, 1)).await.unwrap());
        assert!(!storage.delete_snapshot("AAPL", date(2026, 7, 1)).await.unwrap());
        assert!(storage.find_snapshot("AAPL", date(2026, 7, 1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_snapshot() {
        let storage = Storage::in_memory().await.unwrap();
        let mut sec = security("AAPL");
        storage.save_security(&sec).await.unwrap();
        storage
            .insert_snapshot(&ValuationSnapshot::capture(&sec, date(2026, 7, 1)))
            .await
            .unwrap();

        sec.eps_intrinsic_value = Some(150.0);
        storage
            .replace_snapshot(&ValuationSnapshot::capture(&sec, date(2026, 7, 1)))
            .await
            .unwrap();

        let snaps = storage.snapshots_for("AAPL").await.unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].eps_intrinsic_value, Some(150.0));
    }

    #[tokio::test]
    async fn test_snapshots_ordered_by_period_desc() {
        let storage = Storage::in_memory().await.unwrap();
        let sec = security("AAPL");
        storage.save_security(&sec).await.unwrap();
        for d in [date(2026, 1, 1), date(2026, 7, 1), date(2026, 4, 1)] {
            storage.insert_snapshot(&ValuationSnapshot::capture(&sec, d)).await.unwrap();
        }

        let periods: Vec<_> = storage
            .snapshots_for("AAPL")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.period_date)
            .collect();
        assert_eq!(periods, vec![date(2026, 7, 1), date(2026, 4, 1), date(2026, 1, 1)]);

        let q2 = storage.snapshots_for_period(date(2026, 4, 1)).await.unwrap();
        assert_eq!(q2.len(), 1);
        assert!(storage.find_snapshot("AAPL", date(2025, 10, 1)).await.unwrap().is_none());
    }
}
