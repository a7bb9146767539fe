use crate::pipeline::TickerRun;
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use duckdb::{params, Connection};
use std::path::Path;
use tracing::info;

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS forecast_run_ids START 1;

CREATE TABLE IF NOT EXISTS forecast_runs (
    id              BIGINT PRIMARY KEY DEFAULT nextval('forecast_run_ids'),
    ticker          VARCHAR   NOT NULL,
    started_at      TIMESTAMP NOT NULL,
    status          VARCHAR   NOT NULL,   -- forecast | skipped | error
    reason          VARCHAR,
    articles        INTEGER   NOT NULL DEFAULT 0,
    sentiment_days  INTEGER   NOT NULL DEFAULT 0,
    aligned_rows    INTEGER   NOT NULL DEFAULT 0,
    correlation     DOUBLE,
    beta            DOUBLE,
    ar              DOUBLE,
    ma              DOUBLE,
    sigma2          DOUBLE
);

CREATE TABLE IF NOT EXISTS forecast_points (
    run_id      BIGINT  NOT NULL,
    step        INTEGER NOT NULL,
    date        DATE    NOT NULL,
    point       DOUBLE  NOT NULL,
    lower       DOUBLE  NOT NULL,
    upper       DOUBLE  NOT NULL,
    PRIMARY KEY (run_id, step)
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_runs_ticker ON forecast_runs (ticker);
"#;

/// One row of `forecast_runs`, as listed by the `history` command.
#[derive(Debug, Clone)]
pub struct RunRow {
    pub id: i64,
    pub ticker: String,
    pub started_at: NaiveDateTime,
    pub status: String,
    pub reason: Option<String>,
    pub aligned_rows: i64,
    pub correlation: Option<f64>,
    pub next_point: Option<(NaiveDate, f64)>,
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Runs ──────────────────────────────────────────────────────────────────

    /// Record one ticker's run and, when present, its forecast points.
    pub fn record_run(&self, run: &TickerRun) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;

        let status = run.outcome.label();
        let reason = run.outcome.reason();
        let model = run.forecast().map(|f| &f.model.fit);

        let run_id: i64 = tx
            .query_row(
                r#"INSERT INTO forecast_runs
                       (ticker, started_at, status, reason, articles, sentiment_days,
                        aligned_rows, correlation, beta, ar, ma, sigma2)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                   RETURNING id"#,
                params![
                    run.ticker,
                    run.started_at,
                    status,
                    reason,
                    run.articles as i64,
                    run.sentiment.len() as i64,
                    run.aligned.len() as i64,
                    run.correlation,
                    model.map(|m| m.beta),
                    model.map(|m| m.ar),
                    model.map(|m| m.ma),
                    model.map(|m| m.sigma2),
                ],
                |r| r.get(0),
            )
            .with_context(|| format!("insert run for {}", run.ticker))?;

        if let Some(forecast) = run.forecast() {
            let res = &forecast.result;
            for step in 0..res.horizon() {
                tx.execute(
                    "INSERT INTO forecast_points (run_id, step, date, point, lower, upper) VALUES (?, ?, ?, ?, ?, ?)",
                    params![
                        run_id,
                        (step + 1) as i64,
                        res.forecast_dates[step],
                        res.point_estimates[step],
                        res.lower_bound[step],
                        res.upper_bound[step],
                    ],
                )
                .with_context(|| format!("insert forecast point {} for {}", step + 1, run.ticker))?;
            }
        }

        tx.commit()?;
        Ok(run_id)
    }

    /// Most recent runs first, optionally for one ticker.
    pub fn recent_runs(&self, ticker: Option<&str>, limit: usize) -> Result<Vec<RunRow>> {
        let filter = if ticker.is_some() { "WHERE r.ticker = ?" } else { "" };
        let sql = format!(
            r#"SELECT r.id, r.ticker, r.started_at, r.status, r.reason, r.aligned_rows,
                      r.correlation, p.date, p.point
               FROM forecast_runs r
               LEFT JOIN forecast_points p ON p.run_id = r.id AND p.step = 1
               {}
               ORDER BY r.started_at DESC, r.id DESC
               LIMIT {}"#,
            filter, limit
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let map_row = |r: &duckdb::Row<'_>| -> duckdb::Result<RunRow> {
            let date: Option<NaiveDate> = r.get(7)?;
            let point: Option<f64> = r.get(8)?;
            Ok(RunRow {
                id: r.get(0)?,
                ticker: r.get(1)?,
                started_at: r.get(2)?,
                status: r.get(3)?,
                reason: r.get(4)?,
                aligned_rows: r.get(5)?,
                correlation: r.get(6)?,
                next_point: date.zip(point),
            })
        };

        let rows = match ticker {
            Some(t) => stmt.query_map(params![t], map_row)?.collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt.query_map([], map_row)?.collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    pub fn run_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM forecast_runs")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }
}
