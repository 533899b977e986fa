use chrono::NaiveDate;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{info, warn};

use common::{round_to, Result, Score, ScoreSnapshot};

use crate::{format_date, parse_date, SignalStore};

/// One stored day of a symbol's score history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub score: Score,
    pub price: f64,
    pub prior_move_pct: f64,
    pub pullback_pct: f64,
    pub volume_decline_pct: f64,
    pub sma_fast_slope: f64,
    pub sma_slow_slope: f64,
    pub distance_to_breakout_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendingSymbol {
    pub symbol: String,
    pub current_score: i64,
    pub past_score: i64,
    pub score_change: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestScore {
    pub symbol: String,
    pub date: NaiveDate,
    pub score: Score,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySummary {
    pub total_symbols: i64,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    /// Symbols whose latest score is 75 or more.
    pub hot_count: i64,
    pub average_score: f64,
}

const LATEST_PER_SYMBOL: &str = r#"
    WITH latest AS (
        SELECT symbol, MAX(date) AS max_date
        FROM score_history
        GROUP BY symbol
    )
"#;

impl SignalStore {
    /// Upsert daily snapshots in one transaction. Returns rows written.
    pub async fn save_snapshots(&self, snapshots: &[ScoreSnapshot]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for snap in snapshots {
            let f = snap.features.rounded();
            sqlx::query(
                r#"
                INSERT INTO score_history
                    (symbol, date, score, price, prior_move_pct, pullback_pct,
                     volume_decline_pct, sma10_slope, sma20_slope, distance_to_breakout)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(symbol, date) DO UPDATE SET
                    score = excluded.score,
                    price = excluded.price,
                    prior_move_pct = excluded.prior_move_pct,
                    pullback_pct = excluded.pullback_pct,
                    volume_decline_pct = excluded.volume_decline_pct,
                    sma10_slope = excluded.sma10_slope,
                    sma20_slope = excluded.sma20_slope,
                    distance_to_breakout = excluded.distance_to_breakout
                "#,
            )
            .bind(&snap.symbol)
            .bind(format_date(snap.date))
            .bind(snap.score.value() as i64)
            .bind(round_to(snap.price, 2))
            .bind(f.prior_move_pct)
            .bind(f.pullback_pct)
            .bind(f.volume_decline_pct)
            .bind(f.sma_fast_slope)
            .bind(f.sma_slow_slope)
            .bind(f.distance_to_breakout_pct)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!(rows = snapshots.len(), "Saved score history");
        Ok(snapshots.len())
    }

    /// The most recent `days` stored days for `symbol`, oldest first.
    pub async fn stock_history(&self, symbol: &str, days: u32) -> Result<Vec<HistoryPoint>> {
        let rows = sqlx::query(
            r#"
            SELECT date, score, price, prior_move_pct, pullback_pct,
                   volume_decline_pct, sma10_slope, sma20_slope, distance_to_breakout
            FROM score_history
            WHERE symbol = ?1
            ORDER BY date DESC
            LIMIT ?2
            "#,
        )
        .bind(symbol.to_uppercase())
        .bind(days as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut points: Vec<HistoryPoint> = rows
            .iter()
            .filter_map(|row| match point_from_row(row) {
                Ok(point) => Some(point),
                Err(e) => {
                    warn!(symbol, error = %e, "Skipping malformed score history row");
                    None
                }
            })
            .collect();
        points.reverse();
        Ok(points)
    }

    /// Symbols whose latest score exceeds their score `days` entries back by
    /// at least `min_increase`. Top 20 by change.
    pub async fn trending(&self, days: u32, min_increase: i64) -> Result<Vec<TrendingSymbol>> {
        let rows = sqlx::query(
            r#"
            WITH recent_scores AS (
                SELECT symbol, date, score,
                       ROW_NUMBER() OVER (PARTITION BY symbol ORDER BY date DESC) AS rn
                FROM score_history
            ),
            score_changes AS (
                SELECT a.symbol,
                       a.score AS current_score,
                       b.score AS past_score,
                       a.score - b.score AS score_change
                FROM recent_scores a
                JOIN recent_scores b ON a.symbol = b.symbol
                WHERE a.rn = 1 AND b.rn = ?1
            )
            SELECT symbol, current_score, past_score, score_change
            FROM score_changes
            WHERE score_change >= ?2
            ORDER BY score_change DESC, symbol
            LIMIT 20
            "#,
        )
        .bind(days as i64)
        .bind(min_increase)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TrendingSymbol {
                    symbol: row.try_get("symbol")?,
                    current_score: row.try_get("current_score")?,
                    past_score: row.try_get("past_score")?,
                    score_change: row.try_get("score_change")?,
                })
            })
            .collect()
    }

    /// Latest stored score of every symbol, highest first.
    pub async fn latest_scores(&self) -> Result<Vec<LatestScore>> {
        let sql = format!(
            r#"{LATEST_PER_SYMBOL}
            SELECT s.symbol, s.date, s.score, s.price
            FROM score_history s
            JOIN latest l ON s.symbol = l.symbol AND s.date = l.max_date
            ORDER BY s.score DESC, s.symbol
            "#
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .filter_map(|row| match latest_from_row(row) {
                Ok(latest) => Some(latest),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed latest score row");
                    None
                }
            })
            .collect())
    }

    pub async fn history_summary(&self) -> Result<HistorySummary> {
        let totals = sqlx::query(
            "SELECT COUNT(DISTINCT symbol) AS n, MIN(date) AS first, MAX(date) AS last FROM score_history",
        )
        .fetch_one(&self.pool)
        .await?;

        let first: Option<String> = totals.try_get("first")?;
        let last: Option<String> = totals.try_get("last")?;
        let date_range = match (first, last) {
            (Some(a), Some(b)) => Some((parse_date(&a)?, parse_date(&b)?)),
            _ => None,
        };

        let latest = sqlx::query(&format!(
            r#"{LATEST_PER_SYMBOL}
            SELECT COALESCE(SUM(CASE WHEN s.score >= 75 THEN 1 ELSE 0 END), 0) AS hot,
                   AVG(s.score) AS avg_score
            FROM score_history s
            JOIN latest l ON s.symbol = l.symbol AND s.date = l.max_date
            "#
        ))
        .fetch_one(&self.pool)
        .await?;

        Ok(HistorySummary {
            total_symbols: totals.try_get("n")?,
            date_range,
            hot_count: latest.try_get("hot")?,
            average_score: round_to(latest.try_get::<Option<f64>, _>("avg_score")?.unwrap_or(0.0), 1),
        })
    }
}

fn point_from_row(row: &SqliteRow) -> Result<HistoryPoint> {
    let opt = |col: &str| -> Result<f64> { Ok(row.try_get::<Option<f64>, _>(col)?.unwrap_or(0.0)) };
    Ok(HistoryPoint {
        date: parse_date(row.try_get::<&str, _>("date")?)?,
        score: Score::try_from(row.try_get::<i64, _>("score")?)?,
        price: opt("price")?,
        prior_move_pct: opt("prior_move_pct")?,
        pullback_pct: opt("pullback_pct")?,
        volume_decline_pct: opt("volume_decline_pct")?,
        sma_fast_slope: opt("sma10_slope")?,
        sma_slow_slope: opt("sma20_slope")?,
        distance_to_breakout_pct: opt("distance_to_breakout")?,
    })
}

fn latest_from_row(row: &SqliteRow) -> Result<LatestScore> {
    Ok(LatestScore {
        symbol: row.try_get("symbol")?,
        date: parse_date(row.try_get::<&str, _>("date")?)?,
        score: Score::try_from(row.try_get::<i64, _>("score")?)?,
        price: row.try_get::<Option<f64>, _>("price")?.unwrap_or(0.0),
    })
}
