use std::collections::BTreeMap;

use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use tracing::{info, warn};

use common::{
    Error, FeatureSet, PerformanceRecord, Result, Score, Signal, SignalOutcome,
};

use crate::{format_date, parse_date, SignalStore};

/// Counts from one `save_outcomes` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub signals: usize,
    pub records: usize,
    /// Performance records refused as malformed.
    pub rejected: usize,
}

/// One family of signals and the performance rows that hang off them.
/// Both families share a column layout.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SignalTables {
    pub signals: &'static str,
    pub performance: &'static str,
}

pub(crate) const HISTORICAL: SignalTables = SignalTables {
    signals: "historical_signals",
    performance: "historical_performance",
};

pub(crate) const LIVE: SignalTables = SignalTables {
    signals: "live_signals",
    performance: "live_performance",
};

impl SignalStore {
    /// Upsert signals and their performance records in one transaction.
    ///
    /// Re-running a backtest over the same dates updates rows in place; the
    /// signal id is stable across runs. Records failing validation are
    /// logged and skipped.
    pub async fn save_outcomes(&self, outcomes: &[SignalOutcome]) -> Result<SaveSummary> {
        let mut summary = SaveSummary::default();
        let mut tx = self.pool.begin().await?;

        for outcome in outcomes {
            let signal = &outcome.signal;
            let features = signal.features.rounded();

            let signal_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO historical_signals
                    (symbol, signal_date, signal_price, score, prior_move_pct,
                     pullback_pct, volume_decline_pct, distance_to_breakout)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(symbol, signal_date) DO UPDATE SET
                    signal_price = excluded.signal_price,
                    score = excluded.score,
                    prior_move_pct = excluded.prior_move_pct,
                    pullback_pct = excluded.pullback_pct,
                    volume_decline_pct = excluded.volume_decline_pct,
                    distance_to_breakout = excluded.distance_to_breakout
                RETURNING id
                "#,
            )
            .bind(&signal.symbol)
            .bind(format_date(signal.signal_date))
            .bind(signal.signal_price)
            .bind(signal.score.value() as i64)
            .bind(features.prior_move_pct)
            .bind(features.pullback_pct)
            .bind(features.volume_decline_pct)
            .bind(features.distance_to_breakout_pct)
            .fetch_one(&mut *tx)
            .await?;
            summary.signals += 1;

            for record in outcome.performance.values() {
                if let Err(e) = belongs_to(signal, record).and_then(|_| record.validate()) {
                    warn!(symbol = %signal.symbol, date = %signal.signal_date, error = %e, "Rejected performance record");
                    summary.rejected += 1;
                    continue;
                }
                insert_record(&mut *tx, HISTORICAL, signal_id, record, true).await?;
                summary.records += 1;
            }
        }

        tx.commit().await?;
        info!(
            signals = summary.signals,
            records = summary.records,
            rejected = summary.rejected,
            "Saved backtest outcomes"
        );
        Ok(summary)
    }

    /// All stored backtest signals with their performance, ordered by date
    /// then symbol.
    ///
    /// Only the persisted feature columns are restored; slopes and flags read
    /// back as defaults. Malformed rows are logged and left out.
    pub async fn load_outcomes(&self) -> Result<Vec<SignalOutcome>> {
        self.load_from(HISTORICAL).await
    }

    pub(crate) async fn load_from(&self, tables: SignalTables) -> Result<Vec<SignalOutcome>> {
        let signal_rows = sqlx::query(&format!(
            r#"
            SELECT id, symbol, signal_date, signal_price, score, prior_move_pct,
                   pullback_pct, volume_decline_pct, distance_to_breakout
            FROM {}
            ORDER BY signal_date, symbol
            "#,
            tables.signals
        ))
        .fetch_all(&self.pool)
        .await?;

        let perf_rows = sqlx::query(&format!(
            r#"
            SELECT signal_id, days_held, exit_date, exit_price, return_pct,
                   max_gain_pct, max_drawdown_pct
            FROM {}
            ORDER BY signal_id, days_held
            "#,
            tables.performance
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut outcomes: Vec<SignalOutcome> = Vec::with_capacity(signal_rows.len());
        let mut index_by_id: BTreeMap<i64, usize> = BTreeMap::new();

        for row in &signal_rows {
            let id: i64 = row.try_get("id")?;
            let signal = match signal_from_row(row) {
                Ok(signal) => signal,
                Err(e) => {
                    warn!(table = tables.signals, id, error = %e, "Skipping malformed signal row");
                    continue;
                }
            };
            index_by_id.insert(id, outcomes.len());
            outcomes.push(SignalOutcome {
                signal,
                performance: BTreeMap::new(),
            });
        }

        for row in &perf_rows {
            let signal_id: i64 = row.try_get("signal_id")?;
            let Some(&idx) = index_by_id.get(&signal_id) else {
                warn!(table = tables.performance, signal_id, "Performance row without a usable signal");
                continue;
            };
            let outcome = &mut outcomes[idx];
            match record_from_row(&outcome.signal, row) {
                Ok(record) => {
                    outcome.performance.insert(record.horizon_days, record);
                }
                Err(e) => {
                    warn!(
                        table = tables.performance,
                        symbol = %outcome.signal.symbol,
                        date = %outcome.signal.signal_date,
                        error = %e,
                        "Skipping malformed performance row"
                    );
                }
            }
        }

        Ok(outcomes)
    }

    /// Remove every stored signal and performance record.
    pub async fn clear_backtest(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM historical_performance")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM historical_signals")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!("Cleared stored backtest results");
        Ok(())
    }
}

/// Write one performance row. `replace` overwrites an existing row for the
/// same horizon; otherwise the first measurement is kept. Returns whether a
/// row was written.
pub(crate) async fn insert_record(
    conn: &mut SqliteConnection,
    tables: SignalTables,
    signal_id: i64,
    record: &PerformanceRecord,
    replace: bool,
) -> Result<bool> {
    let on_conflict = if replace {
        r#"DO UPDATE SET
            exit_date = excluded.exit_date,
            exit_price = excluded.exit_price,
            return_pct = excluded.return_pct,
            max_gain_pct = excluded.max_gain_pct,
            max_drawdown_pct = excluded.max_drawdown_pct"#
    } else {
        "DO NOTHING"
    };
    let result = sqlx::query(&format!(
        r#"
        INSERT INTO {}
            (signal_id, days_held, exit_date, exit_price, return_pct,
             max_gain_pct, max_drawdown_pct)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(signal_id, days_held) {on_conflict}
        "#,
        tables.performance
    ))
    .bind(signal_id)
    .bind(record.horizon_days as i64)
    .bind(format_date(record.exit_date))
    .bind(record.exit_price)
    .bind(record.return_pct)
    .bind(record.max_gain_pct)
    .bind(record.max_drawdown_pct)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

fn signal_from_row(row: &SqliteRow) -> Result<Signal> {
    let opt = |col: &str| -> Result<f64> { Ok(row.try_get::<Option<f64>, _>(col)?.unwrap_or(0.0)) };
    Ok(Signal {
        symbol: row.try_get("symbol")?,
        signal_date: parse_date(row.try_get::<&str, _>("signal_date")?)?,
        signal_price: row.try_get("signal_price")?,
        score: Score::try_from(row.try_get::<i64, _>("score")?)?,
        features: FeatureSet {
            prior_move_pct: opt("prior_move_pct")?,
            pullback_pct: opt("pullback_pct")?,
            volume_decline_pct: opt("volume_decline_pct")?,
            distance_to_breakout_pct: opt("distance_to_breakout")?,
            ..FeatureSet::default()
        },
    })
}

fn record_from_row(signal: &Signal, row: &SqliteRow) -> Result<PerformanceRecord> {
    let days_held: i64 = row.try_get("days_held")?;
    let horizon_days = u32::try_from(days_held)
        .map_err(|_| Error::MalformedResult(format!("horizon {days_held} out of range")))?;
    let record = PerformanceRecord {
        symbol: signal.symbol.clone(),
        signal_date: signal.signal_date,
        horizon_days,
        exit_date: parse_date(row.try_get::<&str, _>("exit_date")?)?,
        exit_price: row.try_get("exit_price")?,
        return_pct: row.try_get("return_pct")?,
        max_gain_pct: row.try_get::<Option<f64>, _>("max_gain_pct")?.unwrap_or(0.0),
        max_drawdown_pct: row.try_get::<Option<f64>, _>("max_drawdown_pct")?.unwrap_or(0.0),
    };
    record.validate()?;
    Ok(record)
}

pub(crate) fn belongs_to(signal: &Signal, record: &PerformanceRecord) -> Result<()> {
    if signal.key() != (record.symbol.as_str(), record.signal_date) {
        return Err(Error::MalformedResult(format!(
            "record for {} {} attached to signal {} {}",
            record.symbol, record.signal_date, signal.symbol, signal.signal_date
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap() + Duration::days(n)
    }

    fn outcome(symbol: &str, signal_day: i64, horizons: &[(u32, f64)]) -> SignalOutcome {
        let signal = Signal {
            symbol: symbol.into(),
            signal_date: day(signal_day),
            signal_price: 25.0,
            score: Score::clamped(82),
            features: FeatureSet {
                prior_move_pct: 61.26,
                pullback_pct: 8.04,
                volume_decline_pct: 37.6,
                distance_to_breakout_pct: 3.33,
                sma_fast_slope: 1.2,
                ..FeatureSet::default()
            },
        };
        let performance = horizons
            .iter()
            .map(|&(h, r)| {
                (
                    h,
                    PerformanceRecord {
                        symbol: symbol.into(),
                        signal_date: day(signal_day),
                        horizon_days: h,
                        exit_date: day(signal_day + h as i64),
                        exit_price: 26.0,
                        return_pct: r,
                        max_gain_pct: 5.0,
                        max_drawdown_pct: -2.0,
                    },
                )
            })
            .collect();
        SignalOutcome { signal, performance }
    }

    #[tokio::test]
    async fn save_then_load_round_trips_persisted_fields() {
        let store = SignalStore::in_memory().await.unwrap();
        let saved = store
            .save_outcomes(&[outcome("AAA", 0, &[(1, 1.5), (5, -0.75)])])
            .await
            .unwrap();
        assert_eq!(saved, SaveSummary { signals: 1, records: 2, rejected: 0 });

        let loaded = store.load_outcomes().await.unwrap();
        assert_eq!(loaded.len(), 1);
        let o = &loaded[0];
        assert_eq!(o.signal.signal_date, day(0));
        assert_eq!(o.signal.score.value(), 82);
        assert_eq!(o.signal.features.prior_move_pct, 61.3);
        assert_eq!(o.signal.features.volume_decline_pct, 38.0);
        assert_eq!(o.signal.features.sma_fast_slope, 0.0);
        assert_eq!(o.return_at(5), Some(-0.75));
        assert_eq!(o.performance[&1].exit_date, day(1));
    }

    #[tokio::test]
    async fn dates_are_stored_as_iso_strings() {
        let store = SignalStore::in_memory().await.unwrap();
        store.save_outcomes(&[outcome("AAA", 0, &[(1, 1.0)])]).await.unwrap();
        let (signal_date, exit_date): (String, String) = sqlx::query_as(
            "SELECT s.signal_date, p.exit_date FROM historical_signals s
             JOIN historical_performance p ON p.signal_id = s.id",
        )
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(signal_date, "2024-04-01");
        assert_eq!(exit_date, "2024-04-02");
    }

    #[tokio::test]
    async fn resaving_updates_in_place() {
        let store = SignalStore::in_memory().await.unwrap();
        store.save_outcomes(&[outcome("AAA", 0, &[(1, 1.0)])]).await.unwrap();
        store
            .save_outcomes(&[outcome("AAA", 0, &[(1, 2.0), (5, 3.0)])])
            .await
            .unwrap();

        let loaded = store.load_outcomes().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].return_at(1), Some(2.0));
        assert_eq!(loaded[0].return_at(5), Some(3.0));

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM historical_performance")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn malformed_records_are_rejected() {
        let store = SignalStore::in_memory().await.unwrap();
        let mut bad = outcome("BAD", 3, &[(1, 1.0), (5, 2.0)]);
        if let Some(r) = bad.performance.get_mut(&5) {
            r.exit_date = day(3);
        }
        let saved = store.save_outcomes(&[bad]).await.unwrap();
        assert_eq!(saved.records, 1);
        assert_eq!(saved.rejected, 1);

        let loaded = store.load_outcomes().await.unwrap();
        assert_eq!(loaded[0].performance.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn malformed_stored_rows_are_skipped_not_fatal() {
        let store = SignalStore::in_memory().await.unwrap();
        store
            .save_outcomes(&[outcome("GOOD", 0, &[(1, 1.0), (5, 2.0)])])
            .await
            .unwrap();

        // A score outside 0..=100 and a record exiting on its signal date,
        // written behind the store's back.
        sqlx::query(
            "INSERT INTO historical_signals (symbol, signal_date, signal_price, score)
             VALUES ('ZZZ', '2024-04-05', 10.0, 140)",
        )
        .execute(store.pool())
        .await
        .unwrap();
        let bad_id: i64 = sqlx::query_scalar(
            "INSERT INTO historical_signals (symbol, signal_date, signal_price, score)
             VALUES ('BAD', '2024-04-08', 10.0, 80) RETURNING id",
        )
        .fetch_one(store.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO historical_performance
                (signal_id, days_held, exit_date, exit_price, return_pct)
             VALUES (?1, 1, '2024-04-08', 10.0, 0.0), (?1, 5, '2024-04-13', 11.0, 10.0)",
        )
        .bind(bad_id)
        .execute(store.pool())
        .await
        .unwrap();

        let loaded = store.load_outcomes().await.unwrap();
        let symbols: Vec<&str> = loaded.iter().map(|o| o.signal.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["GOOD", "BAD"]);
        assert_eq!(loaded[0].performance.len(), 2);
        assert_eq!(loaded[1].performance.keys().copied().collect::<Vec<_>>(), vec![5]);
    }

    #[tokio::test]
    async fn clear_backtest_empties_both_tables() {
        let store = SignalStore::in_memory().await.unwrap();
        store
            .save_outcomes(&[outcome("AAA", 0, &[(1, 1.0)]), outcome("BBB", 9, &[])])
            .await
            .unwrap();
        store.clear_backtest().await.unwrap();
        assert!(store.load_outcomes().await.unwrap().is_empty());
    }
}
