use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{info, warn};

use common::{Error, PerformanceRecord, Result, Signal, SignalOutcome};

use crate::signals::{insert_record, LIVE};
use crate::{format_date, SaveSummary, SignalStore};

impl SignalStore {
    /// Record live signals. A symbol already recorded for the same date is
    /// left untouched. Returns how many new signals were stored.
    pub async fn record_live_signals(&self, signals: &[Signal]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for signal in signals {
            let f = signal.features.rounded();
            let result = sqlx::query(
                r#"
                INSERT INTO live_signals
                    (symbol, signal_date, signal_price, score, prior_move_pct,
                     pullback_pct, volume_decline_pct, distance_to_breakout)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(symbol, signal_date) DO NOTHING
                "#,
            )
            .bind(&signal.symbol)
            .bind(format_date(signal.signal_date))
            .bind(signal.signal_price)
            .bind(signal.score.value() as i64)
            .bind(f.prior_move_pct)
            .bind(f.pullback_pct)
            .bind(f.volume_decline_pct)
            .bind(f.distance_to_breakout_pct)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        info!(offered = signals.len(), inserted, "Recorded live signals");
        Ok(inserted)
    }

    /// Live signals dated before `as_of` that still lack a measurement at one
    /// of `horizons`, with whatever has been measured so far.
    pub async fn pending_live_signals(&self, horizons: &[u32], as_of: NaiveDate) -> Result<Vec<SignalOutcome>> {
        Ok(self
            .load_from(LIVE)
            .await?
            .into_iter()
            .filter(|o| o.signal.signal_date < as_of)
            .filter(|o| horizons.iter().any(|h| !o.performance.contains_key(h)))
            .collect())
    }

    /// Store follow-up measurements of live signals. A horizon already
    /// measured keeps its first measurement. Records that fail validation or
    /// point at an unknown signal are logged and counted as rejected.
    pub async fn save_live_performance(&self, records: &[PerformanceRecord]) -> Result<SaveSummary> {
        let mut summary = SaveSummary::default();
        let mut tx = self.pool.begin().await?;
        let mut ids: HashMap<(String, NaiveDate), Option<i64>> = HashMap::new();

        for record in records {
            let key = (record.symbol.clone(), record.signal_date);
            let signal_id = match ids.get(&key) {
                Some(id) => *id,
                None => {
                    let id: Option<i64> =
                        sqlx::query_scalar("SELECT id FROM live_signals WHERE symbol = ?1 AND signal_date = ?2")
                            .bind(&record.symbol)
                            .bind(format_date(record.signal_date))
                            .fetch_optional(&mut *tx)
                            .await?;
                    ids.insert(key, id);
                    id
                }
            };

            let checked = signal_id
                .ok_or_else(|| Error::MalformedResult("no live signal for record".into()))
                .and_then(|id| record.validate().map(|_| id));
            let id = match checked {
                Ok(id) => id,
                Err(e) => {
                    warn!(symbol = %record.symbol, date = %record.signal_date, error = %e, "Rejected live measurement");
                    summary.rejected += 1;
                    continue;
                }
            };

            if insert_record(&mut *tx, LIVE, id, record, false).await? {
                summary.records += 1;
            }
        }

        tx.commit().await?;
        info!(records = summary.records, rejected = summary.rejected, "Saved live performance");
        Ok(summary)
    }

    /// Every live signal with its measurements, oldest first.
    pub async fn load_live_outcomes(&self) -> Result<Vec<SignalOutcome>> {
        self.load_from(LIVE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{FeatureSet, Score};

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap() + Duration::days(n)
    }

    fn signal(symbol: &str, d: i64, score: i32) -> Signal {
        Signal {
            symbol: symbol.into(),
            signal_date: day(d),
            signal_price: 50.0,
            score: Score::clamped(score),
            features: FeatureSet {
                prior_move_pct: 44.44,
                ..FeatureSet::default()
            },
        }
    }

    fn record(symbol: &str, d: i64, horizon: u32, return_pct: f64) -> PerformanceRecord {
        PerformanceRecord {
            symbol: symbol.into(),
            signal_date: day(d),
            horizon_days: horizon,
            exit_date: day(d + horizon as i64),
            exit_price: 50.0 * (1.0 + return_pct / 100.0),
            return_pct,
            max_gain_pct: return_pct.max(0.0),
            max_drawdown_pct: return_pct.min(0.0),
        }
    }

    #[tokio::test]
    async fn same_day_signal_is_recorded_once() {
        let store = SignalStore::in_memory().await.unwrap();
        assert_eq!(store.record_live_signals(&[signal("NVDA", 0, 85)]).await.unwrap(), 1);
        assert_eq!(
            store
                .record_live_signals(&[signal("NVDA", 0, 92), signal("NVDA", 1, 81)])
                .await
                .unwrap(),
            1
        );

        let live = store.load_live_outcomes().await.unwrap();
        assert_eq!(live.len(), 2);
        assert_eq!(live[0].signal.score.value(), 85);
        assert_eq!(live[0].signal.features.prior_move_pct, 44.4);
        assert!(store.load_outcomes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn measurements_are_kept_from_first_write() {
        let store = SignalStore::in_memory().await.unwrap();
        store.record_live_signals(&[signal("AMD", 0, 88)]).await.unwrap();

        let first = store.save_live_performance(&[record("AMD", 0, 1, 2.0)]).await.unwrap();
        assert_eq!(first.records, 1);
        let again = store
            .save_live_performance(&[record("AMD", 0, 1, 9.0), record("AMD", 0, 5, -1.5)])
            .await
            .unwrap();
        assert_eq!(again.records, 1);

        let live = store.load_live_outcomes().await.unwrap();
        assert_eq!(live[0].return_at(1), Some(2.0));
        assert_eq!(live[0].return_at(5), Some(-1.5));
    }

    #[tokio::test]
    async fn orphan_and_invalid_measurements_are_rejected() {
        let store = SignalStore::in_memory().await.unwrap();
        store.record_live_signals(&[signal("AMD", 0, 88)]).await.unwrap();

        let mut same_day = record("AMD", 0, 5, 1.0);
        same_day.exit_date = day(0);
        let saved = store
            .save_live_performance(&[record("GONE", 0, 1, 1.0), same_day])
            .await
            .unwrap();
        assert_eq!(saved.records, 0);
        assert_eq!(saved.rejected, 2);
    }

    #[tokio::test]
    async fn pending_excludes_complete_and_same_day_signals() {
        let store = SignalStore::in_memory().await.unwrap();
        store
            .record_live_signals(&[signal("DONE", 0, 90), signal("PART", 0, 90), signal("TODAY", 10, 90)])
            .await
            .unwrap();
        store
            .save_live_performance(&[
                record("DONE", 0, 1, 1.0),
                record("DONE", 0, 5, 2.0),
                record("PART", 0, 1, 1.0),
            ])
            .await
            .unwrap();

        let pending = store.pending_live_signals(&[1, 5], day(10)).await.unwrap();
        let symbols: Vec<&str> = pending.iter().map(|o| o.signal.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["PART"]);
        assert!(pending[0].performance.contains_key(&1));
    }
}
