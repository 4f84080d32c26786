//! Feature watermark resolution
//!
//! Computes the next unprocessed calculation window for a feature execution.
//! A timestamp qualifies when every configured (source symbol, period) input
//! has a candle at it; the window starts at the earliest qualifying timestamp
//! newer than the latest existing result, pulled back by the lookback window
//! so the calculation has its trailing context.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use crate::connector::{InputFrame, InputRow};
use crate::schema::CandleBar;
use crate::storage::{FeatureExecutionInput, RepositoryResult};

/// Query helper for watermark resolution and input-frame fetches
pub struct WatermarkResolver {
    pool: PgPool,
}

impl WatermarkResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Timestamp of the latest stored result for an execution
    pub async fn latest_result_time(
        &self,
        feature_execution_id: i64,
    ) -> RepositoryResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            r#"
            SELECT MAX(time) AS latest
            FROM feature_execution_result
            WHERE feature_execution_id = $1
            "#,
        )
        .bind(feature_execution_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("latest"))
    }

    /// Earliest timestamp at which every input of the execution has a candle,
    /// optionally restricted to timestamps strictly after `after`.
    pub async fn next_qualifying_time(
        &self,
        feature_execution_id: i64,
        after: Option<DateTime<Utc>>,
    ) -> RepositoryResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            r#"
            SELECT MIN(times.time) AS next_time
            FROM (
                SELECT cnd.time AS time
                FROM candle cnd
                    INNER JOIN feature_execution_input fei
                        ON cnd.source_symbol_id = fei.source_symbol_id
                        AND cnd.period = fei.period
                WHERE fei.feature_execution_id = $1
                  AND ($2::timestamptz IS NULL OR cnd.time > $2)
                GROUP BY cnd.time
                HAVING COUNT(*) = (
                    SELECT COUNT(*)
                    FROM feature_execution_input
                    WHERE feature_execution_id = $1
                )
            ) times
            "#,
        )
        .bind(feature_execution_id)
        .bind(after)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("next_time"))
    }

    /// Resolve the from-date for the next calculation window, or `None` when
    /// there is nothing left to process.
    pub async fn data_from_date(
        &self,
        feature_execution_id: i64,
        lookback: Duration,
    ) -> RepositoryResult<Option<DateTime<Utc>>> {
        let last_result = self.latest_result_time(feature_execution_id).await?;
        let next = self
            .next_qualifying_time(feature_execution_id, last_result)
            .await?;

        Ok(resolve_from_date(next, lookback, last_result.is_some()))
    }

    /// Fetch the candle rows for one input from `from` onward, joined to any
    /// results the execution already has at those timestamps. Rows without a
    /// result are the ones still to compute; rows with one are lookback
    /// context only.
    pub async fn fetch_input_frame(
        &self,
        feature_execution_id: i64,
        input: &FeatureExecutionInput,
        from: DateTime<Utc>,
    ) -> RepositoryResult<InputFrame> {
        let rows = sqlx::query(
            r#"
            SELECT c.time, c.bid_open, c.bid_high, c.bid_low, c.bid_close,
                   c.ask_open, c.ask_high, c.ask_low, c.ask_close, c.volume,
                   r.result
            FROM candle c
                LEFT JOIN feature_execution_result r
                    ON r.feature_execution_id = $1 AND r.time = c.time
            WHERE c.source_symbol_id = $2 AND c.period = $3 AND c.time >= $4
            ORDER BY c.time ASC
            "#,
        )
        .bind(feature_execution_id)
        .bind(input.source_symbol_id)
        .bind(input.period.as_str())
        .bind(from)
        .fetch_all(&self.pool)
        .await?;

        let rows = rows
            .iter()
            .map(|row| {
                let time: DateTime<Utc> = row.get("time");
                InputRow {
                    time,
                    bar: CandleBar {
                        time,
                        period: input.period,
                        bid_open: row.get("bid_open"),
                        bid_high: row.get("bid_high"),
                        bid_low: row.get("bid_low"),
                        bid_close: row.get("bid_close"),
                        ask_open: row.get("ask_open"),
                        ask_high: row.get("ask_high"),
                        ask_low: row.get("ask_low"),
                        ask_close: row.get("ask_close"),
                        volume: row.get("volume"),
                    },
                    result: row.get::<Option<Decimal>, _>("result"),
                }
            })
            .collect();

        Ok(InputFrame {
            source_symbol_id: input.source_symbol_id,
            period: input.period,
            rows,
        })
    }
}

/// Apply the lookback rule to the next qualifying timestamp.
///
/// With prior results the window is pulled back by the lookback so the
/// calculation re-reads its trailing context. On a first run the earliest
/// qualifying timestamp already has nothing useful before it, so no
/// subtraction is applied.
pub fn resolve_from_date(
    next_qualifying: Option<DateTime<Utc>>,
    lookback: Duration,
    has_prior_results: bool,
) -> Option<DateTime<Utc>> {
    next_qualifying.map(|next| {
        if has_prior_results {
            next - lookback
        } else {
            next
        }
    })
}
