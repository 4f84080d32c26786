//! Moving average feature
//!
//! Single-input moving average of the bid close over the lookback window.
//! For every candle time without an existing result, the result is the mean
//! of the bid closes of all candles in `(time − lookback, time]`.

use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::Decimal;

use crate::connector::{
    ConnectorError, ConnectorResult, FeatureConnector, InputFrame, ResultPoint,
};

/// Builtin moving-average feature connector
#[derive(Default, Debug)]
pub struct MovingAverage;

impl MovingAverage {
    /// Compute the moving-average points for one frame. Rows are expected in
    /// ascending time order; rows that already carry a result contribute to
    /// the window but are not re-emitted.
    fn compute(&self, lookback: Duration, frame: &InputFrame) -> Vec<ResultPoint> {
        let rows = &frame.rows;
        let mut points = Vec::new();

        let mut window_start = 0usize;
        let mut sum = Decimal::ZERO;

        for i in 0..rows.len() {
            sum += rows[i].bar.bid_close;

            // Window is (t - lookback, t]
            let cutoff = rows[i].time - lookback;
            while rows[window_start].time <= cutoff {
                sum -= rows[window_start].bar.bid_close;
                window_start += 1;
            }

            if rows[i].result.is_none() {
                let count = Decimal::from((i - window_start + 1) as i64);
                points.push(ResultPoint {
                    time: rows[i].time,
                    result: sum / count,
                });
            }
        }

        points
    }
}

#[async_trait]
impl FeatureConnector for MovingAverage {
    fn name(&self) -> &str {
        "moving_average"
    }

    async fn execute(
        &self,
        lookback: Duration,
        inputs: &[InputFrame],
    ) -> ConnectorResult<Vec<ResultPoint>> {
        if inputs.len() != 1 {
            return Err(ConnectorError::Configuration(format!(
                "Moving average takes exactly one input, got {}",
                inputs.len()
            )));
        }

        Ok(self.compute(lookback, &inputs[0]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::InputRow;
    use crate::schema::{CandleBar, CandlePeriod};
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn frame(prices: &[(i64, Decimal, bool)]) -> (DateTime<Utc>, InputFrame) {
        let t0 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let rows = prices
            .iter()
            .map(|(offset, price, calculated)| {
                let time = t0 + Duration::seconds(*offset);
                InputRow {
                    time,
                    bar: CandleBar::flat(time, CandlePeriod::OneSecond, *price, *price, 1),
                    result: calculated.then_some(*price),
                }
            })
            .collect();

        (
            t0,
            InputFrame {
                source_symbol_id: 1,
                period: CandlePeriod::OneSecond,
                rows,
            },
        )
    }

    #[tokio::test]
    async fn test_partial_window_at_series_start() {
        let (t0, frame) = frame(&[(0, dec!(2), false), (1, dec!(4), false), (2, dec!(6), false)]);

        let points = MovingAverage
            .execute(Duration::seconds(10), &[frame])
            .await
            .unwrap();

        // Every row lacks a result, so every row gets one; early rows average
        // over however much history exists.
        assert_eq!(points.len(), 3);
        assert_eq!(points[0], ResultPoint { time: t0, result: dec!(2) });
        assert_eq!(points[1].result, dec!(3));
        assert_eq!(points[2].result, dec!(4));
    }

    #[tokio::test]
    async fn test_window_slides_past_old_candles() {
        // 2-second window over one-second candles: each average covers the
        // current candle and its predecessor only.
        let (_, frame) = frame(&[
            (0, dec!(10), false),
            (1, dec!(20), false),
            (2, dec!(30), false),
            (3, dec!(40), false),
        ]);

        let points = MovingAverage
            .execute(Duration::seconds(2), &[frame])
            .await
            .unwrap();

        assert_eq!(points[2].result, dec!(25));
        assert_eq!(points[3].result, dec!(35));
    }

    #[tokio::test]
    async fn test_calculated_rows_feed_the_window_but_are_not_emitted() {
        let (t0, frame) = frame(&[
            (0, dec!(10), true),
            (1, dec!(20), true),
            (2, dec!(30), false),
        ]);

        let points = MovingAverage
            .execute(Duration::seconds(10), &[frame])
            .await
            .unwrap();

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].time, t0 + Duration::seconds(2));
        assert_eq!(points[0].result, dec!(20));
    }

    #[tokio::test]
    async fn test_requires_exactly_one_input() {
        let (_, f1) = frame(&[(0, dec!(1), false)]);
        let (_, f2) = frame(&[(0, dec!(1), false)]);

        let err = MovingAverage
            .execute(Duration::seconds(1), &[f1, f2])
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration(_)));
    }
}
