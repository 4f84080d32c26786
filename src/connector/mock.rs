//! Mock connectors for testing
//!
//! Provides simple deterministic implementations of the connector traits for
//! use in tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::config::ConnectionParams;
use crate::schema::{CandleBar, CandlePeriod, InstrumentType, SymbolListing};

use super::{
    ConnectorError, ConnectorResult, FeatureConnector, InputFrame, ResultPoint, SourceConnector,
};

/// Mock price source.
///
/// Generates a deterministic zig-zag price series at exact period boundaries,
/// which makes incremental-retrieval assertions straightforward.
#[derive(Debug)]
pub struct MockSource {
    base_price: Decimal,
    price_step: Decimal,
    /// Cap on bars returned per request
    pub max_bars: usize,
}

impl MockSource {
    pub fn new(params: &ConnectionParams) -> ConnectorResult<Self> {
        let base_price = match params.get_opt("base_price") {
            Some(_) => params
                .get_decimal("base_price")
                .map_err(|e| ConnectorError::Configuration(e.to_string()))?,
            None => Decimal::from(100),
        };

        Ok(Self {
            base_price,
            price_step: Decimal::ONE,
            max_bars: 1000,
        })
    }

    fn generate_bars(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        period: CandlePeriod,
    ) -> Vec<CandleBar> {
        let step = period.duration();
        let mut bars = Vec::new();
        let mut time = from;
        let spread = Decimal::new(2, 4); // 0.0002

        let mut i = 0i64;
        while time <= to && bars.len() < self.max_bars {
            let delta = if i % 2 == 0 {
                self.price_step
            } else {
                -self.price_step
            };
            let bid = self.base_price + delta;
            bars.push(CandleBar::flat(time, period, bid, bid + spread, i % 100 + 1));
            time = time + step;
            i += 1;
        }

        bars
    }
}

#[async_trait]
impl SourceConnector for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_symbols(&self) -> ConnectorResult<Vec<SymbolListing>> {
        Ok(vec![
            SymbolListing::new("MOCKGBPUSD", InstrumentType::Forex)
                .with_info("digits", serde_json::json!("5")),
            SymbolListing::new("MOCKEURUSD", InstrumentType::Forex)
                .with_info("digits", serde_json::json!("5")),
            SymbolListing::new("MOCKBTCUSD", InstrumentType::Crypto),
        ])
    }

    async fn get_prices(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        period: CandlePeriod,
        _symbol_info: &serde_json::Value,
    ) -> ConnectorResult<Vec<CandleBar>> {
        if from > to {
            return Err(ConnectorError::DataNotAvailable(format!(
                "No {} data for {} in an empty range {} to {}",
                period, symbol, from, to
            )));
        }

        Ok(self.generate_bars(from, to, period))
    }
}

/// Mock feature.
///
/// Emits the bid close of the first input as the result for every timestamp
/// that does not already carry one.
#[derive(Default, Debug)]
pub struct MockFeature;

#[async_trait]
impl FeatureConnector for MockFeature {
    fn name(&self) -> &str {
        "mock"
    }

    async fn execute(
        &self,
        _lookback: chrono::Duration,
        inputs: &[InputFrame],
    ) -> ConnectorResult<Vec<ResultPoint>> {
        let frame = inputs
            .first()
            .ok_or_else(|| ConnectorError::Configuration("No inputs configured".to_string()))?;

        Ok(frame
            .rows
            .iter()
            .filter(|row| row.result.is_none())
            .map(|row| ResultPoint {
                time: row.time,
                result: row.bar.bid_close,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::InputRow;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn mock_source() -> MockSource {
        MockSource::new(&ConnectionParams::default()).unwrap()
    }

    #[tokio::test]
    async fn test_bars_land_on_period_boundaries() {
        let source = mock_source();
        let from = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 9).unwrap();

        let bars = source
            .get_prices("MOCKGBPUSD", from, to, CandlePeriod::OneSecond, &serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(bars.len(), 10);
        assert_eq!(bars[0].time, from);
        assert_eq!(bars[9].time, to);
        assert_eq!(bars[1].time - bars[0].time, chrono::Duration::seconds(1));
    }

    #[tokio::test]
    async fn test_empty_range_is_data_not_available() {
        let source = mock_source();
        let from = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

        let err = source
            .get_prices("MOCKGBPUSD", from, to, CandlePeriod::OneMinute, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::DataNotAvailable(_)));
    }

    #[tokio::test]
    async fn test_request_cap() {
        let mut source = mock_source();
        source.max_bars = 5;
        let from = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2020, 1, 1, 1, 0, 0).unwrap();

        let bars = source
            .get_prices("MOCKGBPUSD", from, to, CandlePeriod::OneSecond, &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(bars.len(), 5);
    }

    #[tokio::test]
    async fn test_mock_feature_skips_calculated_rows() {
        let t0 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let rows = (0..4)
            .map(|i| {
                let time = t0 + chrono::Duration::seconds(i);
                InputRow {
                    time,
                    bar: CandleBar::flat(
                        time,
                        CandlePeriod::OneSecond,
                        dec!(1.5),
                        dec!(1.5002),
                        1,
                    ),
                    result: if i < 2 { Some(dec!(1.5)) } else { None },
                }
            })
            .collect();

        let frame = InputFrame {
            source_symbol_id: 1,
            period: CandlePeriod::OneSecond,
            rows,
        };

        let points = MockFeature
            .execute(chrono::Duration::minutes(1), &[frame])
            .await
            .unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].time, t0 + chrono::Duration::seconds(2));
        assert_eq!(points[0].result, dec!(1.5));
    }
}
