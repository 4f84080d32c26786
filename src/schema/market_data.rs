//! Normalized market data types
//!
//! Connector-specific price data is normalized to these types before storage.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::CandlePeriod;

/// Instrument classification for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentType {
    Forex,
    Cfd,
    Stock,
    Crypto,
}

impl InstrumentType {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentType::Forex => "FOREX",
            InstrumentType::Cfd => "CFD",
            InstrumentType::Stock => "STOCK",
            InstrumentType::Crypto => "CRYPTO",
        }
    }

    /// Parse from the database representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FOREX" => Some(InstrumentType::Forex),
            "CFD" => Some(InstrumentType::Cfd),
            "STOCK" => Some(InstrumentType::Stock),
            "CRYPTO" => Some(InstrumentType::Crypto),
            _ => None,
        }
    }
}

impl std::fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized OHLC bar as returned by a source connector.
///
/// Bid and ask sides are tracked separately; prices are decimals so NUMERIC
/// columns round-trip without floating-point drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleBar {
    /// Bar timestamp (start of the period)
    pub time: DateTime<Utc>,
    /// Candle granularity
    pub period: CandlePeriod,
    pub bid_open: Decimal,
    pub bid_high: Decimal,
    pub bid_low: Decimal,
    pub bid_close: Decimal,
    pub ask_open: Decimal,
    pub ask_high: Decimal,
    pub ask_low: Decimal,
    pub ask_close: Decimal,
    /// Number of ticks that made up the bar
    pub volume: i64,
}

impl CandleBar {
    /// Create a flat bar where every OHLC field carries the same bid/ask pair.
    /// Mostly useful for tests and synthetic data.
    pub fn flat(
        time: DateTime<Utc>,
        period: CandlePeriod,
        bid: Decimal,
        ask: Decimal,
        volume: i64,
    ) -> Self {
        Self {
            time,
            period,
            bid_open: bid,
            bid_high: bid,
            bid_low: bid,
            bid_close: bid,
            ask_open: ask,
            ask_high: ask,
            ask_low: ask,
            ask_close: ask,
            volume,
        }
    }
}

/// One symbol as listed by a source connector.
///
/// Fields beyond the name and instrument type are provider-specific metadata
/// (tick size, digits, …) and are stored verbatim on the source-symbol link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolListing {
    pub name: String,
    pub instrument_type: InstrumentType,
    #[serde(default)]
    pub info: serde_json::Map<String, serde_json::Value>,
}

impl SymbolListing {
    pub fn new(name: impl Into<String>, instrument_type: InstrumentType) -> Self {
        Self {
            name: name.into(),
            instrument_type,
            info: serde_json::Map::new(),
        }
    }

    /// Attach a metadata field
    pub fn with_info(mut self, key: &str, value: serde_json::Value) -> Self {
        self.info.insert(key.to_string(), value);
        self
    }
}
