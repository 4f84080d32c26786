//! Database-backed pipeline scenarios
//!
//! These tests exercise the upsert engine, retrieval watermarking, and the
//! feature watermark resolver against a live PostgreSQL instance. They are
//! ignored by default; point DATABASE_URL at a scratch database and run with
//! `cargo test -- --ignored` to execute them.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use marketdata_manager::connector::{
    ConnectorRegistry, ConnectorResult, SourceConnector,
};
use marketdata_manager::feature::WatermarkResolver;
use marketdata_manager::pipeline::PriceRetriever;
use marketdata_manager::schema::{CandleBar, CandlePeriod, SymbolListing};
use marketdata_manager::storage::{
    bulk_upsert, run_migrations, Dataset, MarketDataRepository, Value,
};

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must point at a scratch database for these tests");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect to test database");
    run_migrations(&pool).await.expect("migrations failed");
    pool
}

fn symbol_dataset(prefix: &str, range: std::ops::Range<usize>, instrument_type: &str) -> Dataset {
    let mut dataset = Dataset::new(["name", "instrument_type"]);
    for i in range {
        dataset.push_row([
            Value::from(format!("{}_Symbol_{}", prefix, i)),
            Value::from(instrument_type),
        ]);
    }
    dataset
}

async fn count_symbols(pool: &PgPool, prefix: &str, instrument_type: Option<&str>) -> i64 {
    let pattern = format!("{}_Symbol_%", prefix);
    let row = match instrument_type {
        Some(it) => {
            sqlx::query("SELECT COUNT(*) AS n FROM symbol WHERE name LIKE $1 AND instrument_type = $2")
                .bind(&pattern)
                .bind(it)
                .fetch_one(pool)
                .await
        }
        None => {
            sqlx::query("SELECT COUNT(*) AS n FROM symbol WHERE name LIKE $1")
                .bind(&pattern)
                .fetch_one(pool)
                .await
        }
    }
    .unwrap();
    row.get("n")
}

async fn clear_symbols(pool: &PgPool, prefix: &str) {
    sqlx::query("DELETE FROM symbol WHERE name LIKE $1")
        .bind(format!("{}_Symbol_%", prefix))
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn bulk_insert_creates_every_row() {
    let pool = test_pool().await;
    clear_symbols(&pool, "bulkinsert").await;

    let dataset = symbol_dataset("bulkinsert", 0..100, "FOREX");
    bulk_upsert(&pool, "symbol", &dataset, &[], None)
        .await
        .unwrap();

    assert_eq!(count_symbols(&pool, "bulkinsert", None).await, 100);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn bulk_upsert_updates_overlap_instead_of_duplicating() {
    let pool = test_pool().await;
    clear_symbols(&pool, "bulkupsert").await;

    let dataset = symbol_dataset("bulkupsert", 0..100, "FOREX");
    bulk_upsert(&pool, "symbol", &dataset, &[], None)
        .await
        .unwrap();

    // 5 overlapping names and 5 new ones, all reclassified as CFD
    let dataset = symbol_dataset("bulkupsert", 95..105, "CFD");
    bulk_upsert(&pool, "symbol", &dataset, &["name"], None)
        .await
        .unwrap();

    assert_eq!(count_symbols(&pool, "bulkupsert", None).await, 105);
    assert_eq!(count_symbols(&pool, "bulkupsert", Some("FOREX")).await, 95);
    assert_eq!(count_symbols(&pool, "bulkupsert", Some("CFD")).await, 10);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn batched_insert_applies_every_chunk() {
    let pool = test_pool().await;
    clear_symbols(&pool, "batching").await;

    let dataset = symbol_dataset("batching", 0..1000, "FOREX");
    bulk_upsert(&pool, "symbol", &dataset, &[], Some(100))
        .await
        .unwrap();

    assert_eq!(count_symbols(&pool, "batching", None).await, 1000);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn upsert_is_idempotent_and_preserves_decimal_precision() {
    let pool = test_pool().await;
    let fixture = CandleFixture::create(&pool).await;

    let time = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let price = dec!(123456.654321); // full NUMERIC(12, 6) width

    let mut dataset = candle_dataset(&[CandleBar::flat(
        time,
        CandlePeriod::OneSecond,
        price,
        price,
        7,
    )]);
    dataset.add_constant_column("source_symbol_id", Value::BigInt(fixture.source_symbol_id));

    let keys = ["source_symbol_id", "time", "period"];
    bulk_upsert(&pool, "candle", &dataset, &keys, None)
        .await
        .unwrap();
    bulk_upsert(&pool, "candle", &dataset, &keys, None)
        .await
        .unwrap();

    let row = sqlx::query(
        "SELECT COUNT(*) AS n, MAX(bid_close) AS bid_close FROM candle WHERE source_symbol_id = $1",
    )
    .bind(fixture.source_symbol_id)
    .fetch_one(&pool)
    .await
    .unwrap();

    assert_eq!(row.get::<i64, _>("n"), 1);
    assert_eq!(row.get::<Decimal, _>("bid_close"), price);
}

/// A source connector that records the ranges it was asked for
#[derive(Debug)]
struct RecordingSource {
    calls: Arc<Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>>,
}

#[async_trait]
impl SourceConnector for RecordingSource {
    fn name(&self) -> &str {
        "recording"
    }

    async fn get_symbols(&self) -> ConnectorResult<Vec<SymbolListing>> {
        Ok(vec![])
    }

    async fn get_prices(
        &self,
        _symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        _period: CandlePeriod,
        _symbol_info: &serde_json::Value,
    ) -> ConnectorResult<Vec<CandleBar>> {
        self.calls.lock().unwrap().push((from, to));
        Ok(vec![])
    }
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn retrieval_requests_one_millisecond_past_the_latest_candle() {
    let pool = test_pool().await;
    let fixture = CandleFixture::create(&pool).await;

    // 5 stored candles, the latest at 00:00:05
    let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    fixture
        .insert_candles(&pool, base + Duration::seconds(1), 5)
        .await;
    let latest = base + Duration::seconds(5);

    let calls: Arc<Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>> = Arc::new(Mutex::new(Vec::new()));
    let registry = recording_registry(calls.clone());

    let repository = Arc::new(MarketDataRepository::new(pool.clone(), 1000));
    PriceRetriever::new(repository, registry)
        .run(fixture.source_period_id)
        .await
        .unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, latest + Duration::milliseconds(1));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn retrieval_starts_from_the_configured_date_without_candles() {
    let pool = test_pool().await;
    let fixture = CandleFixture::create(&pool).await;

    let calls: Arc<Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>> = Arc::new(Mutex::new(Vec::new()));
    let registry = recording_registry(calls.clone());

    let repository = Arc::new(MarketDataRepository::new(pool.clone(), 1000));
    PriceRetriever::new(repository, registry)
        .run(fixture.source_period_id)
        .await
        .unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, fixture.start_from);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn watermark_first_run_starts_at_the_earliest_candle() {
    let pool = test_pool().await;
    let fixture = CandleFixture::create(&pool).await;

    // 1000 one-second candles, the first at 00:00:01
    let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    fixture
        .insert_candles(&pool, base + Duration::seconds(1), 1000)
        .await;

    let resolver = WatermarkResolver::new(pool.clone());
    let from = resolver
        .data_from_date(fixture.execution_id, Duration::minutes(1))
        .await
        .unwrap();

    assert_eq!(from, Some(base + Duration::seconds(1)));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn watermark_resumed_run_subtracts_the_lookback() {
    let pool = test_pool().await;
    let fixture = CandleFixture::create(&pool).await;

    let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    fixture
        .insert_candles(&pool, base + Duration::seconds(1), 1000)
        .await;
    // Results exist for seconds 1..=300
    fixture
        .insert_results(&pool, base + Duration::seconds(1), 300)
        .await;

    let resolver = WatermarkResolver::new(pool.clone());
    let from = resolver
        .data_from_date(fixture.execution_id, Duration::minutes(1))
        .await
        .unwrap();

    // Next uncalculated candle is at 00:05:01; minus the one-minute lookback
    assert_eq!(from, Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 4, 1).unwrap()));

    // The input frame from that date spans the 700 uncalculated candles plus
    // the 60 lookback rows that already carry results
    let inputs = MarketDataRepository::new(pool.clone(), 1000)
        .execution_inputs(fixture.execution_id)
        .await
        .unwrap();
    let frame = resolver
        .fetch_input_frame(fixture.execution_id, &inputs[0], from.unwrap())
        .await
        .unwrap();
    assert_eq!(frame.rows.len(), 760);
    assert_eq!(frame.uncalculated_times().count(), 700);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn watermark_signals_nothing_left_once_results_cover_every_candle() {
    let pool = test_pool().await;
    let fixture = CandleFixture::create(&pool).await;

    let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    fixture
        .insert_candles(&pool, base + Duration::seconds(1), 1000)
        .await;
    fixture
        .insert_results(&pool, base + Duration::seconds(1), 1000)
        .await;

    let resolver = WatermarkResolver::new(pool.clone());
    let from = resolver
        .data_from_date(fixture.execution_id, Duration::minutes(1))
        .await
        .unwrap();

    assert_eq!(from, None);
}

/// One source, symbol, source-symbol link, active 1S source-period, and a
/// feature execution with that link as its single input. Names are
/// randomized so tests do not interfere with each other.
struct CandleFixture {
    source_period_id: i64,
    source_symbol_id: i64,
    execution_id: i64,
    start_from: DateTime<Utc>,
}

impl CandleFixture {
    async fn create(pool: &PgPool) -> Self {
        let tag = Uuid::new_v4().simple().to_string();
        let start_from = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

        let source_id: i64 = sqlx::query(
            "INSERT INTO source (name, connector, connection_params, active)
             VALUES ($1, 'recording', '{}', TRUE) RETURNING id",
        )
        .bind(format!("src_{}", tag))
        .fetch_one(pool)
        .await
        .unwrap()
        .get("id");

        let symbol_id: i64 = sqlx::query(
            "INSERT INTO symbol (name, instrument_type) VALUES ($1, 'FOREX') RETURNING id",
        )
        .bind(format!("sym_{}", tag))
        .fetch_one(pool)
        .await
        .unwrap()
        .get("id");

        let source_symbol_id: i64 = sqlx::query(
            "INSERT INTO source_symbol (source_id, symbol_id, retrieve_prices, symbol_info)
             VALUES ($1, $2, TRUE, '{}') RETURNING id",
        )
        .bind(source_id)
        .bind(symbol_id)
        .fetch_one(pool)
        .await
        .unwrap()
        .get("id");

        let source_period_id: i64 = sqlx::query(
            "INSERT INTO source_period (source_id, period, start_from, active)
             VALUES ($1, '1S', $2, TRUE) RETURNING id",
        )
        .bind(source_id)
        .bind(start_from)
        .fetch_one(pool)
        .await
        .unwrap()
        .get("id");

        let feature_id: i64 = sqlx::query(
            "INSERT INTO feature (name, connector, lookback, schedule, active)
             VALUES ($1, 'moving_average', '1M', 'every 1s', TRUE) RETURNING id",
        )
        .bind(format!("feat_{}", tag))
        .fetch_one(pool)
        .await
        .unwrap()
        .get("id");

        let execution_id: i64 = sqlx::query(
            "INSERT INTO feature_execution (feature_id, name, active)
             VALUES ($1, $2, TRUE) RETURNING id",
        )
        .bind(feature_id)
        .bind(format!("exec_{}", tag))
        .fetch_one(pool)
        .await
        .unwrap()
        .get("id");

        sqlx::query(
            "INSERT INTO feature_execution_input (feature_execution_id, source_symbol_id, period)
             VALUES ($1, $2, '1S')",
        )
        .bind(execution_id)
        .bind(source_symbol_id)
        .execute(pool)
        .await
        .unwrap();

        Self {
            source_period_id,
            source_symbol_id,
            execution_id,
            start_from,
        }
    }

    /// Insert `count` one-second candles starting at `first`
    async fn insert_candles(&self, pool: &PgPool, first: DateTime<Utc>, count: usize) {
        let bars: Vec<CandleBar> = (0..count)
            .map(|i| {
                CandleBar::flat(
                    first + Duration::seconds(i as i64),
                    CandlePeriod::OneSecond,
                    dec!(1.25) + Decimal::from(i as i64 % 10) / dec!(100),
                    dec!(1.2502),
                    i as i64,
                )
            })
            .collect();

        let mut dataset = candle_dataset(&bars);
        dataset.add_constant_column("source_symbol_id", Value::BigInt(self.source_symbol_id));

        bulk_upsert(
            pool,
            "candle",
            &dataset,
            &["source_symbol_id", "time", "period"],
            Some(500),
        )
        .await
        .unwrap();
    }

    /// Insert `count` one-second-spaced results starting at `first`
    async fn insert_results(&self, pool: &PgPool, first: DateTime<Utc>, count: usize) {
        let mut dataset = Dataset::new(["time", "result"]);
        for i in 0..count {
            dataset.push_row([
                Value::Timestamp(first + Duration::seconds(i as i64)),
                Value::Decimal(dec!(0.5)),
            ]);
        }
        dataset.add_constant_column("feature_execution_id", Value::BigInt(self.execution_id));

        bulk_upsert(
            pool,
            "feature_execution_result",
            &dataset,
            &["feature_execution_id", "time"],
            Some(500),
        )
        .await
        .unwrap();
    }
}

fn candle_dataset(bars: &[CandleBar]) -> Dataset {
    let mut dataset = Dataset::new([
        "time", "period", "bid_open", "bid_high", "bid_low", "bid_close", "ask_open", "ask_high",
        "ask_low", "ask_close", "volume",
    ]);
    for bar in bars {
        dataset.push_row([
            Value::Timestamp(bar.time),
            Value::Text(bar.period.as_str().to_string()),
            Value::Decimal(bar.bid_open),
            Value::Decimal(bar.bid_high),
            Value::Decimal(bar.bid_low),
            Value::Decimal(bar.bid_close),
            Value::Decimal(bar.ask_open),
            Value::Decimal(bar.ask_high),
            Value::Decimal(bar.ask_low),
            Value::Decimal(bar.ask_close),
            Value::BigInt(bar.volume),
        ]);
    }
    dataset
}

fn recording_registry(
    calls: Arc<Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>>,
) -> Arc<ConnectorRegistry> {
    let mut registry = ConnectorRegistry::new();
    registry.register_source("recording", move |_params| {
        Ok(Arc::new(RecordingSource {
            calls: calls.clone(),
        }) as _)
    });
    Arc::new(registry)
}
