//! Schema migrations
//!
//! Idempotent DDL bootstrap for the configuration and market data tables.

use sqlx::PgPool;
use tracing::info;

use super::RepositoryResult;

/// Create all tables and indexes if they do not exist
pub async fn run_migrations(pool: &PgPool) -> RepositoryResult<()> {
    info!("Running database migrations...");

    let statements: &[&str] = &[
        r#"
        CREATE TABLE IF NOT EXISTS symbol (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(50) NOT NULL UNIQUE,
            instrument_type VARCHAR(10) NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS source (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(50) NOT NULL UNIQUE,
            connector VARCHAR(50) NOT NULL,
            connection_params JSONB NOT NULL DEFAULT '{}',
            active BOOLEAN NOT NULL DEFAULT TRUE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS source_symbol (
            id BIGSERIAL PRIMARY KEY,
            source_id BIGINT NOT NULL REFERENCES source(id) ON DELETE CASCADE,
            symbol_id BIGINT NOT NULL REFERENCES symbol(id) ON DELETE CASCADE,
            retrieve_prices BOOLEAN NOT NULL DEFAULT TRUE,
            symbol_info JSONB NOT NULL DEFAULT '{}',
            UNIQUE (source_id, symbol_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS source_period (
            id BIGSERIAL PRIMARY KEY,
            source_id BIGINT NOT NULL REFERENCES source(id) ON DELETE CASCADE,
            period VARCHAR(3) NOT NULL,
            start_from TIMESTAMPTZ NOT NULL,
            active BOOLEAN NOT NULL DEFAULT FALSE,
            UNIQUE (source_id, period)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS candle (
            source_symbol_id BIGINT NOT NULL REFERENCES source_symbol(id) ON DELETE CASCADE,
            time TIMESTAMPTZ NOT NULL,
            period VARCHAR(3) NOT NULL,
            bid_open NUMERIC(12, 6) NOT NULL,
            bid_high NUMERIC(12, 6) NOT NULL,
            bid_low NUMERIC(12, 6) NOT NULL,
            bid_close NUMERIC(12, 6) NOT NULL,
            ask_open NUMERIC(12, 6) NOT NULL,
            ask_high NUMERIC(12, 6) NOT NULL,
            ask_low NUMERIC(12, 6) NOT NULL,
            ask_close NUMERIC(12, 6) NOT NULL,
            volume BIGINT NOT NULL,
            UNIQUE (source_symbol_id, time, period)
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_candle_time
        ON candle (source_symbol_id, period, time DESC)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS feature (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(50) NOT NULL UNIQUE,
            connector VARCHAR(50) NOT NULL,
            lookback VARCHAR(6) NOT NULL,
            schedule VARCHAR(50) NOT NULL,
            active BOOLEAN NOT NULL DEFAULT TRUE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS feature_execution (
            id BIGSERIAL PRIMARY KEY,
            feature_id BIGINT NOT NULL REFERENCES feature(id) ON DELETE CASCADE,
            name VARCHAR(100) NOT NULL UNIQUE,
            active BOOLEAN NOT NULL DEFAULT TRUE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS feature_execution_input (
            id BIGSERIAL PRIMARY KEY,
            feature_execution_id BIGINT NOT NULL REFERENCES feature_execution(id) ON DELETE CASCADE,
            source_symbol_id BIGINT NOT NULL REFERENCES source_symbol(id) ON DELETE CASCADE,
            period VARCHAR(3) NOT NULL,
            UNIQUE (feature_execution_id, source_symbol_id, period)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS feature_execution_result (
            feature_execution_id BIGINT NOT NULL REFERENCES feature_execution(id) ON DELETE CASCADE,
            time TIMESTAMPTZ NOT NULL,
            result NUMERIC(12, 6) NOT NULL,
            UNIQUE (feature_execution_id, time)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS summary_batch (
            id BIGSERIAL PRIMARY KEY,
            time TIMESTAMPTZ NOT NULL UNIQUE,
            status VARCHAR(16) NOT NULL DEFAULT 'not_started'
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS summary_metric (
            summary_batch_id BIGINT NOT NULL REFERENCES summary_batch(id) ON DELETE CASCADE,
            source_symbol_id BIGINT NOT NULL,
            source_period_id BIGINT NOT NULL,
            first_candle_time TIMESTAMPTZ NOT NULL,
            last_candle_time TIMESTAMPTZ NOT NULL,
            num_candles BIGINT NOT NULL,
            minute_min BIGINT NOT NULL,
            minute_max BIGINT NOT NULL,
            minute_avg NUMERIC(12, 6) NOT NULL,
            hour_min BIGINT NOT NULL,
            hour_max BIGINT NOT NULL,
            hour_avg NUMERIC(12, 6) NOT NULL,
            day_min BIGINT NOT NULL,
            day_max BIGINT NOT NULL,
            day_avg NUMERIC(12, 6) NOT NULL,
            week_min BIGINT NOT NULL,
            week_max BIGINT NOT NULL,
            week_avg NUMERIC(12, 6) NOT NULL,
            month_min BIGINT NOT NULL,
            month_max BIGINT NOT NULL,
            month_avg NUMERIC(12, 6) NOT NULL,
            UNIQUE (summary_batch_id, source_symbol_id, source_period_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS summary_metric_all_sources (
            summary_batch_id BIGINT NOT NULL REFERENCES summary_batch(id) ON DELETE CASCADE,
            symbol_id BIGINT NOT NULL,
            period VARCHAR(3) NOT NULL,
            first_candle_time TIMESTAMPTZ NOT NULL,
            last_candle_time TIMESTAMPTZ NOT NULL,
            num_candles BIGINT NOT NULL,
            minute_min BIGINT NOT NULL,
            minute_max BIGINT NOT NULL,
            minute_avg NUMERIC(12, 6) NOT NULL,
            hour_min BIGINT NOT NULL,
            hour_max BIGINT NOT NULL,
            hour_avg NUMERIC(12, 6) NOT NULL,
            day_min BIGINT NOT NULL,
            day_max BIGINT NOT NULL,
            day_avg NUMERIC(12, 6) NOT NULL,
            week_min BIGINT NOT NULL,
            week_max BIGINT NOT NULL,
            week_avg NUMERIC(12, 6) NOT NULL,
            month_min BIGINT NOT NULL,
            month_max BIGINT NOT NULL,
            month_avg NUMERIC(12, 6) NOT NULL,
            UNIQUE (summary_batch_id, symbol_id, period)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS summary_aggregation (
            summary_batch_id BIGINT NOT NULL REFERENCES summary_batch(id) ON DELETE CASCADE,
            source_symbol_id BIGINT NOT NULL,
            source_period_id BIGINT NOT NULL,
            aggregation_period VARCHAR(10) NOT NULL,
            bucket_time TIMESTAMPTZ NOT NULL,
            num_candles BIGINT NOT NULL,
            UNIQUE (summary_batch_id, source_symbol_id, source_period_id,
                    aggregation_period, bucket_time)
        )
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("Database migrations completed");
    Ok(())
}
