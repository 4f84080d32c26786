//! Summary aggregation batch
//!
//! Recomputes coverage statistics over the candle table for the data-quality
//! dashboards: per group, the first/last candle time and total count, plus
//! min/max/median candles-per-bucket at five granularities, and the literal
//! per-bucket count series used for heatmaps. Summary rows are pure
//! projections of candle data keyed by batch id, safe to discard and
//! regenerate.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::storage::{
    bulk_upsert, BatchStatus, CoverageRow, Dataset, MarketDataRepository, Value,
};

use super::PipelineResult;

/// Bucket granularities for coverage aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationPeriod {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl AggregationPeriod {
    pub const ALL: [AggregationPeriod; 5] = [
        AggregationPeriod::Minute,
        AggregationPeriod::Hour,
        AggregationPeriod::Day,
        AggregationPeriod::Week,
        AggregationPeriod::Month,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationPeriod::Minute => "minutes",
            AggregationPeriod::Hour => "hours",
            AggregationPeriod::Day => "days",
            AggregationPeriod::Week => "weeks",
            AggregationPeriod::Month => "months",
        }
    }

    /// Truncate a timestamp to the start of its bucket, in UTC.
    /// Weeks start on Monday; months on the 1st.
    pub fn bucket(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let date = t.date_naive();

        let time = match self {
            AggregationPeriod::Minute => NaiveTime::from_hms_opt(t.hour(), t.minute(), 0),
            AggregationPeriod::Hour => NaiveTime::from_hms_opt(t.hour(), 0, 0),
            _ => Some(NaiveTime::MIN),
        }
        .unwrap_or(NaiveTime::MIN);

        let date = match self {
            AggregationPeriod::Week => {
                date - Duration::days(t.weekday().num_days_from_monday() as i64)
            }
            AggregationPeriod::Month => date.with_day(1).unwrap_or(date),
            _ => date,
        };

        DateTime::from_naive_utc_and_offset(date.and_time(time), Utc)
    }
}

/// min/max/median of per-bucket candle counts for one granularity
#[derive(Debug, Clone, PartialEq)]
pub struct BucketStats {
    pub min: i64,
    pub max: i64,
    pub avg: Decimal,
}

/// Coverage statistics for one group
#[derive(Debug, Clone)]
pub struct GroupSummary {
    pub first_candle_time: DateTime<Utc>,
    pub last_candle_time: DateTime<Utc>,
    pub num_candles: i64,
    /// Stats per granularity, in [`AggregationPeriod::ALL`] order
    pub buckets: [BucketStats; 5],
}

/// Count candles per bucket for one granularity
pub fn bucket_counts(
    times: &[DateTime<Utc>],
    period: AggregationPeriod,
) -> BTreeMap<DateTime<Utc>, i64> {
    let mut counts = BTreeMap::new();
    for time in times {
        *counts.entry(period.bucket(*time)).or_insert(0) += 1;
    }
    counts
}

/// Median of a count list. An even count takes the mean of the middle pair.
fn median(counts: &[i64]) -> Decimal {
    let mut sorted = counts.to_vec();
    sorted.sort_unstable();

    let n = sorted.len();
    if n == 0 {
        return Decimal::ZERO;
    }
    if n % 2 == 1 {
        Decimal::from(sorted[n / 2])
    } else {
        Decimal::from(sorted[n / 2 - 1] + sorted[n / 2]) / Decimal::from(2)
    }
}

fn bucket_stats(times: &[DateTime<Utc>], period: AggregationPeriod) -> BucketStats {
    let counts: Vec<i64> = bucket_counts(times, period).into_values().collect();

    BucketStats {
        min: counts.iter().copied().min().unwrap_or(0),
        max: counts.iter().copied().max().unwrap_or(0),
        avg: median(&counts),
    }
}

/// Group coverage rows by a key and compute each group's summary.
/// Groups with no rows never appear; `times` is never empty here.
pub fn summarize_groups<K, F>(rows: &[CoverageRow], key: F) -> BTreeMap<K, GroupSummary>
where
    K: Ord,
    F: Fn(&CoverageRow) -> K,
{
    let mut grouped: BTreeMap<K, Vec<DateTime<Utc>>> = BTreeMap::new();
    for row in rows {
        grouped.entry(key(row)).or_default().push(row.time);
    }

    grouped
        .into_iter()
        .map(|(k, times)| {
            let first = times.iter().copied().min().unwrap_or_default();
            let last = times.iter().copied().max().unwrap_or_default();
            let buckets = AggregationPeriod::ALL.map(|p| bucket_stats(&times, p));

            (
                k,
                GroupSummary {
                    first_candle_time: first,
                    last_candle_time: last,
                    num_candles: times.len() as i64,
                    buckets,
                },
            )
        })
        .collect()
}

/// Result of one summary run
#[derive(Debug, Clone, Default)]
pub struct SummaryReport {
    pub batch_id: i64,
    pub coverage_rows: usize,
    pub metric_rows: u64,
    pub aggregation_rows: u64,
}

/// Summary aggregation pipeline
pub struct SummaryAggregator {
    repository: Arc<MarketDataRepository>,
    /// Rows per summary-table upsert statement
    batch_size: usize,
}

impl SummaryAggregator {
    pub fn new(repository: Arc<MarketDataRepository>, batch_size: usize) -> Self {
        Self {
            repository,
            batch_size,
        }
    }

    /// Create a batch, recompute all summary rows, and mark it complete.
    pub async fn run(&self) -> PipelineResult<SummaryReport> {
        let batch = self
            .repository
            .create_summary_batch(Utc::now(), BatchStatus::InProgress)
            .await?;

        let rows = self.repository.load_coverage_rows().await?;
        debug!("Summary batch {} over {} coverage rows", batch.id, rows.len());

        let mut report = SummaryReport {
            batch_id: batch.id,
            coverage_rows: rows.len(),
            ..Default::default()
        };

        // Per source-symbol and source-period
        let by_source = summarize_groups(&rows, |r| (r.source_symbol_id, r.source_period_id));
        let mut dataset = metric_dataset(["source_symbol_id", "source_period_id"]);
        for ((source_symbol_id, source_period_id), summary) in &by_source {
            push_metric_row(
                &mut dataset,
                [Value::BigInt(*source_symbol_id), Value::BigInt(*source_period_id)],
                summary,
            );
        }
        dataset.add_constant_column("summary_batch_id", Value::BigInt(batch.id));
        report.metric_rows += bulk_upsert(
            self.repository.pool(),
            "summary_metric",
            &dataset,
            &["summary_batch_id", "source_symbol_id", "source_period_id"],
            Some(self.batch_size),
        )
        .await?;

        // Across sources, by symbol and period
        let across_sources = summarize_groups(&rows, |r| (r.symbol_id, r.period));
        let mut dataset = metric_dataset(["symbol_id", "period"]);
        for ((symbol_id, period), summary) in &across_sources {
            push_metric_row(
                &mut dataset,
                [Value::BigInt(*symbol_id), Value::Text(period.as_str().to_string())],
                summary,
            );
        }
        dataset.add_constant_column("summary_batch_id", Value::BigInt(batch.id));
        report.metric_rows += bulk_upsert(
            self.repository.pool(),
            "summary_metric_all_sources",
            &dataset,
            &["summary_batch_id", "symbol_id", "period"],
            Some(self.batch_size),
        )
        .await?;

        // Literal per-bucket series for heatmap rendering
        let mut dataset = Dataset::new([
            "source_symbol_id",
            "source_period_id",
            "aggregation_period",
            "bucket_time",
            "num_candles",
        ]);
        let mut grouped: BTreeMap<(i64, i64), Vec<DateTime<Utc>>> = BTreeMap::new();
        for row in &rows {
            grouped
                .entry((row.source_symbol_id, row.source_period_id))
                .or_default()
                .push(row.time);
        }
        for ((source_symbol_id, source_period_id), times) in &grouped {
            for period in AggregationPeriod::ALL {
                for (bucket_time, count) in bucket_counts(times, period) {
                    dataset.push_row([
                        Value::BigInt(*source_symbol_id),
                        Value::BigInt(*source_period_id),
                        Value::Text(period.as_str().to_string()),
                        Value::Timestamp(bucket_time),
                        Value::BigInt(count),
                    ]);
                }
            }
        }
        dataset.add_constant_column("summary_batch_id", Value::BigInt(batch.id));
        report.aggregation_rows = bulk_upsert(
            self.repository.pool(),
            "summary_aggregation",
            &dataset,
            &[
                "summary_batch_id",
                "source_symbol_id",
                "source_period_id",
                "aggregation_period",
                "bucket_time",
            ],
            Some(self.batch_size),
        )
        .await?;

        self.repository
            .set_summary_batch_status(batch.id, BatchStatus::Complete)
            .await?;

        info!(
            "Summary batch {} complete: {} metric rows, {} aggregation rows",
            batch.id, report.metric_rows, report.aggregation_rows
        );

        Ok(report)
    }
}

fn metric_dataset(key_columns: [&str; 2]) -> Dataset {
    let mut columns: Vec<String> = key_columns.iter().map(|s| s.to_string()).collect();
    columns.extend(
        ["first_candle_time", "last_candle_time", "num_candles"]
            .iter()
            .map(|s| s.to_string()),
    );
    for period in AggregationPeriod::ALL {
        let name = match period {
            AggregationPeriod::Minute => "minute",
            AggregationPeriod::Hour => "hour",
            AggregationPeriod::Day => "day",
            AggregationPeriod::Week => "week",
            AggregationPeriod::Month => "month",
        };
        columns.push(format!("{}_min", name));
        columns.push(format!("{}_max", name));
        columns.push(format!("{}_avg", name));
    }
    Dataset::new(columns)
}

fn push_metric_row(dataset: &mut Dataset, key_values: [Value; 2], summary: &GroupSummary) {
    let mut row: Vec<Value> = key_values.into_iter().collect();
    row.push(Value::Timestamp(summary.first_candle_time));
    row.push(Value::Timestamp(summary.last_candle_time));
    row.push(Value::BigInt(summary.num_candles));
    for stats in &summary.buckets {
        row.push(Value::BigInt(stats.min));
        row.push(Value::BigInt(stats.max));
        row.push(Value::Decimal(stats.avg));
    }
    dataset.push_row(row);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CandlePeriod;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn coverage_row(source_symbol_id: i64, time: DateTime<Utc>) -> CoverageRow {
        CoverageRow {
            source_period_id: 1,
            source_symbol_id,
            symbol_id: source_symbol_id,
            period: CandlePeriod::OneSecond,
            time,
        }
    }

    #[test]
    fn test_bucket_truncation() {
        let t = Utc.with_ymd_and_hms(2021, 9, 15, 13, 42, 17).unwrap(); // a Wednesday

        assert_eq!(
            AggregationPeriod::Minute.bucket(t),
            Utc.with_ymd_and_hms(2021, 9, 15, 13, 42, 0).unwrap()
        );
        assert_eq!(
            AggregationPeriod::Hour.bucket(t),
            Utc.with_ymd_and_hms(2021, 9, 15, 13, 0, 0).unwrap()
        );
        assert_eq!(
            AggregationPeriod::Day.bucket(t),
            Utc.with_ymd_and_hms(2021, 9, 15, 0, 0, 0).unwrap()
        );
        assert_eq!(
            AggregationPeriod::Week.bucket(t),
            Utc.with_ymd_and_hms(2021, 9, 13, 0, 0, 0).unwrap() // Monday
        );
        assert_eq!(
            AggregationPeriod::Month.bucket(t),
            Utc.with_ymd_and_hms(2021, 9, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_bucket_counts() {
        let base = Utc.with_ymd_and_hms(2021, 9, 15, 13, 42, 0).unwrap();
        // 3 candles in the first minute, 1 in the next
        let times = vec![
            base,
            base + Duration::seconds(10),
            base + Duration::seconds(59),
            base + Duration::seconds(61),
        ];

        let counts = bucket_counts(&times, AggregationPeriod::Minute);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[&base], 3);
        assert_eq!(counts[&(base + Duration::minutes(1))], 1);
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3, 1, 2]), dec!(2));
        assert_eq!(median(&[1, 2, 3, 10]), dec!(2.5));
        assert_eq!(median(&[7]), dec!(7));
        assert_eq!(median(&[]), dec!(0));
    }

    #[test]
    fn test_summarize_groups() {
        let base = Utc.with_ymd_and_hms(2021, 9, 15, 13, 0, 0).unwrap();
        let mut rows = Vec::new();
        // Symbol 1: 60 one-second candles in one minute
        for i in 0..60 {
            rows.push(coverage_row(1, base + Duration::seconds(i)));
        }
        // Symbol 2: 2 candles a minute apart
        rows.push(coverage_row(2, base));
        rows.push(coverage_row(2, base + Duration::minutes(1)));

        let summaries = summarize_groups(&rows, |r| r.source_symbol_id);
        assert_eq!(summaries.len(), 2);

        let s1 = &summaries[&1];
        assert_eq!(s1.num_candles, 60);
        assert_eq!(s1.first_candle_time, base);
        assert_eq!(s1.last_candle_time, base + Duration::seconds(59));
        // One full minute bucket of 60
        assert_eq!(s1.buckets[0], BucketStats { min: 60, max: 60, avg: dec!(60) });
        // One hour bucket of 60
        assert_eq!(s1.buckets[1].max, 60);

        let s2 = &summaries[&2];
        assert_eq!(s2.num_candles, 2);
        // Two minute-buckets of one candle each
        assert_eq!(s2.buckets[0], BucketStats { min: 1, max: 1, avg: dec!(1) });
    }

    #[test]
    fn test_metric_dataset_shape() {
        let mut dataset = metric_dataset(["source_symbol_id", "source_period_id"]);
        // 2 keys + first/last/count + 5 granularities * 3 stats
        assert_eq!(dataset.columns().len(), 20);

        let base = Utc.with_ymd_and_hms(2021, 9, 15, 13, 0, 0).unwrap();
        let rows = vec![coverage_row(1, base)];
        let summaries = summarize_groups(&rows, |r| r.source_symbol_id);
        push_metric_row(
            &mut dataset,
            [Value::BigInt(1), Value::BigInt(1)],
            &summaries[&1],
        );
        dataset.add_constant_column("summary_batch_id", Value::BigInt(9));

        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.columns().len(), 21);
    }
}
