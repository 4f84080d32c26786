//! Bulk insert-or-update engine
//!
//! Applies a rectangular dataset to a table in chunked multi-row
//! `INSERT ... ON CONFLICT (...) DO UPDATE` statements. Rows that violate the
//! given uniqueness constraint are updated in place with the incoming values;
//! everything else is inserted. Each chunk is a single statement and therefore
//! atomic; re-applying the same dataset converges to the same rows.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use thiserror::Error;

use crate::error::{ErrorCategory, ErrorClassification};

/// Upsert errors
#[derive(Error, Debug)]
pub enum UpsertError {
    #[error("Invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Unique column {0} is not part of the dataset")]
    UnknownUniqueColumn(String),

    #[error("Row {row} has {found} values but the dataset has {expected} columns")]
    ShapeMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Dataset has no columns")]
    NoColumns,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorClassification for UpsertError {
    fn category(&self) -> ErrorCategory {
        match self {
            UpsertError::Database(_) => ErrorCategory::Transient,
            _ => ErrorCategory::Permanent,
        }
    }
}

/// One bindable value in a dataset row
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    BigInt(i64),
    Decimal(Decimal),
    Text(String),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    fn bind<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        match self {
            Value::Bool(v) => query.bind(*v),
            Value::BigInt(v) => query.bind(*v),
            Value::Decimal(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.clone()),
            Value::Timestamp(v) => query.bind(*v),
            Value::Json(v) => query.bind(v.clone()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

/// A rectangular dataset: ordered column names plus rows of values
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Create an empty dataset with the given columns
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row. The arity is checked when the dataset is applied.
    pub fn push_row<I>(&mut self, row: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.rows.push(row.into_iter().collect());
    }

    /// Append a column holding the same value in every row. Used to tag
    /// fetched data with its owning identifier before upserting.
    pub fn add_constant_column(&mut self, name: impl Into<String>, value: Value) {
        self.columns.push(name.into());
        for row in &mut self.rows {
            row.push(value.clone());
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Apply a dataset to `table` in one or more chunk-atomic statements.
///
/// `unique_columns` names the uniqueness constraint driving conflict
/// resolution; when empty the statement is a plain insert. `batch_size`
/// bounds rows per statement (`None` = single statement). An empty dataset is
/// a no-op, not an error. Returns the number of rows affected.
pub async fn bulk_upsert(
    pool: &PgPool,
    table: &str,
    dataset: &Dataset,
    unique_columns: &[&str],
    batch_size: Option<usize>,
) -> Result<u64, UpsertError> {
    if dataset.is_empty() {
        return Ok(0);
    }

    validate_shape(dataset, table, unique_columns)?;

    let chunk_size = batch_size.unwrap_or(dataset.len()).max(1);
    let mut affected = 0u64;

    for chunk in dataset.rows.chunks(chunk_size) {
        let sql = build_statement(table, &dataset.columns, unique_columns, chunk.len());

        let mut query = sqlx::query(&sql);
        for row in chunk {
            for value in row {
                query = value.bind(query);
            }
        }

        let result = query.execute(pool).await?;
        affected += result.rows_affected();
    }

    Ok(affected)
}

/// Validate identifiers, key membership, and row arity up front so a bad call
/// fails before any statement runs.
fn validate_shape(
    dataset: &Dataset,
    table: &str,
    unique_columns: &[&str],
) -> Result<(), UpsertError> {
    if dataset.columns.is_empty() {
        return Err(UpsertError::NoColumns);
    }

    validate_identifier(table)?;
    for column in &dataset.columns {
        validate_identifier(column)?;
    }

    for unique in unique_columns {
        if !dataset.columns.iter().any(|c| c == unique) {
            return Err(UpsertError::UnknownUniqueColumn(unique.to_string()));
        }
    }

    let expected = dataset.columns.len();
    for (i, row) in dataset.rows.iter().enumerate() {
        if row.len() != expected {
            return Err(UpsertError::ShapeMismatch {
                row: i,
                expected,
                found: row.len(),
            });
        }
    }

    Ok(())
}

/// Identifiers are interpolated into the statement text, so only plain
/// snake-case names are accepted.
fn validate_identifier(ident: &str) -> Result<(), UpsertError> {
    let mut chars = ident.chars();
    let valid_first = chars
        .next()
        .map(|c| c.is_ascii_lowercase() || c == '_')
        .unwrap_or(false);

    if valid_first && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        Ok(())
    } else {
        Err(UpsertError::InvalidIdentifier(ident.to_string()))
    }
}

/// Build one multi-row insert statement with an appropriate conflict clause.
fn build_statement(
    table: &str,
    columns: &[String],
    unique_columns: &[&str],
    row_count: usize,
) -> String {
    let column_list = columns.join(", ");
    let width = columns.len();

    let mut sql = format!("INSERT INTO {} ({}) VALUES ", table, column_list);

    for row in 0..row_count {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for col in 0..width {
            if col > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&format!("${}", row * width + col + 1));
        }
        sql.push(')');
    }

    if !unique_columns.is_empty() {
        let update_columns: Vec<&String> = columns
            .iter()
            .filter(|c| !unique_columns.iter().any(|u| u == c))
            .collect();

        if update_columns.is_empty() {
            sql.push_str(&format!(
                " ON CONFLICT ({}) DO NOTHING",
                unique_columns.join(", ")
            ));
        } else {
            let assignments: Vec<String> = update_columns
                .iter()
                .map(|c| format!("{} = EXCLUDED.{}", c, c))
                .collect();
            sql.push_str(&format!(
                " ON CONFLICT ({}) DO UPDATE SET {}",
                unique_columns.join(", "),
                assignments.join(", ")
            ));
        }
    }

    sql
}
