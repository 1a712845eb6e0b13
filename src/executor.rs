//! Query Executor
//!
//! Runs generated SQL text as-is against MySQL and materialises every row.
//! No retries and no statement timeout at this layer.

use crate::db::DbPool;
use crate::error::{AgenticError, Result};
use crate::result_set::ResultSet;
use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{json, Value};
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo};
use std::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub rows: ResultSet,
    pub elapsed_ms: f64,
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<QueryOutcome>;

    /// Cheap liveness probe for the health endpoint.
    async fn ping(&self) -> bool;
}

/// Executor over a sqlx MySQL pool. Built without a pool when the database
/// was unreachable at startup; every call then fails as an execution error.
#[derive(Clone)]
pub struct MySqlExecutor {
    pool: Option<DbPool>,
}

impl MySqlExecutor {
    pub fn new(pool: DbPool) -> Self {
        Self { pool: Some(pool) }
    }

    pub fn disconnected() -> Self {
        Self { pool: None }
    }

    pub fn pool(&self) -> Option<&DbPool> {
        self.pool.as_ref()
    }
}

#[async_trait]
impl QueryExecutor for MySqlExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryOutcome> {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| AgenticError::Execution("Database is not connected".to_string()))?;

        info!("Executing SQL: {}", sql);
        let start = Instant::now();
        let rows = sqlx::query(sql).fetch_all(pool).await.map_err(|e| {
            error!("Database error: {}", e);
            AgenticError::Execution(e.to_string())
        })?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let columns: Vec<String> = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let values = rows
            .iter()
            .map(|row| (0..columns.len()).map(|i| decode_cell(row, i)).collect())
            .collect();

        info!("Query returned {} rows in {:.2}ms", rows.len(), elapsed_ms);
        Ok(QueryOutcome {
            rows: ResultSet::new(columns, values),
            elapsed_ms,
        })
    }

    async fn ping(&self) -> bool {
        match &self.pool {
            Some(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
            None => false,
        }
    }
}

/// Decode one cell into a JSON scalar based on the declared column type.
fn decode_cell(row: &MySqlRow, idx: usize) -> Value {
    let type_name = row.column(idx).type_info().name().to_uppercase();

    let decoded = match type_name.as_str() {
        "NULL" => Some(Value::Null),
        t if t.ends_with("UNSIGNED") => row.try_get::<Option<u64>, _>(idx).ok().map(|v| json!(v)),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            row.try_get::<Option<i64>, _>(idx).ok().map(|v| json!(v))
        }
        "BOOLEAN" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .map(|v| json!(v))
            .or_else(|| row.try_get::<Option<bool>, _>(idx).ok().map(|v| json!(v.map(i64::from)))),
        "FLOAT" => row.try_get::<Option<f32>, _>(idx).ok().map(|v| json!(v.map(f64::from))),
        "DOUBLE" => row.try_get::<Option<f64>, _>(idx).ok().map(|v| json!(v)),
        "DECIMAL" => row
            .try_get::<Option<BigDecimal>, _>(idx)
            .ok()
            .map(|v| v.map(decimal_to_json).unwrap_or(Value::Null)),
        "DATETIME" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)
            .ok()
            .map(|v| json!(v.map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string()))),
        "TIMESTAMP" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)
            .ok()
            .map(|v| json!(v.map(|d| d.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string()))),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)
            .ok()
            .map(|v| json!(v.map(|d| d.format("%Y-%m-%d").to_string()))),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)
            .ok()
            .map(|v| json!(v.map(|t| t.format("%H:%M:%S").to_string()))),
        "JSON" => row.try_get::<Option<Value>, _>(idx).ok().map(|v| v.unwrap_or(Value::Null)),
        _ => None,
    };

    decoded
        .or_else(|| row.try_get::<Option<String>, _>(idx).ok().map(|v| json!(v)))
        .or_else(|| {
            row.try_get::<Option<Vec<u8>>, _>(idx)
                .ok()
                .map(|v| json!(v.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())))
        })
        .unwrap_or_else(|| {
            debug!("Could not decode column {} of type {}", idx, type_name);
            Value::Null
        })
}

/// Integral decimals (SUM/COUNT results) become integers, the rest floats.
fn decimal_to_json(value: BigDecimal) -> Value {
    if value.is_integer() {
        if let Some(i) = value.to_i64() {
            return json!(i);
        }
    }
    value.to_f64().map(|f| json!(f)).unwrap_or_else(|| json!(value.to_string()))
}
