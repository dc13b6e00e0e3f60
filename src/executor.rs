//! Query Executor - runs generated SQL against the active table
//!
//! Each request gets a fresh SQLContext with the frame registered under the
//! fixed name `data`. Results are converted to JSON-safe rows before leaving:
//! the null mask and non-finite floats both become explicit JSON nulls.

use crate::dataset::TABLE_NAME;
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use polars::sql::SQLContext;
use serde::Serialize;
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::time::Instant;
use tracing::warn;

/// Row set produced by one SQL execution. `columns` preserves the
/// projection order of the executed statement.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

/// Execute `sql` against the frame registered as `data`. The input frame is
/// never mutated; a failed execution leaves the caller's table untouched.
pub fn execute(sql: &str, df: &DataFrame) -> Result<QueryRows> {
    ensure_read_only(sql)?;
    let started = Instant::now();

    let mut ctx = SQLContext::new();
    ctx.register(TABLE_NAME, df.clone().lazy());

    let out = ctx
        .execute(sql)
        .map_err(|e| PipelineError::SqlExecution(e.to_string()))?
        .collect()
        .map_err(|e| PipelineError::SqlExecution(e.to_string()))?;

    let (columns, rows) = dataframe_to_rows(&out)?;

    Ok(QueryRows {
        columns,
        row_count: rows.len(),
        rows,
        execution_time_ms: started.elapsed().as_millis() as u64,
    })
}

/// Dry-run check: builds the plan and resolves its schema without
/// collecting. False on any failure, never raises.
pub fn validate(sql: &str, df: &DataFrame) -> bool {
    if ensure_read_only(sql).is_err() {
        return false;
    }

    let mut ctx = SQLContext::new();
    ctx.register(TABLE_NAME, df.clone().lazy());

    match ctx.execute(sql) {
        Ok(plan) => plan.schema().is_ok(),
        Err(_) => false,
    }
}

/// Reject anything but a single SELECT statement. When sqlparser cannot
/// parse the text at all, the engine decides; its dialect is wider.
fn ensure_read_only(sql: &str) -> Result<()> {
    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => {
            if statements.len() != 1 {
                return Err(PipelineError::SqlExecution(format!(
                    "Expected a single SQL statement, got {}",
                    statements.len()
                )));
            }
            match &statements[0] {
                Statement::Query(_) => Ok(()),
                other => Err(PipelineError::SqlExecution(format!(
                    "Only read-only SELECT statements are allowed, got: {}",
                    other
                ))),
            }
        }
        Err(e) => {
            warn!("SQL pre-parse failed ({}), deferring to the engine", e);
            Ok(())
        }
    }
}

/// Convert a frame into (projection-ordered column names, JSON row objects).
pub(crate) fn dataframe_to_rows(
    df: &DataFrame,
) -> Result<(Vec<String>, Vec<serde_json::Map<String, serde_json::Value>>)> {
    let columns: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();

    let mut rows = Vec::with_capacity(df.height());
    for row_idx in 0..df.height() {
        let mut row = serde_json::Map::new();
        for name in &columns {
            let series = df
                .column(name)
                .map_err(|e| PipelineError::SqlExecution(e.to_string()))?;
            row.insert(name.clone(), series_to_json_value(series, row_idx)?);
        }
        rows.push(row);
    }

    Ok((columns, rows))
}

fn series_to_json_value(series: &Series, row_idx: usize) -> Result<serde_json::Value> {
    use serde_json::Value;

    let null_mask = series.is_null();
    if let Some(true) = null_mask.get(row_idx) {
        return Ok(Value::Null);
    }

    let any_val = series
        .get(row_idx)
        .map_err(|e| PipelineError::SqlExecution(format!("Failed to read value: {}", e)))?;

    if any_val.is_null() {
        return Ok(Value::Null);
    }

    Ok(match any_val {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::Int8(i) => Value::Number(i.into()),
        AnyValue::Int16(i) => Value::Number(i.into()),
        AnyValue::Int32(i) => Value::Number(i.into()),
        AnyValue::Int64(i) => Value::Number(i.into()),
        AnyValue::UInt8(u) => Value::Number(u.into()),
        AnyValue::UInt16(u) => Value::Number(u.into()),
        AnyValue::UInt32(u) => Value::Number(u.into()),
        AnyValue::UInt64(u) => Value::Number(u.into()),
        // NaN and infinities have no JSON representation; they become null.
        AnyValue::Float32(f) => serde_json::Number::from_f64(f as f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        AnyValue::Float64(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        other => Value::String(format!("{:?}", other)),
    })
}
