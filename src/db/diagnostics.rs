use crate::db::query::ExecutionResult;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Maximum number of statements reported by one slow-query lookup.
pub const SLOW_QUERY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowQueryRecord {
    pub sql_id: String,
    pub sql_text: String,
    pub elapsed_ms: f64,
    pub executions: i64,
}

/// Statements from `pg_stat_statements` whose cumulative execution time
/// exceeds `threshold_ms`, slowest first.
pub fn slow_query_sql(threshold_ms: f64) -> String {
    format!(
        "SELECT queryid::text AS sql_id,
                query AS sql_text,
                total_exec_time AS elapsed_ms,
                calls AS executions
         FROM pg_stat_statements
         WHERE total_exec_time > {threshold_ms}
         ORDER BY total_exec_time DESC
         LIMIT {SLOW_QUERY_LIMIT}"
    )
}

pub fn slow_queries_from_result(result: &ExecutionResult) -> Vec<SlowQueryRecord> {
    let (Some(id), Some(text), Some(elapsed), Some(calls)) = (
        result.column_index("sql_id"),
        result.column_index("sql_text"),
        result.column_index("elapsed_ms"),
        result.column_index("executions"),
    ) else {
        warn!(
            "Unexpected slow-query columns: {:?}",
            result.column_names()
        );
        return Vec::new();
    };

    result
        .rows
        .iter()
        .filter_map(|row| {
            Some(SlowQueryRecord {
                sql_id: as_text(row.get(id)?)?,
                sql_text: as_text(row.get(text)?)?,
                elapsed_ms: row.get(elapsed)?.as_f64()?,
                executions: row.get(calls)?.as_i64()?,
            })
        })
        .collect()
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
