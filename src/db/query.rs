use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;
use std::result::Result as StdResult;
use tokio_postgres::types::{FromSql, Kind, Type};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// What a [`DbSession`](crate::db::DbSession) hands back for one statement.
/// `columns` is `None` when the statement produced no column description.
#[derive(Debug, Clone, Default)]
pub struct RawResult {
    pub columns: Option<Vec<ColumnDef>>,
    pub rows: Vec<Vec<Value>>,
}

/// Tabular result of one executed statement. Columns keep the projection
/// order of the query; each row holds one value per column in that order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionResult {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub execution_time_ms: u128,
}

impl ExecutionResult {
    pub fn from_raw(raw: RawResult, execution_time_ms: u128) -> Self {
        match raw.columns {
            Some(columns) => {
                let row_count = raw.rows.len();
                Self {
                    columns,
                    rows: raw.rows,
                    row_count,
                    execution_time_ms,
                }
            }
            None => Self {
                execution_time_ms,
                ..Self::default()
            },
        }
    }

    /// True when the statement ran but returned zero rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Row `idx` as ordered `(column, value)` pairs.
    pub fn record(&self, idx: usize) -> Option<Vec<(&str, &Value)>> {
        let row = self.rows.get(idx)?;
        Some(
            self.columns
                .iter()
                .map(|c| c.name.as_str())
                .zip(row.iter())
                .collect(),
        )
    }

    pub fn value(&self, idx: usize, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        self.rows.get(idx)?.get(col)
    }
}

pub(crate) fn pg_type_to_string(pg_type: &Type) -> String {
    match *pg_type {
        Type::BOOL => "boolean".into(),
        Type::INT2 => "smallint".into(),
        Type::INT4 => "integer".into(),
        Type::INT8 => "bigint".into(),
        Type::FLOAT4 => "real".into(),
        Type::FLOAT8 => "double precision".into(),
        Type::NUMERIC => "numeric".into(),
        Type::VARCHAR => "varchar".into(),
        Type::TEXT => "text".into(),
        Type::BPCHAR => "char".into(),
        Type::TIMESTAMP => "timestamp".into(),
        Type::TIMESTAMPTZ => "timestamptz".into(),
        Type::DATE => "date".into(),
        Type::UUID => "uuid".into(),
        Type::JSON => "json".into(),
        Type::JSONB => "jsonb".into(),
        _ => pg_type.name().to_string(),
    }
}

/// One cell decoded from the binary wire format into JSON.
///
/// `NUMERIC` and `INTERVAL` render as text so no precision is lost; arrays
/// decode element by element.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CellValue(pub Value);

impl<'a> FromSql<'a> for CellValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> StdResult<Self, Box<dyn Error + Sync + Send>> {
        let value = match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => i16::from_sql(ty, raw)?.into(),
            Type::INT4 => i32::from_sql(ty, raw)?.into(),
            Type::INT8 => i64::from_sql(ty, raw)?.into(),
            Type::OID => u32::from_sql(ty, raw)?.into(),
            Type::FLOAT4 => float(f32::from_sql(ty, raw)? as f64),
            Type::FLOAT8 => float(f64::from_sql(ty, raw)?),
            Type::NUMERIC => Value::String(Decimal::from_sql(ty, raw)?.to_string()),
            Type::JSON | Type::JSONB => Value::from_sql(ty, raw)?,
            Type::DATE => Value::String(chrono::NaiveDate::from_sql(ty, raw)?.to_string()),
            Type::TIME => Value::String(chrono::NaiveTime::from_sql(ty, raw)?.to_string()),
            Type::TIMESTAMP => {
                Value::String(chrono::NaiveDateTime::from_sql(ty, raw)?.to_string())
            }
            Type::TIMESTAMPTZ => {
                Value::String(chrono::DateTime::<chrono::Utc>::from_sql(ty, raw)?.to_rfc3339())
            }
            Type::INTERVAL => Value::String(Interval::from_sql(ty, raw)?.to_string()),
            Type::UUID => Value::String(uuid::Uuid::from_sql(ty, raw)?.to_string()),
            Type::BYTEA => Value::String(bytea_hex(raw)),
            _ if <String as FromSql>::accepts(ty) => Value::String(String::from_sql(ty, raw)?),
            _ => match ty.kind() {
                Kind::Array(_) => Value::Array(
                    Vec::<Option<CellValue>>::from_sql(ty, raw)?
                        .into_iter()
                        .map(|cell| cell.map(|c| c.0).unwrap_or(Value::Null))
                        .collect(),
                ),
                Kind::Domain(inner) => CellValue::from_sql(inner, raw)?.0,
                Kind::Enum(_) => Value::String(std::str::from_utf8(raw)?.to_string()),
                _ => return Err(format!("no decoding for type {}", ty.name()).into()),
            },
        };
        Ok(CellValue(value))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn float(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(v.to_string()))
}

fn bytea_hex(raw: &[u8]) -> String {
    let mut out = String::with_capacity(2 + raw.len() * 2);
    out.push_str("\\x");
    for byte in raw {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// `INTERVAL` in its binary layout: microseconds, days, months.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Interval {
    micros: i64,
    days: i32,
    months: i32,
}

impl<'a> FromSql<'a> for Interval {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> StdResult<Self, Box<dyn Error + Sync + Send>> {
        if raw.len() != 16 {
            return Err(format!("invalid interval length {}", raw.len()).into());
        }
        let micros = i64::from_be_bytes(raw[0..8].try_into()?);
        let days = i32::from_be_bytes(raw[8..12].try_into()?);
        let months = i32::from_be_bytes(raw[12..16].try_into()?);
        Ok(Interval {
            micros,
            days,
            months,
        })
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

impl fmt::Display for Interval {
    /// Same shape as the server's default output: `1 year 2 mons 3 days 04:05:06`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = |n: i64, one: &str, many: &str| {
            format!("{} {}", n, if n == 1 { one } else { many })
        };
        let mut parts = Vec::new();
        let (years, months) = (self.months / 12, self.months % 12);
        if years != 0 {
            parts.push(unit(years as i64, "year", "years"));
        }
        if months != 0 {
            parts.push(unit(months as i64, "mon", "mons"));
        }
        if self.days != 0 {
            parts.push(unit(self.days as i64, "day", "days"));
        }
        if self.micros != 0 || parts.is_empty() {
            let sign = if self.micros < 0 { "-" } else { "" };
            let total = self.micros.unsigned_abs();
            let secs = total / 1_000_000;
            let mut time = format!(
                "{}{:02}:{:02}:{:02}",
                sign,
                secs / 3600,
                secs / 60 % 60,
                secs % 60
            );
            let frac = total % 1_000_000;
            if frac != 0 {
                time.push_str(format!(".{:06}", frac).trim_end_matches('0'));
            }
            parts.push(time);
        }
        f.write_str(&parts.join(" "))
    }
}

/// Cell `idx` of `row` as JSON. SQL NULL and undecodable cells become null.
pub(crate) fn pg_value_to_json(row: &tokio_postgres::Row, idx: usize) -> Value {
    match row.try_get::<_, Option<CellValue>>(idx) {
        Ok(cell) => cell.map(|c| c.0).unwrap_or(Value::Null),
        Err(e) => {
            warn!("Could not decode column {}: {}", idx, e);
            Value::Null
        }
    }
}
