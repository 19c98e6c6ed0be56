// Entity store for the debate feedback database
// Generic keyed access to the four entity tables. Not transactional on its
// own: writes go through a `WriteScope` owned by the repository.

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::notifier::Table;
use crate::error::Result;

/// A record stored in one table, keyed by a TEXT `id` column.
///
/// `COLUMNS` must start with `id` and match the order of `to_values`.
pub trait Entity: Sized + Send + 'static {
    const TABLE: Table;
    /// Name used in error messages
    const NAME: &'static str;
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> &str;
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
    fn to_values(&self) -> Result<Vec<Value>>;
}

/// Filter for `scan`. Column names are always static to keep SQL injection out.
#[derive(Debug, Clone)]
pub struct Predicate {
    clause: String,
    params: Vec<Value>,
}

impl Predicate {
    pub fn all() -> Self {
        Self {
            clause: "1 = 1".to_string(),
            params: Vec::new(),
        }
    }

    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            clause: format!("{} = ?", column),
            params: vec![value.into()],
        }
    }

    pub fn any_of(column: &'static str, values: Vec<Value>) -> Self {
        if values.is_empty() {
            return Self {
                clause: "1 = 0".to_string(),
                params: Vec::new(),
            };
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        Self {
            clause: format!("{} IN ({})", column, placeholders),
            params: values,
        }
    }

    pub fn less_than(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            clause: format!("{} < ?", column),
            params: vec![value.into()],
        }
    }

    pub fn and(mut self, other: Predicate) -> Self {
        self.clause = format!("({}) AND ({})", self.clause, other.clause);
        self.params.extend(other.params);
        self
    }
}

/// Sort order for `scan`. Ties fall back to insertion order.
#[derive(Debug, Clone, Copy)]
pub struct Order {
    column: &'static str,
    descending: bool,
}

impl Order {
    pub fn asc(column: &'static str) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    pub fn desc(column: &'static str) -> Self {
        Self {
            column,
            descending: true,
        }
    }

    fn to_sql(self) -> String {
        let dir = if self.descending { "DESC" } else { "ASC" };
        format!("{} {}, rowid {}", self.column, dir, dir)
    }
}

fn select_sql<E: Entity>() -> String {
    format!("SELECT {} FROM {}", E::COLUMNS.join(", "), E::TABLE.name())
}

/// Point lookup by primary key
pub fn get<E: Entity>(conn: &Connection, id: &str) -> Result<Option<E>> {
    let sql = format!("{} WHERE id = ?1", select_sql::<E>());
    let mut stmt = conn.prepare_cached(&sql)?;
    let entity = stmt.query_row(params![id], E::from_row).optional()?;
    Ok(entity)
}

/// Ordered scan of every row matching `predicate`
pub fn scan<E: Entity>(conn: &Connection, predicate: &Predicate, order: Order) -> Result<Vec<E>> {
    let sql = format!(
        "{} WHERE {} ORDER BY {}",
        select_sql::<E>(),
        predicate.clause,
        order.to_sql()
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params_from_iter(predicate.params.iter()), E::from_row)?;
    let entities = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entities)
}

pub fn exists(conn: &Connection, table: Table, id: &str) -> Result<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table.name());
    let found: bool = conn.query_row(&sql, params![id], |row| row.get(0))?;
    Ok(found)
}

/// Insert or replace every column by id
pub(crate) fn upsert<E: Entity>(conn: &Connection, entity: &E) -> Result<usize> {
    let columns = E::COLUMNS;
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = columns
        .iter()
        .skip(1)
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
        E::TABLE.name(),
        columns.join(", "),
        placeholders,
        updates
    );

    let mut stmt = conn.prepare_cached(&sql)?;
    let changed = stmt.execute(params_from_iter(entity.to_values()?))?;
    Ok(changed)
}

/// Replace every non-key column of an existing row. Returns rows affected.
pub(crate) fn update<E: Entity>(conn: &Connection, entity: &E) -> Result<usize> {
    let assignments = E::COLUMNS
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, c)| format!("{} = ?{}", c, i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE {} SET {} WHERE id = ?1", E::TABLE.name(), assignments);

    let mut stmt = conn.prepare_cached(&sql)?;
    let changed = stmt.execute(params_from_iter(entity.to_values()?))?;
    Ok(changed)
}

pub(crate) fn delete_where(conn: &Connection, table: Table, column: &'static str, value: &str) -> Result<usize> {
    let sql = format!("DELETE FROM {} WHERE {} = ?1", table.name(), column);
    let deleted = conn.execute(&sql, params![value])?;
    Ok(deleted)
}

pub(crate) fn delete_all(conn: &Connection, table: Table) -> Result<usize> {
    let deleted = conn.execute(&format!("DELETE FROM {}", table.name()), [])?;
    Ok(deleted)
}

// ============ Column helpers ============

pub(crate) fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

pub(crate) fn opt_text(value: &Option<String>) -> Value {
    value.as_ref().map_or(Value::Null, |v| Value::Text(v.clone()))
}

pub(crate) fn int(value: u32) -> Value {
    Value::Integer(i64::from(value))
}

pub(crate) fn opt_int(value: Option<u32>) -> Value {
    value.map_or(Value::Null, int)
}

pub(crate) fn flag(value: bool) -> Value {
    Value::Integer(value as i64)
}

/// Timestamps are stored as Unix milliseconds. Sub-millisecond digits are
/// truncated, so a value reads back equal to `trunc_subsecs(3)` of itself.
pub(crate) fn timestamp(value: &DateTime<Utc>) -> Value {
    Value::Integer(value.trunc_subsecs(3).timestamp_millis())
}

pub(crate) fn read_timestamp(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(column)?;
    Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
        let index = row.as_ref().column_index(column).unwrap_or_default();
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Integer,
            format!("invalid timestamp {} in {}", millis, column).into(),
        )
    })
}
