//! Generic CRUD execution against PostgreSQL.

use crate::config::ResolvedTable;
use crate::error::AppError;
use crate::paginator::Page;
use crate::sql::{self, Filter, OrderBy, PgBindValue, QueryBuf};
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgConnection, PgPool, Postgres, Row, TypeInfo};

pub type RowMap = Map<String, Value>;

/// History marker written for each kind of change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    Created,
    Updated,
    Deleted,
}

impl Change {
    pub fn marker(&self) -> &'static str {
        match self {
            Change::Created => "+",
            Change::Updated => "~",
            Change::Deleted => "-",
        }
    }
}

pub struct CrudService;

impl CrudService {
    /// One page of rows plus the total matching count.
    pub async fn list(
        pool: &PgPool,
        table: &ResolvedTable,
        filters: &[Filter],
        order: &[OrderBy],
        page: Page,
    ) -> Result<(Vec<RowMap>, u64), AppError> {
        let q = sql::select_list(table, filters, order, Some(page.limit), page.offset);
        let rows = Self::fetch_all(pool, &q).await?;
        let c = sql::count(table, filters);
        tracing::debug!(sql = %c.sql, params = ?c.params, "count");
        let total: i64 = bind_all(sqlx::query(&c.sql), &c.params)
            .fetch_one(pool)
            .await?
            .try_get(0)?;
        Ok((rows, total.max(0) as u64))
    }

    pub async fn read(pool: &PgPool, table: &ResolvedTable, id: &Value) -> Result<Option<RowMap>, AppError> {
        let sql = sql::select_by_id(table);
        tracing::debug!(sql = %sql, id = %id, "query");
        let row = sqlx::query(&sql)
            .bind(PgBindValue::from_json(id))
            .fetch_optional(pool)
            .await?;
        row.as_ref().map(row_to_map).transpose()
    }

    /// Rows where `column` is one of `values`, ordered by primary key. Used for batch-loading related rows.
    pub async fn fetch_where_column_in(
        pool: &PgPool,
        table: &ResolvedTable,
        column: &str,
        values: &[Value],
    ) -> Result<Vec<RowMap>, AppError> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let q = sql::select_by_column_in(table, column, values);
        Self::fetch_all(pool, &q).await
    }

    /// Insert one row and, for history-enabled tables, its snapshot, in one transaction.
    pub async fn create(
        pool: &PgPool,
        table: &ResolvedTable,
        body: &RowMap,
        user_id: Option<i64>,
    ) -> Result<RowMap, AppError> {
        let mut tx = pool.begin().await?;
        let q = sql::insert(table, body);
        let row = Self::fetch_optional_tx(&mut tx, &q)
            .await?
            .ok_or_else(|| AppError::Internal(format!("insert into {} returned no row", table.name)))?;
        if table.history {
            let id = row.get(&table.pk).cloned().unwrap_or(Value::Null);
            Self::record_history(&mut tx, table, &id, Change::Created, user_id).await?;
        }
        tx.commit().await?;
        Ok(row)
    }

    /// Update the columns present in body. None when the row does not exist.
    pub async fn update(
        pool: &PgPool,
        table: &ResolvedTable,
        id: &Value,
        body: &RowMap,
        user_id: Option<i64>,
    ) -> Result<Option<RowMap>, AppError> {
        let mut tx = pool.begin().await?;
        let q = sql::update(table, id, body);
        let row = Self::fetch_optional_tx(&mut tx, &q).await?;
        if row.is_some() && table.history {
            Self::record_history(&mut tx, table, id, Change::Updated, user_id).await?;
        }
        tx.commit().await?;
        Ok(row)
    }

    /// Delete by id. The snapshot is taken before the row goes away.
    pub async fn delete(
        pool: &PgPool,
        table: &ResolvedTable,
        id: &Value,
        user_id: Option<i64>,
    ) -> Result<Option<RowMap>, AppError> {
        let mut tx = pool.begin().await?;
        if table.history {
            Self::record_history(&mut tx, table, id, Change::Deleted, user_id).await?;
        }
        let q = sql::delete(table, id);
        let row = Self::fetch_optional_tx(&mut tx, &q).await?;
        if row.is_some() {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }
        Ok(row)
    }

    async fn record_history(
        tx: &mut PgConnection,
        table: &ResolvedTable,
        id: &Value,
        change: Change,
        user_id: Option<i64>,
    ) -> Result<(), AppError> {
        let q = sql::insert_history(table, id, change.marker(), user_id);
        tracing::debug!(sql = %q.sql, params = ?q.params, "history");
        bind_all(sqlx::query(&q.sql), &q.params).execute(&mut *tx).await?;
        Ok(())
    }

    pub(crate) async fn fetch_all(pool: &PgPool, q: &QueryBuf) -> Result<Vec<RowMap>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind_all(sqlx::query(&q.sql), &q.params).fetch_all(pool).await?;
        rows.iter().map(row_to_map).collect()
    }

    async fn fetch_optional_tx(tx: &mut PgConnection, q: &QueryBuf) -> Result<Option<RowMap>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
        let row = bind_all(sqlx::query(&q.sql), &q.params)
            .fetch_optional(&mut *tx)
            .await?;
        row.as_ref().map(row_to_map).transpose()
    }
}

pub(crate) fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[PgBindValue],
) -> Query<'q, Postgres, PgArguments> {
    for p in params {
        query = query.bind(p.clone());
    }
    query
}

/// Convert a row to JSON by its column types. Numeric columns arrive as text (see the SQL builder).
pub(crate) fn row_to_map(row: &PgRow) -> Result<RowMap, AppError> {
    let mut map = Map::new();
    for (i, col) in row.columns().iter().enumerate() {
        let value = match col.type_info().name() {
            "INT2" => row.try_get::<Option<i16>, _>(i)?.map(Value::from),
            "INT4" => row.try_get::<Option<i32>, _>(i)?.map(Value::from),
            "INT8" => row.try_get::<Option<i64>, _>(i)?.map(Value::from),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(i)?
                .and_then(|n| serde_json::Number::from_f64(n as f64))
                .map(Value::Number),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(i)?
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            "BOOL" => row.try_get::<Option<bool>, _>(i)?.map(Value::Bool),
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(i)?
                .map(|u| Value::String(u.to_string())),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)?
                .map(|d| Value::String(d.to_rfc3339())),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(i)?
                .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(i)?
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
            "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(i)?,
            _ => row.try_get::<Option<String>, _>(i)?.map(Value::String),
        };
        map.insert(col.name().to_string(), value.unwrap_or(Value::Null));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_markers() {
        assert_eq!(Change::Created.marker(), "+");
        assert_eq!(Change::Updated.marker(), "~");
        assert_eq!(Change::Deleted.marker(), "-");
    }
}
