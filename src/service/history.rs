//! Snapshots of history-enabled rows.

use super::crud::{bind_all, row_to_map};
use crate::config::ResolvedResource;
use crate::error::AppError;
use crate::paginator::Page;
use crate::sql;
use serde_json::{Map, Value};
use sqlx::{PgPool, Row};

/// Snapshots of one object, newest first, with the total count.
pub async fn list_history(
    pool: &PgPool,
    resource: &ResolvedResource,
    id: &Value,
    page: Page,
) -> Result<(Vec<Value>, u64), AppError> {
    let table = &resource.table;
    if !table.history {
        return Err(AppError::NotFound(format!(
            "{} does not keep history",
            resource.resource_name
        )));
    }
    let q = sql::select_history(table, id, page.limit, page.offset);
    tracing::debug!(sql = %q.sql, params = ?q.params, "history");
    let rows = bind_all(sqlx::query(&q.sql), &q.params).fetch_all(pool).await?;
    let c = sql::count_history(table, id);
    let total: i64 = bind_all(sqlx::query(&c.sql), &c.params)
        .fetch_one(pool)
        .await?
        .try_get(0)?;
    let entries = rows
        .iter()
        .map(|r| row_to_map(r).map(|m| history_entry(resource, m)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((entries, total.max(0) as u64))
}

/// Shape one history row: metadata plus the snapshot restricted to exposed columns.
pub fn history_entry(resource: &ResolvedResource, mut row: Map<String, Value>) -> Value {
    let payload = row.remove("payload").unwrap_or(Value::Null);
    let mut snapshot = Map::new();
    if let Value::Object(p) = payload {
        for col in &resource.exposed {
            if let Some(v) = p.get(col) {
                snapshot.insert(col.clone(), v.clone());
            }
        }
    }
    row.insert("snapshot".into(), Value::Object(snapshot));
    Value::Object(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources;
    use serde_json::json;

    #[test]
    fn snapshot_keeps_exposed_columns_only() {
        let api = resources::api().unwrap();
        let sheets = api.resource("project/sheet/projectsheet").unwrap();
        let row = json!({
            "history_id": 7,
            "history_type": "~",
            "payload": {"id": 1, "tags": ["a"], "project_id": 3}
        });
        let entry = history_entry(sheets, row.as_object().cloned().unwrap());
        assert_eq!(entry["history_type"], json!("~"));
        assert_eq!(entry["snapshot"], json!({"id": 1, "tags": ["a"]}));
        assert!(entry.get("payload").is_none());
    }
}
