//! Full-text search over declared indexes.
//!
//! `PgSearchIndex` computes documents live from the database; `MemoryIndex` keeps them in process
//! and must be rebuilt at startup and updated after every write to an indexed resource.

mod memory;
mod postgres;
mod query;

pub use memory::MemoryIndex;
pub use postgres::PgSearchIndex;
pub use query::{tokenize, AutoQuery, SearchQuery, Term};

use crate::config::SearchIndexConfig;
use crate::error::AppError;
use crate::paginator::Page;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{PgPool, Row};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FacetCount {
    pub name: String,
    pub count: u64,
}

/// One page of hits (primary keys in result order) and the size of the whole result set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchResults {
    pub hits: Vec<i64>,
    pub total: u64,
}

/// Indexed form of one row.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: i64,
    pub text: String,
    pub facets: Vec<String>,
    /// Order field name -> value.
    pub order_values: Map<String, Value>,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn search(
        &self,
        def: &SearchIndexConfig,
        query: &SearchQuery,
        page: Page,
    ) -> Result<SearchResults, AppError>;

    /// Facet value counts of the matching set, by count descending then value ascending.
    async fn facet_counts(
        &self,
        def: &SearchIndexConfig,
        query: &SearchQuery,
    ) -> Result<Vec<FacetCount>, AppError>;

    async fn update_object(&self, pool: &PgPool, def: &SearchIndexConfig, id: i64) -> Result<(), AppError>;

    async fn remove_object(&self, def: &SearchIndexConfig, id: i64) -> Result<(), AppError>;
}

/// Reject narrowing and ordering the index cannot answer.
pub(crate) fn check_query(def: &SearchIndexConfig, query: &SearchQuery) -> Result<(), AppError> {
    for (field, _) in &query.narrow {
        if field != &def.facet_field {
            return Err(AppError::BadRequest(format!("cannot narrow on '{}'", field)));
        }
    }
    for o in &query.order {
        if !def.order_fields.contains_key(&o.column) {
            return Err(AppError::BadRequest(format!(
                "cannot order by '{}'; allowed: {}",
                o.column,
                def.order_fields.keys().cloned().collect::<Vec<_>>().join(", ")
            )));
        }
    }
    Ok(())
}

/// `expr` as a JSONB array; scalars, objects and NULL become `[]`.
pub fn json_array_or_empty(expr: &str) -> String {
    format!(
        "(CASE WHEN jsonb_typeof(({e})::jsonb) = 'array' THEN ({e})::jsonb ELSE '[]'::jsonb END)",
        e = expr
    )
}

/// Sort facet counts by count descending then value ascending.
pub(crate) fn sort_facets(counts: &mut [FacetCount]) {
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
}

/// Load indexed documents straight from the declared source; `ids` restricts to those rows.
pub async fn load_documents(
    pool: &PgPool,
    def: &SearchIndexConfig,
    ids: Option<&[i64]>,
) -> Result<Vec<Document>, AppError> {
    let order_obj = if def.order_fields.is_empty() {
        "'{}'::jsonb".to_string()
    } else {
        let pairs: Vec<String> = def
            .order_fields
            .iter()
            .map(|(name, expr)| format!("'{}', {}", name.replace('\'', "''"), expr))
            .collect();
        format!("jsonb_build_object({})", pairs.join(", "))
    };
    let mut sql = format!(
        "SELECT ({pk})::bigint AS id, COALESCE(({text})::text, '') AS text, \
         {facets} AS facets, {order} AS order_values FROM {source}",
        pk = def.pk,
        text = def.text,
        facets = json_array_or_empty(&def.facet_expr),
        order = order_obj,
        source = def.source
    );
    if ids.is_some() {
        sql.push_str(&format!(" WHERE ({})::bigint = ANY($1::bigint[])", def.pk));
    }
    tracing::debug!(sql = %sql, model = %def.model, "load search documents");
    let mut q = sqlx::query(&sql);
    if let Some(ids) = ids {
        q = q.bind(ids.to_vec());
    }
    let rows = q.fetch_all(pool).await?;
    let mut docs = Vec::with_capacity(rows.len());
    for row in rows {
        let facets: Value = row.try_get("facets")?;
        let order_values: Value = row.try_get("order_values")?;
        docs.push(Document {
            id: row.try_get("id")?,
            text: row.try_get("text")?,
            facets: facets
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default(),
            order_values: match order_values {
                Value::Object(m) => m,
                _ => Map::new(),
            },
        });
    }
    Ok(docs)
}
