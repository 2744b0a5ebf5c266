//! Search backed by PostgreSQL full-text search over the declared source.

use super::{check_query, json_array_or_empty, sort_facets, FacetCount, SearchIndex, SearchQuery, SearchResults};
use crate::config::SearchIndexConfig;
use crate::error::AppError;
use crate::paginator::Page;
use crate::sql::PgBindValue;
use async_trait::async_trait;
use sqlx::{PgPool, Row};

const TS_CONFIG: &str = "'english'";

/// Documents are computed at query time, so index updates are no-ops.
///
/// Terms go through the `english` text search configuration: they are stemmed and stopwords are
/// dropped. A query made only of stopwords (`q=the`) reduces to nothing and matches every
/// document, as an empty `q` does. `MemoryIndex` matches raw lowercase tokens instead, so it
/// only returns documents containing the stopword.
#[derive(Clone)]
pub struct PgSearchIndex {
    pool: PgPool,
}

impl PgSearchIndex {
    pub fn new(pool: PgPool) -> Self {
        PgSearchIndex { pool }
    }
}

struct Conditions {
    sql: String,
    params: Vec<PgBindValue>,
    tsquery_param: Option<usize>,
}

fn vector_expr(def: &SearchIndexConfig) -> String {
    format!("to_tsvector({}, COALESCE(({})::text, ''))", TS_CONFIG, def.text)
}

fn conditions(def: &SearchIndexConfig, query: &SearchQuery) -> Conditions {
    let mut parts = Vec::new();
    let mut params = Vec::new();
    for (_, value) in &query.narrow {
        params.push(PgBindValue::text(value.as_str()));
        parts.push(format!(
            "{} @> jsonb_build_array(${}::text)",
            json_array_or_empty(&def.facet_expr),
            params.len()
        ));
    }
    let mut tsquery_param = None;
    if let Some(tsquery) = query.auto.as_ref().and_then(|a| a.to_tsquery()) {
        params.push(PgBindValue::text(tsquery));
        let n = params.len();
        tsquery_param = Some(n);
        parts.push(format!(
            "(numnode(to_tsquery({cfg}, ${n}::text)) = 0 OR {vector} @@ to_tsquery({cfg}, ${n}::text))",
            cfg = TS_CONFIG,
            n = n,
            vector = vector_expr(def)
        ));
    }
    let sql = if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    };
    Conditions {
        sql,
        params,
        tsquery_param,
    }
}

fn order_clause(def: &SearchIndexConfig, query: &SearchQuery, tsquery_param: Option<usize>) -> String {
    let mut parts: Vec<String> = query
        .order
        .iter()
        .filter_map(|o| {
            def.order_fields
                .get(&o.column)
                .map(|expr| format!("{} {}", expr, if o.descending { "DESC" } else { "ASC" }))
        })
        .collect();
    if parts.is_empty() {
        if let Some(n) = tsquery_param {
            parts.push(format!(
                "ts_rank({}, to_tsquery({}, ${}::text)) DESC",
                vector_expr(def),
                TS_CONFIG,
                n
            ));
        }
    }
    parts.push(format!("({})::bigint ASC", def.pk));
    format!(" ORDER BY {}", parts.join(", "))
}

pub(crate) fn search_sql(def: &SearchIndexConfig, query: &SearchQuery, page: Page) -> (String, String, Vec<PgBindValue>) {
    let c = conditions(def, query);
    let select = format!(
        "SELECT ({})::bigint AS id FROM {}{}{} LIMIT {} OFFSET {}",
        def.pk,
        def.source,
        c.sql,
        order_clause(def, query, c.tsquery_param),
        page.limit,
        page.offset
    );
    let count = format!("SELECT COUNT(*) FROM {}{}", def.source, c.sql);
    (select, count, c.params)
}

pub(crate) fn facet_sql(def: &SearchIndexConfig, query: &SearchQuery) -> (String, Vec<PgBindValue>) {
    let c = conditions(def, query);
    let sql = format!(
        "SELECT f.value AS name, COUNT(DISTINCT ({pk})) AS count FROM {source} \
         CROSS JOIN LATERAL jsonb_array_elements_text({facets}) AS f(value){cond} \
         GROUP BY f.value ORDER BY count DESC, name ASC",
        pk = def.pk,
        source = def.source,
        facets = json_array_or_empty(&def.facet_expr),
        cond = c.sql
    );
    (sql, c.params)
}

#[async_trait]
impl SearchIndex for PgSearchIndex {
    async fn search(
        &self,
        def: &SearchIndexConfig,
        query: &SearchQuery,
        page: Page,
    ) -> Result<SearchResults, AppError> {
        check_query(def, query)?;
        let (select, count, params) = search_sql(def, query, page);
        tracing::debug!(sql = %select, params = ?params, "search");
        let mut q = sqlx::query(&select);
        let mut cq = sqlx::query_scalar::<_, i64>(&count);
        for p in &params {
            q = q.bind(p.clone());
            cq = cq.bind(p.clone());
        }
        let rows = q.fetch_all(&self.pool).await?;
        let total = cq.fetch_one(&self.pool).await?;
        let hits = rows
            .iter()
            .map(|r| r.try_get::<i64, _>("id"))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SearchResults {
            hits,
            total: total.max(0) as u64,
        })
    }

    async fn facet_counts(
        &self,
        def: &SearchIndexConfig,
        query: &SearchQuery,
    ) -> Result<Vec<FacetCount>, AppError> {
        check_query(def, query)?;
        let (sql, params) = facet_sql(def, query);
        tracing::debug!(sql = %sql, params = ?params, "facet counts");
        let mut q = sqlx::query(&sql);
        for p in &params {
            q = q.bind(p.clone());
        }
        let rows = q.fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let count: i64 = row.try_get("count")?;
            out.push(FacetCount {
                name: row.try_get("name")?,
                count: count.max(0) as u64,
            });
        }
        // Collation may differ from byte order; keep ties deterministic across backends.
        sort_facets(&mut out);
        Ok(out)
    }

    async fn update_object(&self, _pool: &PgPool, _def: &SearchIndexConfig, _id: i64) -> Result<(), AppError> {
        Ok(())
    }

    async fn remove_object(&self, _def: &SearchIndexConfig, _id: i64) -> Result<(), AppError> {
        Ok(())
    }
}
