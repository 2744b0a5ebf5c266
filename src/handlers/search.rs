//! `/{name}/search/`: faceted full-text search and tag autocomplete over a resource's index.

use super::resource::{admit, check_method, log_access, lookup, ResourceName};
use crate::config::{Method, ResolvedResource, SearchIndexConfig};
use crate::error::AppError;
use crate::extractors::Credentials;
use crate::paginator::{Meta, Page};
use crate::response;
use crate::search::{FacetCount, SearchQuery};
use crate::service::{dehydrate_rows, CrudService, RowMap};
use crate::sql::OrderBy;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::Method as HttpMethod,
    response::{IntoResponse, Response},
    Extension,
};
use serde_json::Value;

/// Search parameters read from the query string. Pagination is read separately.
#[derive(Debug, Default, PartialEq)]
pub struct SearchParams {
    pub q: String,
    /// Present (even empty) means autocomplete.
    pub auto: Option<String>,
    pub facets: Vec<String>,
    pub order: Vec<String>,
}

impl SearchParams {
    pub fn from_pairs(params: &[(String, String)]) -> Self {
        let mut out = SearchParams::default();
        for (key, value) in params {
            match key.as_str() {
                "q" => out.q = value.clone(),
                "auto" => out.auto = Some(value.clone()),
                "facet" if !value.is_empty() => out.facets.push(value.clone()),
                "order" if !value.trim().is_empty() => out.order.push(value.trim().to_string()),
                _ => {}
            }
        }
        out
    }

    /// Query scoped to the index's model, aggregating its facet and narrowed by every facet value.
    pub fn to_query(&self, def: &SearchIndexConfig) -> SearchQuery {
        let mut query = SearchQuery::models(&def.model).facet(&def.facet_field);
        for value in &self.facets {
            query = query.narrow(&format!("{}:{}", def.facet_field, value));
        }
        query
    }
}

/// Facet counts whose value starts with `prefix`; an empty prefix keeps them all.
pub fn complete(counts: Vec<FacetCount>, prefix: &str) -> Vec<FacetCount> {
    counts.into_iter().filter(|c| c.name.starts_with(prefix)).collect()
}

pub async fn search(
    State(state): State<AppState>,
    Extension(name): Extension<ResourceName>,
    method: HttpMethod,
    credentials: Credentials,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let resource = lookup(&state, &name)?;
    check_method(resource, &[Method::Get], &method)?;
    let def = resource
        .search_index
        .as_ref()
        .ok_or_else(|| AppError::NotFound(format!("{} has no search index", resource.resource_name)))?;
    let requester = admit(&state, resource, Method::Get, &credentials).await?;
    let search = SearchParams::from_pairs(&params);
    let query = search.to_query(def);

    if let Some(prefix) = &search.auto {
        let counts = state.search.facet_counts(def, &query).await?;
        let objects = complete(counts, prefix);
        tracing::info!(
            user = requester.label(),
            resource = %resource.resource_name,
            auto = %prefix,
            facets = ?search.facets,
            tags = objects.len(),
            "autocomplete"
        );
        return Ok(response::objects(objects).into_response());
    }

    let query = query
        .auto_query(&search.q)
        .order_by(search.order.iter().map(|o| OrderBy::parse(o)).collect());
    let page = Page::from_params(&params, &state.settings)?;
    let results = state.search.search(def, &query, page).await?;
    let rows = load_hits(&state, resource, &results.hits).await?;
    let objects = dehydrate_rows(&state.pool, &state.api, resource, &rows, true, 0).await?;
    let meta = Meta::new(&resource.search_uri(), &params, page, results.total);
    log_access(&requester, resource, Method::Get, "search");
    tracing::info!(
        q = %search.q,
        facets = ?search.facets,
        total = results.total,
        returned = objects.len(),
        "search"
    );
    Ok(response::list(meta, objects).into_response())
}

/// Rows for `hits` in hit order. Hits whose row is gone are skipped.
async fn load_hits(state: &AppState, resource: &ResolvedResource, hits: &[i64]) -> Result<Vec<RowMap>, AppError> {
    let ids: Vec<Value> = hits.iter().map(|&id| Value::from(id)).collect();
    let rows = CrudService::fetch_where_column_in(&state.pool, &resource.table, &resource.table.pk, &ids).await?;
    let pk = &resource.table.pk;
    let mut ordered = Vec::with_capacity(rows.len());
    for id in &ids {
        match rows.iter().find(|r| r.get(pk) == Some(id)) {
            Some(row) => ordered.push(row.clone()),
            None => tracing::debug!(resource = %resource.resource_name, id = %id, "stale search hit skipped"),
        }
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn reads_repeated_facets_and_empty_auto() {
        let p = SearchParams::from_pairs(&pairs(&[
            ("q", "solar"),
            ("facet", "urgent"),
            ("facet", "energy"),
            ("facet", ""),
            ("auto", ""),
            ("order", "-created_on"),
            ("limit", "5"),
        ]));
        assert_eq!(p.q, "solar");
        assert_eq!(p.auto.as_deref(), Some(""));
        assert_eq!(p.facets, vec!["urgent", "energy"]);
        assert_eq!(p.order, vec!["-created_on"]);
    }

    #[test]
    fn facets_narrow_on_the_index_field() {
        let def = resources::projectsheet::search_index();
        let p = SearchParams::from_pairs(&pairs(&[("facet", "urgent")]));
        let q = p.to_query(&def);
        assert_eq!(q.model, "project/sheet/projectsheet");
        assert_eq!(q.facets, vec!["tags"]);
        assert_eq!(q.narrow, vec![("tags".to_string(), "urgent".to_string())]);
        assert!(q.auto.is_none());
    }

    #[test]
    fn autocomplete_keeps_prefix_matches_in_order() {
        let counts = vec![
            FacetCount { name: "urgent".into(), count: 3 },
            FacetCount { name: "energy".into(), count: 2 },
            FacetCount { name: "urban".into(), count: 1 },
        ];
        let names: Vec<String> = complete(counts.clone(), "ur").into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["urgent", "urban"]);
        assert_eq!(complete(counts, "").len(), 3);
    }
}
