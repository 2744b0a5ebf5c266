//! In-process search index.

use super::{check_query, load_documents, sort_facets, tokenize, AutoQuery, Document, FacetCount, SearchIndex, SearchQuery, SearchResults, Term};
use crate::config::{Api, SearchIndexConfig};
use crate::error::AppError;
use crate::paginator::Page;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

struct Entry {
    doc: Document,
    tokens: Vec<String>,
}

/// Documents per model, keyed by primary key.
#[derive(Default)]
pub struct MemoryIndex {
    models: RwLock<HashMap<String, BTreeMap<i64, Entry>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, model: &str, doc: Document) {
        let tokens = tokenize(&doc.text);
        let mut models = self.models.write().await;
        models
            .entry(model.to_string())
            .or_default()
            .insert(doc.id, Entry { doc, tokens });
    }

    pub async fn len(&self, model: &str) -> usize {
        self.models.read().await.get(model).map_or(0, |m| m.len())
    }

    /// Replace every model's documents with what the database holds now.
    pub async fn rebuild(&self, pool: &PgPool, api: &Api) -> Result<(), AppError> {
        let mut fresh: HashMap<String, BTreeMap<i64, Entry>> = HashMap::new();
        for (_, def) in api.search_indexes() {
            let docs = load_documents(pool, def, None).await?;
            let model = fresh.entry(def.model.clone()).or_default();
            for doc in docs {
                let tokens = tokenize(&doc.text);
                model.insert(doc.id, Entry { doc, tokens });
            }
            tracing::info!(model = %def.model, documents = model.len(), "search index rebuilt");
        }
        *self.models.write().await = fresh;
        Ok(())
    }
}

fn matches_term(tokens: &[String], term: &Term) -> bool {
    match term {
        Term::Word(w) => tokens.iter().any(|t| t == w),
        Term::Phrase(words) => tokens.windows(words.len()).any(|win| win == words.as_slice()),
    }
}

fn term_hits(tokens: &[String], term: &Term) -> usize {
    match term {
        Term::Word(w) => tokens.iter().filter(|t| *t == w).count(),
        Term::Phrase(words) => tokens.windows(words.len()).filter(|win| *win == words.as_slice()).count(),
    }
}

fn matches_auto(tokens: &[String], auto: &AutoQuery) -> bool {
    auto.required.iter().all(|t| matches_term(tokens, t))
        && !auto.excluded.iter().any(|t| matches_term(tokens, t))
}

fn relevance(tokens: &[String], auto: &AutoQuery) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let hits: usize = auto.required.iter().map(|t| term_hits(tokens, t)).sum();
    hits as f64 / tokens.len() as f64
}

fn matches(entry: &Entry, query: &SearchQuery) -> bool {
    query
        .narrow
        .iter()
        .all(|(_, value)| entry.doc.facets.iter().any(|f| f == value))
        && query.auto.as_ref().map_or(true, |a| matches_auto(&entry.tokens, a))
}

fn cmp_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn search(
        &self,
        def: &SearchIndexConfig,
        query: &SearchQuery,
        page: Page,
    ) -> Result<SearchResults, AppError> {
        check_query(def, query)?;
        let models = self.models.read().await;
        let Some(entries) = models.get(&def.model) else {
            return Ok(SearchResults::default());
        };
        let mut matched: Vec<(&Entry, f64)> = entries
            .values()
            .filter(|e| matches(e, query))
            .map(|e| {
                let rank = query.auto.as_ref().map_or(0.0, |a| relevance(&e.tokens, a));
                (e, rank)
            })
            .collect();
        if !query.order.is_empty() {
            matched.sort_by(|(a, _), (b, _)| {
                query
                    .order
                    .iter()
                    .map(|o| {
                        let ord = cmp_values(
                            a.doc.order_values.get(&o.column),
                            b.doc.order_values.get(&o.column),
                        );
                        if o.descending {
                            ord.reverse()
                        } else {
                            ord
                        }
                    })
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
                    .then(a.doc.id.cmp(&b.doc.id))
            });
        } else if query.auto.is_some() {
            matched.sort_by(|(a, ra), (b, rb)| {
                rb.partial_cmp(ra)
                    .unwrap_or(Ordering::Equal)
                    .then(a.doc.id.cmp(&b.doc.id))
            });
        }
        let total = matched.len() as u64;
        let hits = matched
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .map(|(e, _)| e.doc.id)
            .collect();
        Ok(SearchResults { hits, total })
    }

    async fn facet_counts(
        &self,
        def: &SearchIndexConfig,
        query: &SearchQuery,
    ) -> Result<Vec<FacetCount>, AppError> {
        check_query(def, query)?;
        let models = self.models.read().await;
        let Some(entries) = models.get(&def.model) else {
            return Ok(Vec::new());
        };
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for e in entries.values().filter(|e| matches(e, query)) {
            let mut seen: Vec<&str> = e.doc.facets.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for f in seen {
                *counts.entry(f).or_default() += 1;
            }
        }
        let mut out: Vec<FacetCount> = counts
            .into_iter()
            .map(|(name, count)| FacetCount {
                name: name.to_string(),
                count,
            })
            .collect();
        sort_facets(&mut out);
        Ok(out)
    }

    async fn update_object(&self, pool: &PgPool, def: &SearchIndexConfig, id: i64) -> Result<(), AppError> {
        let docs = load_documents(pool, def, Some(std::slice::from_ref(&id))).await?;
        match docs.into_iter().next() {
            Some(doc) => self.insert(&def.model, doc).await,
            None => self.remove_object(def, id).await?,
        }
        Ok(())
    }

    async fn remove_object(&self, def: &SearchIndexConfig, id: i64) -> Result<(), AppError> {
        if let Some(entries) = self.models.write().await.get_mut(&def.model) {
            entries.remove(&id);
        }
        Ok(())
    }
}
