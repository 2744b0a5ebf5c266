//! Resolved resource model: declarations validated and flattened for runtime use.

use crate::config::{
    AuthBackend, AuthorizationConfig, FilterConfig, HydrateLookupConfig, Method, RelatedFieldConfig,
    SearchIndexConfig, ValidationRule,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Every resource URI starts with this prefix.
pub const API_PREFIX: &str = "/api/v0";

/// Primary key type for parsing path/body ids.
#[derive(Clone, Debug)]
pub enum PkType {
    Uuid,
    BigInt,
    Int,
    Text,
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub pk_type: Option<PkType>,
    pub nullable: bool,
    /// Whether the column has a DB default (e.g. NOW(), '[]').
    pub has_default: bool,
    /// PostgreSQL type every bound parameter for this column is cast to.
    pub pg_type: String,
}

impl ColumnInfo {
    pub fn is_json(&self) -> bool {
        self.pg_type == "jsonb" || self.pg_type == "json"
    }

    pub fn is_text(&self) -> bool {
        self.pg_type == "text"
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedTable {
    pub name: String,
    pub pk: String,
    pub pk_type: PkType,
    pub columns: Vec<ColumnInfo>,
    pub history: bool,
    pub auto_now: Option<String>,
}

impl ResolvedTable {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn history_table(&self) -> String {
        format!("{}_history", self.name)
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedResource {
    pub resource_name: String,
    pub table: ResolvedTable,
    pub allowed_methods: Vec<Method>,
    /// Columns present in bundles, in declaration order.
    pub exposed: Vec<String>,
    pub detail_only: HashSet<String>,
    /// Columns never exposed (excludes and password columns).
    pub sensitive: HashSet<String>,
    pub related: Vec<RelatedFieldConfig>,
    pub filtering: BTreeMap<String, FilterConfig>,
    pub ordering: Vec<String>,
    pub always_return_data: bool,
    pub authentication: Vec<AuthBackend>,
    pub authorization: AuthorizationConfig,
    pub hydrate_lookups: Vec<HydrateLookupConfig>,
    pub password_columns: HashSet<String>,
    pub readonly: HashSet<String>,
    pub validation: HashMap<String, ValidationRule>,
    pub search_index: Option<SearchIndexConfig>,
}

impl ResolvedResource {
    pub fn allows(&self, method: Method) -> bool {
        self.allowed_methods.contains(&method)
    }

    pub fn allowed_method_names(&self) -> Vec<&'static str> {
        self.allowed_methods.iter().map(Method::as_str).collect()
    }

    pub fn related_field(&self, name: &str) -> Option<&RelatedFieldConfig> {
        self.related.iter().find(|r| r.name == name)
    }

    pub fn list_uri(&self) -> String {
        format!("{}/{}/", API_PREFIX, self.resource_name)
    }

    pub fn detail_uri(&self, id: &Value) -> String {
        let id = match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        format!("{}/{}/{}/", API_PREFIX, self.resource_name, id)
    }

    pub fn search_uri(&self) -> String {
        format!("{}/{}/search/", API_PREFIX, self.resource_name)
    }
}

/// Registry of every resolved resource, keyed by resource name.
#[derive(Clone, Debug, Default)]
pub struct Api {
    pub resources: Vec<ResolvedResource>,
    by_name: HashMap<String, usize>,
}

impl Api {
    pub fn new(resources: Vec<ResolvedResource>) -> Self {
        let by_name = resources
            .iter()
            .enumerate()
            .map(|(i, r)| (r.resource_name.clone(), i))
            .collect();
        Api { resources, by_name }
    }

    pub fn resource(&self, name: &str) -> Option<&ResolvedResource> {
        self.by_name.get(name).map(|&i| &self.resources[i])
    }

    pub fn search_indexes(&self) -> impl Iterator<Item = (&ResolvedResource, &SearchIndexConfig)> {
        self.resources
            .iter()
            .filter_map(|r| r.search_index.as_ref().map(|idx| (r, idx)))
    }

    pub fn index_for(&self, resource_name: &str) -> Option<&SearchIndexConfig> {
        self.resource(resource_name).and_then(|r| r.search_index.as_ref())
    }
}
