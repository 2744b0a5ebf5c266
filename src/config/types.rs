//! Raw declaration types: tables, resources, related fields, filtering and search indexes.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Debug)]
pub enum ColumnDefaultConfig {
    /// Quoted as a SQL string literal.
    Literal(String),
    Expression { expression: String },
}

/// Foreign key from a column to another declared table.
#[derive(Clone, Debug)]
pub struct ForeignKeyConfig {
    pub table: String,
    pub column: String,
    pub on_delete: Option<String>,
}

fn default_id() -> String {
    "id".into()
}

#[derive(Clone, Debug)]
pub struct ColumnConfig {
    pub name: String,
    /// SQL type as written in DDL, e.g. `VARCHAR(100)`.
    pub type_: String,
    pub nullable: bool,
    pub default: Option<ColumnDefaultConfig>,
    pub unique: bool,
    pub references: Option<ForeignKeyConfig>,
}

impl ColumnConfig {
    pub fn new(name: &str, type_: &str) -> Self {
        ColumnConfig {
            name: name.into(),
            type_: type_.into(),
            nullable: true,
            default: None,
            unique: false,
            references: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_literal(mut self, value: &str) -> Self {
        self.default = Some(ColumnDefaultConfig::Literal(value.into()));
        self
    }

    pub fn default_expr(mut self, expression: &str) -> Self {
        self.default = Some(ColumnDefaultConfig::Expression {
            expression: expression.into(),
        });
        self
    }

    pub fn references(mut self, table: &str, on_delete: &str) -> Self {
        self.references = Some(ForeignKeyConfig {
            table: table.into(),
            column: default_id(),
            on_delete: Some(on_delete.into()),
        });
        self
    }
}

#[derive(Clone, Debug)]
pub enum IndexColumnEntry {
    Name(String),
    Expression { expression: String },
}

#[derive(Clone, Debug)]
pub struct IndexConfig {
    pub name: String,
    pub method: Option<String>,
    pub unique: bool,
    pub columns: Vec<IndexColumnEntry>,
}

#[derive(Clone, Debug)]
pub struct TableConfig {
    pub name: String,
    pub primary_key: String,
    pub columns: Vec<ColumnConfig>,
    pub unique: Vec<Vec<String>>,
    pub indexes: Vec<IndexConfig>,
    /// Keep a `<name>_history` table of row snapshots.
    pub history: bool,
    /// Column set to NOW() on every update.
    pub auto_now: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    pub fn from_http(method: &axum::http::Method) -> Option<Self> {
        match *method {
            axum::http::Method::GET | axum::http::Method::HEAD => Some(Method::Get),
            axum::http::Method::POST => Some(Method::Post),
            axum::http::Method::PUT => Some(Method::Put),
            axum::http::Method::PATCH => Some(Method::Patch),
            axum::http::Method::DELETE => Some(Method::Delete),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    ToOne,
    ToMany,
}

/// Which representations include a field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UseIn {
    #[default]
    All,
    List,
    Detail,
}

impl UseIn {
    pub fn includes(&self, for_list: bool) -> bool {
        match self {
            UseIn::All => true,
            UseIn::List => for_list,
            UseIn::Detail => !for_list,
        }
    }
}

/// Field pointing at another resource.
/// For `to_one`, `attribute` is our FK column. For `to_many`, it is the related table's FK column pointing back at us.
#[derive(Clone, Debug)]
pub struct RelatedFieldConfig {
    pub name: String,
    pub kind: RelationKind,
    pub resource: String,
    pub attribute: String,
    pub full: bool,
    pub null: bool,
    pub use_in: UseIn,
}

impl RelatedFieldConfig {
    pub fn to_one(name: &str, resource: &str, attribute: &str) -> Self {
        RelatedFieldConfig {
            name: name.into(),
            kind: RelationKind::ToOne,
            resource: resource.into(),
            attribute: attribute.into(),
            full: false,
            null: false,
            use_in: UseIn::All,
        }
    }

    pub fn to_many(name: &str, resource: &str, attribute: &str) -> Self {
        RelatedFieldConfig {
            kind: RelationKind::ToMany,
            ..Self::to_one(name, resource, attribute)
        }
    }

    pub fn full(mut self) -> Self {
        self.full = true;
        self
    }

    pub fn null(mut self) -> Self {
        self.null = true;
        self
    }

    pub fn use_in(mut self, use_in: UseIn) -> Self {
        self.use_in = use_in;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lookup {
    Exact,
    Iexact,
    Contains,
    Icontains,
    Startswith,
    Istartswith,
    In,
    Gt,
    Gte,
    Lt,
    Lte,
    Isnull,
}

impl Lookup {
    pub const ALL: [Lookup; 12] = [
        Lookup::Exact,
        Lookup::Iexact,
        Lookup::Contains,
        Lookup::Icontains,
        Lookup::Startswith,
        Lookup::Istartswith,
        Lookup::In,
        Lookup::Gt,
        Lookup::Gte,
        Lookup::Lt,
        Lookup::Lte,
        Lookup::Isnull,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lookup::Exact => "exact",
            Lookup::Iexact => "iexact",
            Lookup::Contains => "contains",
            Lookup::Icontains => "icontains",
            Lookup::Startswith => "startswith",
            Lookup::Istartswith => "istartswith",
            Lookup::In => "in",
            Lookup::Gt => "gt",
            Lookup::Gte => "gte",
            Lookup::Lt => "lt",
            Lookup::Lte => "lte",
            Lookup::Isnull => "isnull",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterConfig {
    All,
    AllWithRelations,
    Lookups(Vec<Lookup>),
}

impl FilterConfig {
    pub fn exact() -> Self {
        FilterConfig::Lookups(vec![Lookup::Exact])
    }

    pub fn allows(&self, lookup: Lookup) -> bool {
        match self {
            FilterConfig::All | FilterConfig::AllWithRelations => true,
            FilterConfig::Lookups(l) => l.contains(&lookup),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthBackend {
    Basic,
    ApiKey,
    AnonymousApiKey,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthorizationConfig {
    AdminOrOwner {
        owner_column: Option<String>,
    },
    ReadOnly,
}

/// Payload key resolved to a row of another resource before save (e.g. `template_id`).
#[derive(Clone, Debug)]
pub struct HydrateLookupConfig {
    pub key: String,
    pub resource: String,
    pub column: String,
    pub required: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ValidationRule {
    pub required: Option<bool>,
    pub format: Option<String>,
    pub max_length: Option<u32>,
    pub min_length: Option<u32>,
    pub pattern: Option<String>,
    pub allowed: Option<Vec<serde_json::Value>>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct ResourceConfig {
    pub resource_name: String,
    pub table: String,
    pub allowed_methods: Vec<Method>,
    /// Exposed columns; empty means every column of the table.
    pub fields: Vec<String>,
    pub excludes: Vec<String>,
    pub related: Vec<RelatedFieldConfig>,
    /// Columns exposed in detail views only.
    pub detail_only: Vec<String>,
    pub filtering: BTreeMap<String, FilterConfig>,
    pub ordering: Vec<String>,
    pub always_return_data: bool,
    pub authentication: Vec<AuthBackend>,
    pub authorization: AuthorizationConfig,
    pub hydrate_lookups: Vec<HydrateLookupConfig>,
    /// Columns stored as argon2 hashes and never exposed.
    pub password_columns: Vec<String>,
    /// Exposed but ignored on write.
    pub readonly: Vec<String>,
    pub validation: HashMap<String, ValidationRule>,
}

/// Full-text index over one resource. SQL fragments come from declarations only.
#[derive(Clone, Debug)]
pub struct SearchIndexConfig {
    /// Resource name the hits belong to.
    pub model: String,
    /// FROM clause, e.g. `"projectsheet_projectsheet" ps JOIN ...`.
    pub source: String,
    /// Primary key expression of the indexed rows.
    pub pk: String,
    /// Text expression the auto-query matches against.
    pub text: String,
    pub facet_field: String,
    /// JSONB array expression holding the facet values.
    pub facet_expr: String,
    /// Sortable fields: name -> SQL expression.
    pub order_fields: BTreeMap<String, String>,
}

/// All declarations in one struct for in-memory loading.
#[derive(Clone, Debug, Default)]
pub struct FullConfig {
    pub tables: Vec<TableConfig>,
    pub resources: Vec<ResourceConfig>,
    pub search_indexes: Vec<SearchIndexConfig>,
}

impl FullConfig {
    pub fn merge(mut self, other: FullConfig) -> Self {
        self.tables.extend(other.tables);
        self.resources.extend(other.resources);
        self.search_indexes.extend(other.search_indexes);
        self
    }
}
