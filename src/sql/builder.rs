//! Builds parameterized INSERT, SELECT, UPDATE, DELETE from a resolved table.

use crate::config::{Lookup, ResolvedTable};
use crate::sql::PgBindValue;
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL (safe: only from declarations).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: PgBindValue) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    One(String),
    Many(Vec<String>),
    Flag(bool),
}

/// One `column__lookup=value` condition, already checked against the resource's filtering rules.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub column: String,
    pub lookup: Lookup,
    pub value: FilterValue,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    /// Parse `field` or `-field`.
    pub fn parse(s: &str) -> Self {
        match s.strip_prefix('-') {
            Some(col) => OrderBy {
                column: col.to_string(),
                descending: true,
            },
            None => OrderBy {
                column: s.to_string(),
                descending: false,
            },
        }
    }
}

/// SELECT list: each column as-is, except numeric as col::text so sqlx returns String.
fn select_column_list(table: &ResolvedTable, alias: Option<&str>) -> String {
    table
        .columns
        .iter()
        .map(|c| {
            let q = match alias {
                Some(a) => format!("{}.{}", a, quoted(&c.name)),
                None => quoted(&c.name),
            };
            if c.pg_type == "numeric" {
                format!("{}::text AS {}", q, quoted(&c.name))
            } else {
                q
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholder(q: &mut QueryBuf, value: PgBindValue, cast: &str) -> String {
    let n = q.push_param(value);
    format!("${}::{}", n, cast)
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// WHERE clause for filters; unknown columns are skipped.
fn where_clause(q: &mut QueryBuf, table: &ResolvedTable, filters: &[Filter]) -> String {
    let mut parts = Vec::new();
    for f in filters {
        let Some(col) = table.column(&f.column) else { continue };
        let name = quoted(&col.name);
        let cast = col.pg_type.as_str();
        let part = match (&f.lookup, &f.value) {
            (Lookup::Isnull, FilterValue::Flag(true)) => format!("{} IS NULL", name),
            (Lookup::Isnull, FilterValue::Flag(false)) => format!("{} IS NOT NULL", name),
            (Lookup::In, FilterValue::Many(values)) => {
                if values.is_empty() {
                    "FALSE".to_string()
                } else {
                    let phs: Vec<String> = values
                        .iter()
                        .map(|v| placeholder(q, PgBindValue::text(v.as_str()), cast))
                        .collect();
                    format!("{} IN ({})", name, phs.join(", "))
                }
            }
            (lookup, FilterValue::One(v)) => {
                let (op, pattern) = match lookup {
                    Lookup::Exact => ("=", None),
                    Lookup::Iexact => ("ILIKE", Some(escape_like(v))),
                    Lookup::Contains => ("LIKE", Some(format!("%{}%", escape_like(v)))),
                    Lookup::Icontains => ("ILIKE", Some(format!("%{}%", escape_like(v)))),
                    Lookup::Startswith => ("LIKE", Some(format!("{}%", escape_like(v)))),
                    Lookup::Istartswith => ("ILIKE", Some(format!("{}%", escape_like(v)))),
                    Lookup::Gt => (">", None),
                    Lookup::Gte => (">=", None),
                    Lookup::Lt => ("<", None),
                    Lookup::Lte => ("<=", None),
                    Lookup::In | Lookup::Isnull => continue,
                };
                match pattern {
                    Some(p) => {
                        let ph = placeholder(q, PgBindValue::text(p), "text");
                        format!("{}::text {} {}", name, op, ph)
                    }
                    None => {
                        let ph = placeholder(q, PgBindValue::text(v.as_str()), cast);
                        format!("{} {} {}", name, op, ph)
                    }
                }
            }
            _ => continue,
        };
        parts.push(part);
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn order_clause(table: &ResolvedTable, order: &[OrderBy]) -> String {
    let mut parts: Vec<String> = order
        .iter()
        .filter(|o| table.column(&o.column).is_some())
        .map(|o| {
            format!(
                "{}{}",
                quoted(&o.column),
                if o.descending { " DESC" } else { " ASC" }
            )
        })
        .collect();
    if !order.iter().any(|o| o.column == table.pk) {
        parts.push(quoted(&table.pk));
    }
    format!(" ORDER BY {}", parts.join(", "))
}

/// SELECT list with filters, ordering (pk as tiebreaker), optional LIMIT/OFFSET.
pub fn select_list(
    table: &ResolvedTable,
    filters: &[Filter],
    order: &[OrderBy],
    limit: Option<u32>,
    offset: u32,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, table, filters);
    let limit_clause = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = if offset > 0 {
        format!(" OFFSET {}", offset)
    } else {
        String::new()
    };
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        select_column_list(table, None),
        quoted(&table.name),
        where_sql,
        order_clause(table, order),
        limit_clause,
        offset_clause
    );
    q
}

/// SELECT COUNT(*) with the same filters as `select_list`.
pub fn count(table: &ResolvedTable, filters: &[Filter]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, table, filters);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", quoted(&table.name), where_sql);
    q
}

/// SELECT by primary key. Caller binds the id as the sole param.
pub fn select_by_id(table: &ResolvedTable) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = $1::{}",
        select_column_list(table, None),
        quoted(&table.name),
        quoted(&table.pk),
        pk_cast(table)
    )
}

fn pk_cast(table: &ResolvedTable) -> &str {
    table
        .column(&table.pk)
        .map(|c| c.pg_type.as_str())
        .unwrap_or("text")
}

/// SELECT * FROM table WHERE column IN ($1, $2, ...) ORDER BY pk. Used for batch-loading related rows.
pub fn select_by_column_in(table: &ResolvedTable, column_name: &str, values: &[Value]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let cols = select_column_list(table, None);
    if values.is_empty() {
        q.sql = format!("SELECT {} FROM {} WHERE 1 = 0", cols, quoted(&table.name));
        return q;
    }
    let cast = table
        .column(column_name)
        .map(|c| c.pg_type.clone())
        .unwrap_or_else(|| "text".into());
    let placeholders: Vec<String> = values
        .iter()
        .map(|v| placeholder(&mut q, PgBindValue::from_json(v), &cast))
        .collect();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY {}",
        cols,
        quoted(&table.name),
        quoted(column_name),
        placeholders.join(", "),
        quoted(&table.pk)
    );
    q
}

/// INSERT the declared columns present in body. Columns with a DB default are omitted when absent.
pub fn insert(table: &ResolvedTable, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &table.columns {
        let val = body.get(&c.name);
        if c.pk_type.is_some() && val.is_none() {
            continue;
        }
        let val = match val {
            Some(v) => v,
            None if c.has_default => continue,
            None => &Value::Null,
        };
        let ph = placeholder(&mut q, PgBindValue::for_column(val, c.is_json()), &c.pg_type);
        cols.push(quoted(&c.name));
        placeholders.push(ph);
    }
    q.sql = if cols.is_empty() {
        format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING {}",
            quoted(&table.name),
            select_column_list(table, None)
        )
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            quoted(&table.name),
            cols.join(", "),
            placeholders.join(", "),
            select_column_list(table, None)
        )
    };
    q
}

/// UPDATE by id: SET only declared columns present in body, plus the auto-now column.
pub fn update(table: &ResolvedTable, id: &Value, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for c in &table.columns {
        if c.name == table.pk {
            continue;
        }
        let Some(v) = body.get(&c.name) else { continue };
        let rhs = placeholder(&mut q, PgBindValue::for_column(v, c.is_json()), &c.pg_type);
        sets.push(format!("{} = {}", quoted(&c.name), rhs));
    }
    if let Some(col) = &table.auto_now {
        if !body.contains_key(col) {
            sets.push(format!("{} = NOW()", quoted(col)));
        }
    }
    let id_ph = placeholder(&mut q, PgBindValue::from_json(id), pk_cast(table));
    let returning = select_column_list(table, None);
    q.sql = if sets.is_empty() {
        format!(
            "SELECT {} FROM {} WHERE {} = {}",
            returning,
            quoted(&table.name),
            quoted(&table.pk),
            id_ph
        )
    } else {
        format!(
            "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
            quoted(&table.name),
            sets.join(", "),
            quoted(&table.pk),
            id_ph,
            returning
        )
    };
    q
}

/// DELETE by id.
pub fn delete(table: &ResolvedTable, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_ph = placeholder(&mut q, PgBindValue::from_json(id), pk_cast(table));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        quoted(&table.name),
        quoted(&table.pk),
        id_ph,
        select_column_list(table, None)
    );
    q
}

/// Copy the current row into `<table>_history`. Run before DELETE and after INSERT/UPDATE.
pub fn insert_history(table: &ResolvedTable, id: &Value, history_type: &str, user_id: Option<i64>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_ph = placeholder(&mut q, PgBindValue::from_json(id), pk_cast(table));
    let type_ph = placeholder(&mut q, PgBindValue::text(history_type), "text");
    let user_ph = placeholder(
        &mut q,
        user_id.map(PgBindValue::I64).unwrap_or(PgBindValue::Null),
        "bigint",
    );
    q.sql = format!(
        "INSERT INTO {} (\"id\", \"history_type\", \"history_user_id\", \"payload\") \
         SELECT t.{}, {}, {}, to_jsonb(t.*) FROM {} t WHERE t.{} = {}",
        quoted(&table.history_table()),
        quoted(&table.pk),
        type_ph,
        user_ph,
        quoted(&table.name),
        quoted(&table.pk),
        id_ph
    );
    q
}

/// History rows for one object, newest first.
pub fn select_history(table: &ResolvedTable, id: &Value, limit: u32, offset: u32) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_ph = placeholder(&mut q, PgBindValue::from_json(id), pk_cast(table));
    q.sql = format!(
        "SELECT \"history_id\", \"history_date\", \"history_type\", \"history_user_id\", \"payload\" \
         FROM {} WHERE \"id\" = {} ORDER BY \"history_date\" DESC, \"history_id\" DESC LIMIT {} OFFSET {}",
        quoted(&table.history_table()),
        id_ph,
        limit,
        offset
    );
    q
}

pub fn count_history(table: &ResolvedTable, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_ph = placeholder(&mut q, PgBindValue::from_json(id), pk_cast(table));
    q.sql = format!(
        "SELECT COUNT(*) FROM {} WHERE \"id\" = {}",
        quoted(&table.history_table()),
        id_ph
    );
    q
}
