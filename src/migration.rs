//! Apply declarations to the database: tables, history tables, indexes, then foreign keys.
//! Every statement is idempotent so startup can run it against an existing schema.

use crate::config::types::*;
use crate::config::validate;
use crate::error::AppError;
use sqlx::PgPool;

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// A named foreign key constraint and the statement adding it.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub constraint: String,
    pub sql: String,
}

/// DDL derived from declarations, in execution order.
#[derive(Debug, Default)]
pub struct Plan {
    pub statements: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

fn column_def(c: &ColumnConfig) -> String {
    let mut def = format!("{} {}", quote(&c.name), c.type_);
    if !c.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(d) = &c.default {
        def.push_str(" DEFAULT ");
        match d {
            ColumnDefaultConfig::Literal(s) => def.push_str(&format!("'{}'", s.replace('\'', "''"))),
            ColumnDefaultConfig::Expression { expression } => def.push_str(expression),
        }
    }
    if c.unique {
        def.push_str(" UNIQUE");
    }
    def
}

fn create_table(t: &TableConfig) -> String {
    let mut defs: Vec<String> = t.columns.iter().map(column_def).collect();
    defs.push(format!("PRIMARY KEY ({})", quote(&t.primary_key)));
    for u in &t.unique {
        let cols: Vec<String> = u.iter().map(|s| quote(s)).collect();
        defs.push(format!("UNIQUE ({})", cols.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quote(&t.name),
        defs.join(",\n  ")
    )
}

fn create_history_table(t: &TableConfig) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  \
         \"history_id\" BIGSERIAL PRIMARY KEY,\n  \
         \"id\" BIGINT NOT NULL,\n  \
         \"history_date\" TIMESTAMPTZ NOT NULL DEFAULT NOW(),\n  \
         \"history_type\" VARCHAR(1) NOT NULL,\n  \
         \"history_user_id\" BIGINT,\n  \
         \"payload\" JSONB NOT NULL\n)",
        quote(&format!("{}_history", t.name))
    )
}

fn create_index(t: &TableConfig, idx: &IndexConfig) -> String {
    let cols: Vec<String> = idx
        .columns
        .iter()
        .map(|c| match c {
            IndexColumnEntry::Name(n) => quote(n),
            IndexColumnEntry::Expression { expression } => expression.clone(),
        })
        .collect();
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} USING {} ({})",
        if idx.unique { "UNIQUE " } else { "" },
        quote(&idx.name),
        quote(&t.name),
        idx.method.as_deref().unwrap_or("btree"),
        cols.join(", ")
    )
}

/// Build the DDL plan for `config` without touching the database.
pub fn plan(config: &FullConfig) -> Plan {
    let mut plan = Plan::default();
    for t in &config.tables {
        plan.statements.push(create_table(t));
        if t.history {
            plan.statements.push(create_history_table(t));
            plan.statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} (\"id\", \"history_date\")",
                quote(&format!("{}_history_id_idx", t.name)),
                quote(&format!("{}_history", t.name))
            ));
        }
        for c in &t.columns {
            if c.references.is_some() {
                plan.statements.push(format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    quote(&format!("{}_{}_idx", t.name, c.name)),
                    quote(&t.name),
                    quote(&c.name)
                ));
            }
        }
        for idx in &t.indexes {
            plan.statements.push(create_index(t, idx));
        }
    }
    for t in &config.tables {
        for c in &t.columns {
            let Some(fk) = &c.references else { continue };
            let constraint = format!("{}_{}_fkey", t.name, c.name);
            let sql = format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                quote(&t.name),
                quote(&constraint),
                quote(&c.name),
                quote(&fk.table),
                quote(&fk.column),
                fk.on_delete.as_deref().unwrap_or("NO ACTION")
            );
            plan.foreign_keys.push(ForeignKey { constraint, sql });
        }
    }
    plan
}

/// Validate then apply every table, index and foreign key of `config`.
pub async fn apply_migrations(pool: &PgPool, config: &FullConfig) -> Result<(), AppError> {
    validate(config)?;
    let plan = plan(config);
    for sql in &plan.statements {
        tracing::debug!(sql = %sql, "migration");
        sqlx::query(sql).execute(pool).await?;
    }
    for fk in &plan.foreign_keys {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_constraint WHERE conname = $1)")
            .bind(&fk.constraint)
            .fetch_one(pool)
            .await?;
        if !exists {
            tracing::debug!(sql = %fk.sql, "migration");
            sqlx::query(&fk.sql).execute(pool).await?;
        }
    }
    tracing::info!(
        tables = config.tables.len(),
        foreign_keys = plan.foreign_keys.len(),
        "migrations applied"
    );
    Ok(())
}
