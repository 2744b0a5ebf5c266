//! Declaration validation: referential integrity and resource consistency.

use crate::config::{FullConfig, RelationKind};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let mut tables: HashMap<&str, HashSet<&str>> = HashMap::new();
    for t in &config.tables {
        let cols: HashSet<&str> = t.columns.iter().map(|c| c.name.as_str()).collect();
        if !cols.contains(t.primary_key.as_str()) {
            return Err(ConfigError::InvalidPrimaryKey {
                table: t.name.clone(),
                column: t.primary_key.clone(),
            });
        }
        if let Some(col) = &t.auto_now {
            if !cols.contains(col.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "column",
                    id: format!("{}.{}", t.name, col),
                });
            }
        }
        if tables.insert(t.name.as_str(), cols).is_some() {
            return Err(ConfigError::DuplicateTable(t.name.clone()));
        }
    }

    for t in &config.tables {
        for c in &t.columns {
            if let Some(fk) = &c.references {
                let target = tables.get(fk.table.as_str()).ok_or_else(|| ConfigError::MissingReference {
                    kind: "table",
                    id: fk.table.clone(),
                })?;
                if !target.contains(fk.column.as_str()) {
                    return Err(ConfigError::MissingReference {
                        kind: "column",
                        id: format!("{}.{}", fk.table, fk.column),
                    });
                }
            }
        }
    }

    let mut resource_tables: HashMap<&str, &str> = HashMap::new();
    for r in &config.resources {
        if !tables.contains_key(r.table.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "table",
                id: r.table.clone(),
            });
        }
        if resource_tables.insert(r.resource_name.as_str(), r.table.as_str()).is_some() {
            return Err(ConfigError::DuplicateResource(r.resource_name.clone()));
        }
        if r.allowed_methods.is_empty() {
            return Err(ConfigError::Validation(format!(
                "resource {} allows no methods",
                r.resource_name
            )));
        }
        if r.authentication.is_empty() {
            return Err(ConfigError::Validation(format!(
                "resource {} declares no authentication backend",
                r.resource_name
            )));
        }
    }

    for r in &config.resources {
        let own_cols = &tables[r.table.as_str()];
        let declared = r
            .fields
            .iter()
            .chain(&r.excludes)
            .chain(&r.detail_only)
            .chain(&r.password_columns)
            .chain(&r.readonly);
        for name in declared {
            if !own_cols.contains(name.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "column",
                    id: format!("{}.{}", r.table, name),
                });
            }
        }
        for rel in &r.related {
            let target_table = resource_tables.get(rel.resource.as_str()).ok_or_else(|| {
                ConfigError::MissingReference {
                    kind: "resource",
                    id: rel.resource.clone(),
                }
            })?;
            let attr_table = match rel.kind {
                RelationKind::ToOne => r.table.as_str(),
                RelationKind::ToMany => *target_table,
            };
            if !tables[attr_table].contains(rel.attribute.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "column",
                    id: format!("{}.{}", attr_table, rel.attribute),
                });
            }
        }
        for lookup in &r.hydrate_lookups {
            if !resource_tables.contains_key(lookup.resource.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "resource",
                    id: lookup.resource.clone(),
                });
            }
            if !own_cols.contains(lookup.column.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "column",
                    id: format!("{}.{}", r.table, lookup.column),
                });
            }
        }
        for field in r.filtering.keys().chain(&r.ordering) {
            if !own_cols.contains(field.as_str()) && !r.related.iter().any(|rel| rel.name == *field) {
                return Err(ConfigError::Validation(format!(
                    "resource {}: unknown field '{}' in filtering/ordering",
                    r.resource_name, field
                )));
            }
        }
    }

    for idx in &config.search_indexes {
        if !resource_tables.contains_key(idx.model.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "resource",
                id: idx.model.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AuthBackend, AuthorizationConfig, ColumnConfig, Method, RelatedFieldConfig, ResourceConfig,
        TableConfig,
    };

    fn table(name: &str, columns: Vec<ColumnConfig>) -> TableConfig {
        TableConfig {
            name: name.into(),
            primary_key: "id".into(),
            columns,
            unique: vec![],
            indexes: vec![],
            history: false,
            auto_now: None,
        }
    }

    fn resource(name: &str, table: &str) -> ResourceConfig {
        ResourceConfig {
            resource_name: name.into(),
            table: table.into(),
            allowed_methods: vec![Method::Get],
            fields: vec![],
            excludes: vec![],
            related: vec![],
            detail_only: vec![],
            filtering: Default::default(),
            ordering: vec![],
            always_return_data: false,
            authentication: vec![AuthBackend::Basic],
            authorization: AuthorizationConfig::ReadOnly,
            hydrate_lookups: vec![],
            password_columns: vec![],
            readonly: vec![],
            validation: Default::default(),
        }
    }

    fn base() -> FullConfig {
        FullConfig {
            tables: vec![
                table("parent", vec![ColumnConfig::new("id", "BIGSERIAL")]),
                table(
                    "child",
                    vec![
                        ColumnConfig::new("id", "BIGSERIAL"),
                        ColumnConfig::new("parent_id", "BIGINT").references("parent", "CASCADE"),
                    ],
                ),
            ],
            resources: vec![resource("test/parent", "parent"), resource("test/child", "child")],
            search_indexes: vec![],
        }
    }

    #[test]
    fn accepts_consistent_declarations() {
        assert!(validate(&base()).is_ok());
    }

    #[test]
    fn rejects_duplicate_resource_names() {
        let mut config = base();
        config.resources.push(resource("test/parent", "child"));
        assert!(matches!(validate(&config), Err(ConfigError::DuplicateResource(_))));
    }

    #[test]
    fn rejects_related_field_on_missing_column() {
        let mut config = base();
        config.resources[0]
            .related
            .push(RelatedFieldConfig::to_many("children", "test/child", "owner_id"));
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingReference { kind: "column", .. })
        ));
    }

    #[test]
    fn rejects_foreign_key_to_unknown_table() {
        let mut config = base();
        config.tables[1]
            .columns
            .push(ColumnConfig::new("other_id", "BIGINT").references("nowhere", "CASCADE"));
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingReference { kind: "table", .. })
        ));
    }

    #[test]
    fn rejects_missing_primary_key_column() {
        let mut config = base();
        config.tables[0].primary_key = "uuid".into();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidPrimaryKey { .. })));
    }
}
