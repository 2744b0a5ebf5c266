//! Turn list query parameters into filters and ordering allowed by the resource.

use crate::config::{FilterConfig, Lookup, RelationKind, ResolvedResource};
use crate::error::AppError;
use crate::sql::{Filter, FilterValue, OrderBy};

/// Parameters that never filter.
const RESERVED: [&str; 7] = ["limit", "offset", "order_by", "format", "username", "api_key", "callback"];

const LOOKUP_SEP: &str = "__";

/// Build filters from `field` / `field__lookup` pairs. Undeclared fields are ignored.
pub fn parse_filters(resource: &ResolvedResource, params: &[(String, String)]) -> Result<Vec<Filter>, AppError> {
    let mut filters = Vec::new();
    for (key, raw) in params {
        if RESERVED.contains(&key.as_str()) {
            continue;
        }
        let mut parts = key.split(LOOKUP_SEP);
        let field = parts.next().unwrap_or_default();
        let rest: Vec<&str> = parts.collect();
        let Some(config) = resource.filtering.get(field) else {
            continue;
        };
        let (column, lookup_name) = match resource.related_field(field) {
            Some(rel) if rel.kind == RelationKind::ToOne => {
                let lookup = related_lookup(field, &rest, config)?;
                (rel.attribute.clone(), lookup)
            }
            Some(_) => {
                return Err(AppError::BadRequest(format!(
                    "filtering on to-many field '{}' is not supported",
                    field
                )))
            }
            None => match rest.as_slice() {
                [] => (field.to_string(), None),
                [lookup] => (field.to_string(), Some(*lookup)),
                _ => {
                    return Err(AppError::BadRequest(format!(
                        "'{}' is not a relation; '{}' is not a valid filter",
                        field, key
                    )))
                }
            },
        };
        let lookup = match lookup_name {
            None => Lookup::Exact,
            Some(name) => Lookup::parse(name).ok_or_else(|| {
                AppError::BadRequest(format!("unknown lookup '{}' in filter '{}'", name, key))
            })?,
        };
        if !config.allows(lookup) {
            return Err(AppError::BadRequest(format!(
                "lookup '{}' is not allowed for field '{}'",
                lookup.as_str(),
                field
            )));
        }
        filters.push(Filter {
            column,
            lookup,
            value: filter_value(lookup, key, raw)?,
        });
    }
    Ok(filters)
}

/// `project=3`, `project__in=1,2`, `project__id=3`, `project__id__in=1,2`.
fn related_lookup<'a>(field: &str, rest: &[&'a str], config: &FilterConfig) -> Result<Option<&'a str>, AppError> {
    match rest {
        [] => Ok(None),
        ["id"] | ["pk"] => Ok(None),
        ["id" | "pk", lookup] => Ok(Some(*lookup)),
        [lookup] if Lookup::parse(lookup).is_some() => Ok(Some(*lookup)),
        _ if *config != FilterConfig::AllWithRelations => Err(AppError::BadRequest(format!(
            "filtering across '{}' is not allowed",
            field
        ))),
        _ => Err(AppError::BadRequest(format!(
            "filtering across '{}' supports only the related id",
            field
        ))),
    }
}

fn filter_value(lookup: Lookup, key: &str, raw: &str) -> Result<FilterValue, AppError> {
    Ok(match lookup {
        Lookup::In => FilterValue::Many(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        ),
        Lookup::Isnull => FilterValue::Flag(match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => {
                return Err(AppError::BadRequest(format!(
                    "'{}' expects true or false, got '{}'",
                    key, raw
                )))
            }
        }),
        _ => FilterValue::One(raw.to_string()),
    })
}

/// Read every `order_by` value. Fields must be declared orderable.
pub fn parse_ordering(resource: &ResolvedResource, params: &[(String, String)]) -> Result<Vec<OrderBy>, AppError> {
    params
        .iter()
        .filter(|(k, _)| k == "order_by")
        .map(|(_, v)| {
            let mut order = OrderBy::parse(v.trim());
            if !resource.ordering.iter().any(|f| f == &order.column) {
                return Err(AppError::BadRequest(format!(
                    "no matching ordering for '{}'; allowed: {}",
                    order.column,
                    resource.ordering.join(", ")
                )));
            }
            if let Some(rel) = resource.related_field(&order.column) {
                order.column = rel.attribute.clone();
            }
            Ok(order)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ColumnConfig, FullConfig, AuthBackend, AuthorizationConfig, Method, RelatedFieldConfig, ResourceConfig, TableConfig};
    use std::collections::BTreeMap;

    fn resource() -> ResolvedResource {
        let table = |name: &str, cols: Vec<ColumnConfig>| TableConfig {
            name: name.into(),
            primary_key: "id".into(),
            columns: cols,
            unique: vec![],
            indexes: vec![],
            history: false,
            auto_now: None,
        };
        let res = |name: &str, table: &str| ResourceConfig {
            resource_name: name.into(),
            table: table.into(),
            allowed_methods: vec![Method::Get],
            fields: vec![],
            excludes: vec![],
            related: vec![],
            detail_only: vec![],
            filtering: BTreeMap::new(),
            ordering: vec![],
            always_return_data: false,
            authentication: vec![AuthBackend::AnonymousApiKey],
            authorization: AuthorizationConfig::ReadOnly,
            hydrate_lookups: vec![],
            password_columns: vec![],
            readonly: vec![],
            validation: Default::default(),
        };
        let mut sheet = res("sheet", "sheet");
        sheet.related = vec![RelatedFieldConfig::to_one("project", "project", "project_id")];
        sheet.filtering = BTreeMap::from([
            ("project".to_string(), FilterConfig::AllWithRelations),
            ("name".to_string(), FilterConfig::Lookups(vec![Lookup::Exact, Lookup::Icontains])),
        ]);
        sheet.ordering = vec!["name".into(), "project".into()];
        let config = FullConfig {
            tables: vec![
                table("project", vec![ColumnConfig::new("id", "BIGSERIAL")]),
                table(
                    "sheet",
                    vec![
                        ColumnConfig::new("id", "BIGSERIAL"),
                        ColumnConfig::new("name", "TEXT"),
                        ColumnConfig::new("project_id", "BIGINT").references("project", "CASCADE"),
                    ],
                ),
            ],
            resources: vec![res("project", "project"), sheet],
            search_indexes: vec![],
        };
        resolve(&config).unwrap().resource("sheet").cloned().unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn related_filters_map_to_fk_column() {
        let f = parse_filters(&resource(), &params(&[("project", "3"), ("project__id__in", "1,2"), ("limit", "5")])).unwrap();
        assert_eq!(f.len(), 2);
        assert_eq!(f[0].column, "project_id");
        assert_eq!(f[0].lookup, Lookup::Exact);
        assert_eq!(f[1].value, FilterValue::Many(vec!["1".into(), "2".into()]));
    }

    #[test]
    fn undeclared_fields_are_ignored_and_bad_lookups_rejected() {
        let r = resource();
        assert!(parse_filters(&r, &params(&[("id", "3"), ("whatever__gt", "1")])).unwrap().is_empty());
        assert!(matches!(
            parse_filters(&r, &params(&[("name__startswith", "x")])),
            Err(AppError::BadRequest(_))
        ));
        assert!(parse_filters(&r, &params(&[("name__bogus", "x")])).is_err());
        assert!(parse_filters(&r, &params(&[("project__title", "x")])).is_err());
    }

    #[test]
    fn ordering_accepts_declared_fields_only() {
        let r = resource();
        let o = parse_ordering(&r, &params(&[("order_by", "-name"), ("order_by", "project")])).unwrap();
        assert_eq!(o[0], OrderBy { column: "name".into(), descending: true });
        assert_eq!(o[1].column, "project_id");
        assert!(parse_ordering(&r, &params(&[("order_by", "id")])).is_err());
    }
}
