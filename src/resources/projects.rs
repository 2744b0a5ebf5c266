//! Projects, the parent of project sheets.

use super::{created_on, max_length, modified, resource, table};
use crate::config::{ColumnConfig, FilterConfig, FullConfig, Lookup, Method, ValidationRule};
use std::collections::{BTreeMap, HashMap};

pub const PROJECT: &str = "project/project";

pub fn config() -> FullConfig {
    let mut projects_table = table(
        "projects_project",
        vec![
            ColumnConfig::new("title", "VARCHAR(100)").not_null(),
            ColumnConfig::new("baseline", "VARCHAR(250)"),
            ColumnConfig::new("slug", "VARCHAR(100)").not_null().unique(),
            ColumnConfig::new("description", "TEXT"),
            ColumnConfig::new("begin_date", "DATE"),
            ColumnConfig::new("end_date", "DATE"),
            created_on(),
            modified(),
        ],
    );
    projects_table.auto_now = Some("modified".into());

    let mut projects = resource(PROJECT, "projects_project", &[Method::Get, Method::Post, Method::Put, Method::Patch]);
    projects.always_return_data = true;
    projects.filtering = BTreeMap::from([
        ("id".to_string(), FilterConfig::All),
        ("slug".to_string(), FilterConfig::exact()),
        (
            "title".to_string(),
            FilterConfig::Lookups(vec![Lookup::Exact, Lookup::Icontains, Lookup::Istartswith]),
        ),
        ("begin_date".to_string(), FilterConfig::All),
    ]);
    projects.ordering = vec!["title".into(), "begin_date".into(), "created_on".into(), "modified".into()];
    projects.validation = HashMap::from([
        (
            "title".to_string(),
            ValidationRule {
                required: Some(true),
                max_length: Some(100),
                ..Default::default()
            },
        ),
        (
            "slug".to_string(),
            ValidationRule {
                required: Some(true),
                max_length: Some(100),
                pattern: Some(r"^[-a-zA-Z0-9_]+$".into()),
                ..Default::default()
            },
        ),
        ("baseline".to_string(), max_length(250)),
    ]);
    projects.validation.insert("begin_date".to_string(), date_rule());
    projects.validation.insert("end_date".to_string(), date_rule());

    FullConfig {
        tables: vec![projects_table],
        resources: vec![projects],
        search_indexes: vec![],
    }
}

fn date_rule() -> ValidationRule {
    ValidationRule {
        pattern: Some(r"^\d{4}-\d{2}-\d{2}$".into()),
        ..Default::default()
    }
}
