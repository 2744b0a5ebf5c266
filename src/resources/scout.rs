//! Maps, tile layers and markers.

use super::accounts::USER;
use super::{between, created_on, max_length, required, resource, table};
use crate::config::{
    AuthorizationConfig, ColumnConfig, FilterConfig, FullConfig, Method, RelatedFieldConfig, UseIn, ValidationRule,
};
use std::collections::{BTreeMap, HashMap};

pub const MAP: &str = "scout/map";
pub const TILELAYER: &str = "scout/tilelayer";
pub const MARKER: &str = "scout/marker";

const ALL_METHODS: [Method; 5] = [Method::Get, Method::Post, Method::Put, Method::Patch, Method::Delete];

pub fn config() -> FullConfig {
    let tilelayer = table(
        "scout_tilelayer",
        vec![
            ColumnConfig::new("name", "VARCHAR(200)").not_null(),
            ColumnConfig::new("url_template", "VARCHAR(200)").not_null(),
            ColumnConfig::new("attribution", "TEXT"),
            ColumnConfig::new("min_zoom", "INTEGER").not_null().default_literal("0"),
            ColumnConfig::new("max_zoom", "INTEGER").not_null().default_literal("18"),
        ],
    );
    let map = table(
        "scout_map",
        vec![
            ColumnConfig::new("name", "VARCHAR(200)").not_null(),
            ColumnConfig::new("tilelayer_id", "BIGINT").references("scout_tilelayer", "SET NULL"),
            ColumnConfig::new("center_lat", "DOUBLE PRECISION"),
            ColumnConfig::new("center_lng", "DOUBLE PRECISION"),
            ColumnConfig::new("zoom", "INTEGER").not_null().default_literal("13"),
            created_on(),
        ],
    );
    let marker = table(
        "scout_marker",
        vec![
            ColumnConfig::new("map_id", "BIGINT").not_null().references("scout_map", "CASCADE"),
            ColumnConfig::new("created_by_id", "BIGINT").references("account_user", "SET NULL"),
            ColumnConfig::new("lat", "DOUBLE PRECISION").not_null(),
            ColumnConfig::new("lng", "DOUBLE PRECISION").not_null(),
            ColumnConfig::new("title", "VARCHAR(200)"),
            ColumnConfig::new("comment", "TEXT"),
            created_on(),
        ],
    );

    let mut tilelayers = resource(TILELAYER, "scout_tilelayer", &ALL_METHODS);
    tilelayers.always_return_data = true;
    tilelayers.validation = HashMap::from([
        ("name".to_string(), required()),
        (
            "url_template".to_string(),
            ValidationRule {
                required: Some(true),
                format: Some("url".into()),
                max_length: Some(200),
                ..Default::default()
            },
        ),
        ("min_zoom".to_string(), between(0.0, 20.0)),
        ("max_zoom".to_string(), between(0.0, 20.0)),
    ]);

    let mut maps = resource(MAP, "scout_map", &ALL_METHODS);
    maps.related = vec![
        RelatedFieldConfig::to_one("tilelayer", TILELAYER, "tilelayer_id").full().null(),
        RelatedFieldConfig::to_many("markers", MARKER, "map_id")
            .full()
            .null()
            .use_in(UseIn::Detail),
    ];
    maps.always_return_data = true;
    maps.filtering = BTreeMap::from([
        ("name".to_string(), FilterConfig::All),
        ("tilelayer".to_string(), FilterConfig::AllWithRelations),
    ]);
    maps.ordering = vec!["name".into(), "created_on".into()];
    maps.validation = HashMap::from([
        ("name".to_string(), required()),
        ("center_lat".to_string(), between(-90.0, 90.0)),
        ("center_lng".to_string(), between(-180.0, 180.0)),
        ("zoom".to_string(), between(0.0, 20.0)),
    ]);

    let mut markers = resource(MARKER, "scout_marker", &ALL_METHODS);
    markers.related = vec![
        RelatedFieldConfig::to_one("map", MAP, "map_id"),
        RelatedFieldConfig::to_one("created_by", USER, "created_by_id").full().null(),
    ];
    markers.always_return_data = true;
    markers.authorization = AuthorizationConfig::AdminOrOwner {
        owner_column: Some("created_by_id".into()),
    };
    markers.filtering = BTreeMap::from([
        ("map".to_string(), FilterConfig::AllWithRelations),
        ("created_by".to_string(), FilterConfig::AllWithRelations),
    ]);
    markers.ordering = vec!["created_on".into()];
    markers.validation = HashMap::from([
        ("map_id".to_string(), required()),
        (
            "lat".to_string(),
            ValidationRule {
                required: Some(true),
                minimum: Some(-90.0),
                maximum: Some(90.0),
                ..Default::default()
            },
        ),
        (
            "lng".to_string(),
            ValidationRule {
                required: Some(true),
                minimum: Some(-180.0),
                maximum: Some(180.0),
                ..Default::default()
            },
        ),
        ("title".to_string(), max_length(200)),
    ]);

    FullConfig {
        tables: vec![tilelayer, map, marker],
        resources: vec![tilelayers, maps, markers],
        search_indexes: vec![],
    }
}
