//! Project sheet templates, questions, answers and the sheets themselves.

use super::projects::PROJECT;
use super::{created_on, max_length, modified, required, resource, table};
use crate::config::{
    ColumnConfig, FilterConfig, FullConfig, HydrateLookupConfig, IndexColumnEntry, IndexConfig, Lookup, Method,
    RelatedFieldConfig, SearchIndexConfig, UseIn, ValidationRule,
};
use crate::search::json_array_or_empty;
use std::collections::{BTreeMap, HashMap};

pub const PROJECTSHEET: &str = "project/sheet/projectsheet";
pub const TEMPLATE: &str = "project/sheet/template";
pub const QUESTION: &str = "project/sheet/question";
pub const QUESTION_CHOICE: &str = "project/sheet/question_choice";
pub const QUESTION_ANSWER: &str = "project/sheet/question_answer";

fn tables() -> Vec<crate::config::TableConfig> {
    let template = table(
        "projectsheet_template",
        vec![
            ColumnConfig::new("name", "VARCHAR(255)").not_null(),
            ColumnConfig::new("slug", "VARCHAR(100)").not_null().unique(),
            ColumnConfig::new("description", "TEXT"),
        ],
    );
    let question = table(
        "projectsheet_question",
        vec![
            ColumnConfig::new("template_id", "BIGINT")
                .not_null()
                .references("projectsheet_template", "CASCADE"),
            ColumnConfig::new("text", "TEXT").not_null(),
            ColumnConfig::new("slug", "VARCHAR(100)"),
            ColumnConfig::new("order", "INTEGER").not_null().default_literal("0"),
            ColumnConfig::new("required", "BOOLEAN").not_null().default_expr("FALSE"),
        ],
    );
    let choice = table(
        "projectsheet_questionchoice",
        vec![
            ColumnConfig::new("question_id", "BIGINT")
                .not_null()
                .references("projectsheet_question", "CASCADE"),
            ColumnConfig::new("text", "VARCHAR(255)").not_null(),
            ColumnConfig::new("value", "VARCHAR(255)"),
            ColumnConfig::new("order", "INTEGER").not_null().default_literal("0"),
        ],
    );
    let mut sheet = table(
        "projectsheet_projectsheet",
        vec![
            ColumnConfig::new("project_id", "BIGINT")
                .not_null()
                .references("projects_project", "CASCADE"),
            ColumnConfig::new("template_id", "BIGINT").references("projectsheet_template", "SET NULL"),
            ColumnConfig::new("tags", "JSONB").not_null().default_literal("[]"),
            ColumnConfig::new("videos", "JSONB").default_literal("{}"),
            created_on(),
            modified(),
        ],
    );
    sheet.history = true;
    sheet.auto_now = Some("modified".into());
    sheet.indexes.push(IndexConfig {
        name: "projectsheet_projectsheet_tags_idx".into(),
        method: Some("gin".into()),
        unique: false,
        columns: vec![IndexColumnEntry::Name("tags".into())],
    });
    let answer = table(
        "projectsheet_questionanswer",
        vec![
            ColumnConfig::new("projectsheet_id", "BIGINT")
                .not_null()
                .references("projectsheet_projectsheet", "CASCADE"),
            ColumnConfig::new("question_id", "BIGINT")
                .not_null()
                .references("projectsheet_question", "CASCADE"),
            ColumnConfig::new("answer", "TEXT"),
            ColumnConfig::new("selected_choices_id", "JSONB").default_literal("[]"),
        ],
    );
    vec![template, question, choice, sheet, answer]
}

/// Full-text index over sheets: project title, baseline and description plus the sheet's tags.
pub fn search_index() -> SearchIndexConfig {
    SearchIndexConfig {
        model: PROJECTSHEET.into(),
        source: "\"projectsheet_projectsheet\" ps JOIN \"projects_project\" p ON p.\"id\" = ps.\"project_id\"".into(),
        pk: "ps.\"id\"".into(),
        text: format!(
            "concat_ws(' ', p.\"title\", p.\"baseline\", p.\"description\", \
             (SELECT string_agg(t.value, ' ') FROM jsonb_array_elements_text({}) AS t(value)))",
            json_array_or_empty("ps.\"tags\"")
        ),
        facet_field: "tags".into(),
        facet_expr: "ps.\"tags\"".into(),
        order_fields: BTreeMap::from([
            ("id".to_string(), "ps.\"id\"".to_string()),
            ("created_on".to_string(), "ps.\"created_on\"".to_string()),
            ("modified".to_string(), "ps.\"modified\"".to_string()),
            ("title".to_string(), "p.\"title\"".to_string()),
        ]),
    }
}

pub fn config() -> FullConfig {
    let mut choices = resource(QUESTION_CHOICE, "projectsheet_questionchoice", &[Method::Get]);
    choices.always_return_data = true;
    choices.ordering = vec!["order".into()];

    let mut questions = resource(QUESTION, "projectsheet_question", &[Method::Get, Method::Post]);
    questions.related = vec![RelatedFieldConfig::to_many("choices", QUESTION_CHOICE, "question_id")
        .full()
        .null()];
    questions.filtering = BTreeMap::from([("slug".to_string(), FilterConfig::exact())]);
    questions.ordering = vec!["order".into()];
    questions.hydrate_lookups = vec![HydrateLookupConfig {
        key: "template_id".into(),
        resource: TEMPLATE.into(),
        column: "template_id".into(),
        required: true,
    }];
    questions.validation = HashMap::from([("text".to_string(), required())]);

    let mut templates = resource(TEMPLATE, "projectsheet_template", &[Method::Get, Method::Post]);
    templates.related = vec![RelatedFieldConfig::to_many("questions", QUESTION, "template_id")
        .full()
        .null()];
    templates.always_return_data = true;
    templates.filtering = BTreeMap::from([("slug".to_string(), FilterConfig::exact())]);
    templates.validation = HashMap::from([
        ("name".to_string(), required()),
        ("slug".to_string(), required()),
        ("description".to_string(), max_length(10_000)),
    ]);

    let mut answers = resource(
        QUESTION_ANSWER,
        "projectsheet_questionanswer",
        &[Method::Get, Method::Patch, Method::Post],
    );
    answers.related = vec![
        RelatedFieldConfig::to_one("question", QUESTION, "question_id").full(),
        RelatedFieldConfig::to_one("projectsheet", PROJECTSHEET, "projectsheet_id"),
    ];
    answers.always_return_data = true;
    answers.filtering = BTreeMap::from([
        ("id".to_string(), FilterConfig::AllWithRelations),
        ("projectsheet".to_string(), FilterConfig::AllWithRelations),
        ("question".to_string(), FilterConfig::AllWithRelations),
    ]);
    answers.validation = HashMap::from([
        ("question_id".to_string(), required()),
        ("projectsheet_id".to_string(), required()),
    ]);

    let mut sheets = resource(
        PROJECTSHEET,
        "projectsheet_projectsheet",
        &[Method::Get, Method::Post, Method::Put, Method::Patch],
    );
    sheets.related = vec![
        RelatedFieldConfig::to_one("project", PROJECT, "project_id").full(),
        RelatedFieldConfig::to_one("template", TEMPLATE, "template_id")
            .null()
            .use_in(UseIn::Detail),
        RelatedFieldConfig::to_many("question_answers", QUESTION_ANSWER, "projectsheet_id")
            .full()
            .null()
            .use_in(UseIn::Detail),
    ];
    sheets.detail_only = vec!["videos".into()];
    sheets.always_return_data = true;
    sheets.filtering = BTreeMap::from([
        ("project".to_string(), FilterConfig::AllWithRelations),
        ("template".to_string(), FilterConfig::AllWithRelations),
        ("created_on".to_string(), FilterConfig::Lookups(vec![Lookup::Gt, Lookup::Gte, Lookup::Lt, Lookup::Lte])),
    ]);
    sheets.ordering = vec!["created_on".into(), "modified".into(), "id".into()];
    sheets.hydrate_lookups = vec![
        HydrateLookupConfig {
            key: "project_id".into(),
            resource: PROJECT.into(),
            column: "project_id".into(),
            required: false,
        },
        HydrateLookupConfig {
            key: "template_id".into(),
            resource: TEMPLATE.into(),
            column: "template_id".into(),
            required: false,
        },
    ];
    sheets.validation = HashMap::from([
        ("project_id".to_string(), required()),
        (
            "tags".to_string(),
            ValidationRule {
                format: Some("string_array".into()),
                ..Default::default()
            },
        ),
    ]);

    FullConfig {
        tables: tables(),
        resources: vec![choices, questions, templates, answers, sheets],
        search_indexes: vec![search_index()],
    }
}
