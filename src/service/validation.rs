//! Request validation from declared column rules.

use crate::config::ValidationRule;
use crate::error::AppError;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Full checks every rule (create, replace); Partial only the fields present (patch).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationMode {
    Full,
    Partial,
}

pub struct RequestValidator;

impl RequestValidator {
    /// Check `body` against per-column rules. Every failing field is reported, sorted by column.
    pub fn validate(
        body: &Map<String, Value>,
        rules: &HashMap<String, ValidationRule>,
        mode: ValidationMode,
    ) -> Result<(), AppError> {
        let mut errors: Vec<String> = Vec::new();
        for (col, rule) in rules {
            match body.get(col) {
                None | Some(Value::Null) if mode == ValidationMode::Full && rule.required == Some(true) => {
                    errors.push(format!("{} is required", col));
                }
                Some(Value::Null) if mode == ValidationMode::Partial && rule.required == Some(true) => {
                    errors.push(format!("{} may not be null", col));
                }
                Some(v) if !v.is_null() => {
                    if let Err(msg) = check_field(col, v, rule) {
                        errors.push(msg);
                    }
                }
                _ => {}
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            errors.sort();
            Err(AppError::Validation(errors.join("; ")))
        }
    }
}

fn check_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), String> {
    if let Some(format) = &rule.format {
        check_format(col, v, format)?;
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                return Err(format!("{} must be at most {} characters", col, max));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                return Err(format!("{} must be at least {} characters", col, min));
            }
        }
        if let Some(pattern) = &rule.pattern {
            let re = Regex::new(pattern).map_err(|_| format!("invalid pattern for {}", col))?;
            if !re.is_match(s) {
                return Err(format!("{} does not match required pattern", col));
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(format!(
                "{} must be one of: {}",
                col,
                allowed.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
            ));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                return Err(format!("{} must be at least {}", col, min));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Err(format!("{} must be at most {}", col, max));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn check_format(col: &str, v: &Value, format: &str) -> Result<(), String> {
    if format.eq_ignore_ascii_case("string_array") {
        return match v.as_array() {
            Some(items) if items.iter().all(Value::is_string) => Ok(()),
            _ => Err(format!("{} must be a list of strings", col)),
        };
    }
    let Some(s) = v.as_str() else {
        return Err(format!("{} must be a string", col));
    };
    match format.to_lowercase().as_str() {
        "email" => match s.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
            _ => Err(format!("{} must be a valid email", col)),
        },
        "uuid" => uuid::Uuid::parse_str(s)
            .map(|_| ())
            .map_err(|_| format!("{} must be a valid UUID", col)),
        "url" => {
            if s.starts_with("http://") || s.starts_with("https://") {
                Ok(())
            } else {
                Err(format!("{} must be an http(s) URL", col))
            }
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules() -> HashMap<String, ValidationRule> {
        HashMap::from([
            (
                "username".to_string(),
                ValidationRule {
                    required: Some(true),
                    max_length: Some(5),
                    ..Default::default()
                },
            ),
            (
                "email".to_string(),
                ValidationRule {
                    format: Some("email".into()),
                    ..Default::default()
                },
            ),
            (
                "zoom".to_string(),
                ValidationRule {
                    minimum: Some(0.0),
                    maximum: Some(20.0),
                    ..Default::default()
                },
            ),
        ])
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn full_requires_fields() {
        let err = RequestValidator::validate(&obj(json!({"email": "a@b.org"})), &rules(), ValidationMode::Full)
            .unwrap_err();
        assert!(err.to_string().contains("username is required"));
        assert!(RequestValidator::validate(&obj(json!({"email": "a@b.org"})), &rules(), ValidationMode::Partial).is_ok());
    }

    #[test]
    fn reports_every_failure() {
        let body = obj(json!({"username": "toolongname", "email": "nope", "zoom": 42}));
        let msg = RequestValidator::validate(&body, &rules(), ValidationMode::Partial)
            .unwrap_err()
            .to_string();
        assert!(msg.contains("email must be a valid email"));
        assert!(msg.contains("username must be at most 5 characters"));
        assert!(msg.contains("zoom must be at most 20"));
    }

    #[test]
    fn partial_rejects_null_required() {
        let body = obj(json!({"username": null}));
        assert!(RequestValidator::validate(&body, &rules(), ValidationMode::Partial).is_err());
    }

    #[test]
    fn tag_lists_must_hold_strings() {
        let rules = HashMap::from([(
            "tags".to_string(),
            ValidationRule {
                format: Some("string_array".into()),
                ..Default::default()
            },
        )]);
        assert!(RequestValidator::validate(&obj(json!({"tags": ["urgent", "bees"]})), &rules, ValidationMode::Full).is_ok());
        assert!(RequestValidator::validate(&obj(json!({"tags": []})), &rules, ValidationMode::Full).is_ok());
        for bad in [json!("urgent"), json!({"a": 1}), json!(["urgent", 3]), json!(7)] {
            let err = RequestValidator::validate(&obj(json!({ "tags": bad })), &rules, ValidationMode::Partial).unwrap_err();
            assert!(err.to_string().contains("tags must be a list of strings"));
        }
    }
}
