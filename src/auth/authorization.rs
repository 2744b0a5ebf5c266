//! Per-resource authorization policies.

use super::Requester;
use crate::config::{AuthorizationConfig, Method};
use crate::error::AppError;
use serde_json::{Map, Value};

/// Check `method` on a resource. `row` is the existing object for detail writes.
pub fn authorize(
    policy: &AuthorizationConfig,
    requester: &Requester,
    method: Method,
    row: Option<&Map<String, Value>>,
) -> Result<(), AppError> {
    if method == Method::Get {
        return Ok(());
    }
    match policy {
        AuthorizationConfig::ReadOnly => Err(AppError::Forbidden(format!(
            "{} is not permitted on a read-only resource",
            method.as_str()
        ))),
        AuthorizationConfig::AdminOrOwner { owner_column } => {
            if *requester == Requester::Anonymous {
                return Err(AppError::Unauthorized("authentication required to write".into()));
            }
            if method == Method::Post || requester.is_admin() {
                return Ok(());
            }
            let owner = owner_column.as_deref().and_then(|col| row.and_then(|r| r.get(col)));
            if requester.owns(owner) {
                Ok(())
            } else {
                Err(AppError::Forbidden(format!(
                    "{} requires staff status or ownership",
                    method.as_str()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::User;
    use serde_json::json;

    fn user(id: i64, staff: bool) -> Requester {
        Requester::User(User {
            id,
            username: format!("u{}", id),
            is_staff: staff,
            is_superuser: false,
        })
    }

    fn owned_by(id: i64) -> Map<String, Value> {
        json!({"id": 9, "user_id": id}).as_object().cloned().unwrap()
    }

    fn policy() -> AuthorizationConfig {
        AuthorizationConfig::AdminOrOwner {
            owner_column: Some("user_id".into()),
        }
    }

    #[test]
    fn reads_are_open() {
        assert!(authorize(&AuthorizationConfig::ReadOnly, &Requester::Anonymous, Method::Get, None).is_ok());
        assert!(authorize(&policy(), &Requester::Anonymous, Method::Get, None).is_ok());
    }

    #[test]
    fn anonymous_writes_are_unauthorized() {
        assert!(matches!(
            authorize(&policy(), &Requester::Anonymous, Method::Post, None),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn owner_or_staff_may_change() {
        let row = owned_by(3);
        assert!(authorize(&policy(), &user(3, false), Method::Patch, Some(&row)).is_ok());
        assert!(authorize(&policy(), &user(5, true), Method::Delete, Some(&row)).is_ok());
        assert!(matches!(
            authorize(&policy(), &user(4, false), Method::Put, Some(&row)),
            Err(AppError::Forbidden(_))
        ));
        assert!(authorize(&policy(), &user(4, false), Method::Post, None).is_ok());
    }

    #[test]
    fn read_only_rejects_writes() {
        assert!(matches!(
            authorize(&AuthorizationConfig::ReadOnly, &user(1, true), Method::Post, None),
            Err(AppError::Forbidden(_))
        ));
    }
}
