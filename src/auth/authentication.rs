//! Try each declared backend in order; the first that accepts the request wins.

use super::password::verify_password;
use super::{Requester, User};
use crate::config::{AuthBackend, Method};
use crate::error::AppError;
use crate::extractors::Credentials;
use sqlx::{PgPool, Row};

/// What one backend concluded about the request.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Accepted(Requester),
    Rejected,
}

/// Authenticate against the backends in order. All rejecting is a 401.
pub async fn authenticate(
    pool: &PgPool,
    backends: &[AuthBackend],
    method: Method,
    credentials: &Credentials,
) -> Result<Requester, AppError> {
    for backend in backends {
        if let Outcome::Accepted(requester) = try_backend(pool, *backend, method, credentials).await? {
            return Ok(requester);
        }
    }
    tracing::warn!(
        username = credentials.username().unwrap_or("-"),
        credentials = ?credentials,
        "authentication failed"
    );
    Err(AppError::Unauthorized(match credentials {
        Credentials::Malformed(reason) => reason.clone(),
        Credentials::None => "authentication required".into(),
        _ => "invalid credentials".into(),
    }))
}

async fn try_backend(
    pool: &PgPool,
    backend: AuthBackend,
    method: Method,
    credentials: &Credentials,
) -> Result<Outcome, AppError> {
    if let Some(outcome) = decide_without_db(backend, method, credentials) {
        return Ok(outcome);
    }
    let user = match (backend, credentials) {
        (AuthBackend::Basic, Credentials::Basic { username, password }) => {
            basic_user(pool, username, password).await?
        }
        (AuthBackend::ApiKey | AuthBackend::AnonymousApiKey, Credentials::ApiKey { username, key }) => {
            api_key_user(pool, username, key).await?
        }
        _ => None,
    };
    Ok(match user {
        Some(u) => Outcome::Accepted(Requester::User(u)),
        None => Outcome::Rejected,
    })
}

/// Outcomes that need no lookup: wrong credential kind, or an anonymous read.
fn decide_without_db(backend: AuthBackend, method: Method, credentials: &Credentials) -> Option<Outcome> {
    match (backend, credentials) {
        (AuthBackend::AnonymousApiKey, Credentials::None) if method == Method::Get => {
            Some(Outcome::Accepted(Requester::Anonymous))
        }
        (AuthBackend::Basic, Credentials::Basic { .. }) => None,
        (AuthBackend::ApiKey | AuthBackend::AnonymousApiKey, Credentials::ApiKey { .. }) => None,
        _ => Some(Outcome::Rejected),
    }
}

const USER_COLUMNS: &str = "u.\"id\", u.\"username\", u.\"password\", u.\"is_staff\", u.\"is_superuser\"";

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        is_staff: row.try_get("is_staff")?,
        is_superuser: row.try_get("is_superuser")?,
    })
}

async fn basic_user(pool: &PgPool, username: &str, password: &str) -> Result<Option<User>, AppError> {
    let sql = format!(
        "SELECT {} FROM \"account_user\" u WHERE u.\"username\" = $1 AND u.\"is_active\"",
        USER_COLUMNS
    );
    let Some(row) = sqlx::query(&sql).bind(username).fetch_optional(pool).await? else {
        return Ok(None);
    };
    let hash: Option<String> = row.try_get("password")?;
    match hash {
        Some(h) if verify_password(password, &h) => Ok(Some(user_from_row(&row)?)),
        _ => Ok(None),
    }
}

async fn api_key_user(pool: &PgPool, username: &str, key: &str) -> Result<Option<User>, AppError> {
    let sql = format!(
        "SELECT {} FROM \"account_user\" u JOIN \"account_apikey\" k ON k.\"user_id\" = u.\"id\" \
         WHERE u.\"username\" = $1 AND k.\"key\" = $2 AND u.\"is_active\"",
        USER_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(username)
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(match row {
        Some(r) => Some(user_from_row(&r)?),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_reads_only() {
        assert_eq!(
            decide_without_db(AuthBackend::AnonymousApiKey, Method::Get, &Credentials::None),
            Some(Outcome::Accepted(Requester::Anonymous))
        );
        assert_eq!(
            decide_without_db(AuthBackend::AnonymousApiKey, Method::Post, &Credentials::None),
            Some(Outcome::Rejected)
        );
        assert_eq!(
            decide_without_db(AuthBackend::ApiKey, Method::Get, &Credentials::None),
            Some(Outcome::Rejected)
        );
    }

    #[test]
    fn credential_kind_selects_backend() {
        let basic = Credentials::Basic {
            username: "a".into(),
            password: "b".into(),
        };
        assert_eq!(decide_without_db(AuthBackend::Basic, Method::Get, &basic), None);
        assert_eq!(
            decide_without_db(AuthBackend::ApiKey, Method::Get, &basic),
            Some(Outcome::Rejected)
        );
        assert_eq!(
            decide_without_db(AuthBackend::Basic, Method::Get, &Credentials::Malformed("x".into())),
            Some(Outcome::Rejected)
        );
    }
}
