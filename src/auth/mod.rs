//! Authentication backends, authorization policies and password hashing.

mod authentication;
mod authorization;
pub mod password;

pub use authentication::authenticate;
pub use authorization::authorize;

use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Who is making the request, once authentication has run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Requester {
    Anonymous,
    User(User),
}

impl Requester {
    pub fn user(&self) -> Option<&User> {
        match self {
            Requester::User(u) => Some(u),
            Requester::Anonymous => None,
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user().map(|u| u.id)
    }

    pub fn is_admin(&self) -> bool {
        self.user().map_or(false, |u| u.is_staff || u.is_superuser)
    }

    /// Whether `owner` (a row's owner column) holds this user's id.
    pub fn owns(&self, owner: Option<&Value>) -> bool {
        match (self.user_id(), owner) {
            (Some(id), Some(Value::Number(n))) => n.as_i64() == Some(id),
            (Some(id), Some(Value::String(s))) => s.parse::<i64>().ok() == Some(id),
            _ => false,
        }
    }

    /// For access logs.
    pub fn label(&self) -> &str {
        match self {
            Requester::User(u) => &u.username,
            Requester::Anonymous => "anonymous",
        }
    }
}
