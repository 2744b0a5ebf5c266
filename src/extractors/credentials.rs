//! Extract credentials from the `Authorization` header or `username`/`api_key` query parameters.

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query},
    http::{header, request::Parts, HeaderMap, Uri},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Raw credentials as sent by the client. Nothing is verified here.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    Basic { username: String, password: String },
    ApiKey { username: String, key: String },
    /// Something was sent but could not be parsed.
    Malformed(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::None => write!(f, "None"),
            Credentials::Basic { username, .. } => write!(f, "Basic({})", username),
            Credentials::ApiKey { username, .. } => write!(f, "ApiKey({})", username),
            Credentials::Malformed(reason) => write!(f, "Malformed({})", reason),
        }
    }
}

impl Credentials {
    pub fn username(&self) -> Option<&str> {
        match self {
            Credentials::Basic { username, .. } | Credentials::ApiKey { username, .. } => Some(username),
            _ => None,
        }
    }

    pub fn from_request(headers: &HeaderMap, uri: &Uri) -> Self {
        if let Some(value) = headers.get(header::AUTHORIZATION) {
            return match value.to_str() {
                Ok(v) => parse_authorization(v.trim()),
                Err(_) => Credentials::Malformed("authorization header is not ASCII".into()),
            };
        }
        let params: Vec<(String, String)> = Query::try_from_uri(uri).map(|Query(p)| p).unwrap_or_default();
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        match (get("username"), get("api_key")) {
            (Some(username), Some(key)) => Credentials::ApiKey { username, key },
            (None, None) => Credentials::None,
            _ => Credentials::Malformed("username and api_key must be sent together".into()),
        }
    }
}

fn parse_authorization(value: &str) -> Credentials {
    let Some((scheme, rest)) = value.split_once(' ') else {
        return Credentials::Malformed("missing authorization scheme".into());
    };
    let rest = rest.trim();
    match scheme.to_ascii_lowercase().as_str() {
        "basic" => {
            let decoded = match STANDARD.decode(rest) {
                Ok(bytes) => bytes,
                Err(_) => return Credentials::Malformed("invalid base64 in basic credentials".into()),
            };
            let Ok(decoded) = String::from_utf8(decoded) else {
                return Credentials::Malformed("basic credentials are not UTF-8".into());
            };
            match decoded.split_once(':') {
                Some((username, password)) => Credentials::Basic {
                    username: username.to_string(),
                    password: password.to_string(),
                },
                None => Credentials::Malformed("basic credentials must be username:password".into()),
            }
        }
        "apikey" => match rest.split_once(':') {
            Some((username, key)) => Credentials::ApiKey {
                username: username.to_string(),
                key: key.to_string(),
            },
            None => Credentials::Malformed("api key credentials must be username:key".into()),
        },
        other => Credentials::Malformed(format!("unsupported authorization scheme '{}'", other)),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Credentials
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Credentials::from_request(&parts.headers, &parts.uri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_header(value: &str) -> Credentials {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        Credentials::from_request(&headers, &Uri::from_static("/api/v0/scout/map/"))
    }

    #[test]
    fn basic_header() {
        let encoded = STANDARD.encode("alice:s3cr:et");
        assert_eq!(
            with_header(&format!("Basic {}", encoded)),
            Credentials::Basic {
                username: "alice".into(),
                password: "s3cr:et".into()
            }
        );
        assert!(matches!(with_header("Basic !!!"), Credentials::Malformed(_)));
    }

    #[test]
    fn api_key_header_and_query() {
        assert_eq!(
            with_header("ApiKey bob:abc123"),
            Credentials::ApiKey {
                username: "bob".into(),
                key: "abc123".into()
            }
        );
        let uri = Uri::from_static("/api/v0/scout/map/?username=bob&api_key=abc123&limit=5");
        assert_eq!(
            Credentials::from_request(&HeaderMap::new(), &uri),
            Credentials::ApiKey {
                username: "bob".into(),
                key: "abc123".into()
            }
        );
    }

    #[test]
    fn missing_and_partial_credentials() {
        let uri = Uri::from_static("/api/v0/scout/map/?limit=5");
        assert_eq!(Credentials::from_request(&HeaderMap::new(), &uri), Credentials::None);
        let uri = Uri::from_static("/api/v0/scout/map/?username=bob");
        assert!(matches!(
            Credentials::from_request(&HeaderMap::new(), &uri),
            Credentials::Malformed(_)
        ));
        assert!(matches!(with_header("Bearer xyz"), Credentials::Malformed(_)));
    }

    #[test]
    fn debug_hides_secrets() {
        let c = Credentials::Basic {
            username: "alice".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", c).contains("hunter2"));
    }
}
