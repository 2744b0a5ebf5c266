//! Runtime settings read from the environment.

use crate::error::ConfigError;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchBackend {
    Postgres,
    Memory,
}

impl FromStr for SearchBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(SearchBackend::Postgres),
            "memory" => Ok(SearchBackend::Memory),
            other => Err(format!("unknown search backend '{}'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    /// Page size when the request has no `limit`.
    pub limit_per_page: u32,
    /// Upper bound for `limit`; `limit=0` means this.
    pub max_limit: u32,
    pub search_backend: SearchBackend,
    pub body_limit_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "postgres://localhost/dataserver".into(),
            host: "0.0.0.0".into(),
            port: 8000,
            db_max_connections: 5,
            limit_per_page: 20,
            max_limit: 1000,
            search_backend: SearchBackend::Postgres,
            body_limit_bytes: 1024 * 1024,
        }
    }
}

impl Settings {
    /// Read settings from the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();
        let settings = Settings {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT", defaults.port)?,
            db_max_connections: parse(&lookup, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            limit_per_page: parse(&lookup, "API_LIMIT_PER_PAGE", defaults.limit_per_page)?,
            max_limit: parse(&lookup, "API_MAX_LIMIT", defaults.max_limit)?,
            search_backend: parse(&lookup, "SEARCH_BACKEND", defaults.search_backend)?,
            body_limit_bytes: parse(&lookup, "BODY_LIMIT_BYTES", defaults.body_limit_bytes)?,
        };
        if settings.max_limit == 0 {
            return Err(ConfigError::Env {
                key: "API_MAX_LIMIT",
                message: "must be greater than zero".into(),
            });
        }
        if settings.limit_per_page > settings.max_limit {
            return Err(ConfigError::Env {
                key: "API_LIMIT_PER_PAGE",
                message: format!("must not exceed API_MAX_LIMIT ({})", settings.max_limit),
            });
        }
        Ok(settings)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Env {
            key,
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = from(&[]).unwrap();
        assert_eq!(s.port, 8000);
        assert_eq!(s.limit_per_page, 20);
        assert_eq!(s.max_limit, 1000);
        assert_eq!(s.search_backend, SearchBackend::Postgres);
        assert_eq!(s.bind_addr(), "0.0.0.0:8000");
    }

    #[test]
    fn reads_overrides() {
        let s = from(&[("PORT", "9000"), ("SEARCH_BACKEND", "memory"), ("API_LIMIT_PER_PAGE", "5")]).unwrap();
        assert_eq!(s.port, 9000);
        assert_eq!(s.search_backend, SearchBackend::Memory);
        assert_eq!(s.limit_per_page, 5);
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(matches!(
            from(&[("PORT", "eighty")]),
            Err(ConfigError::Env { key: "PORT", .. })
        ));
        assert!(from(&[("SEARCH_BACKEND", "solr")]).is_err());
        assert!(from(&[("API_LIMIT_PER_PAGE", "2000")]).is_err());
    }
}
