//! Limit/offset pagination and the `meta` block of list responses.

use crate::error::AppError;
use crate::settings::Settings;
use serde::Serialize;

/// Query parameters owned by the paginator; everything else is carried into next/previous links.
pub const PAGE_PARAMS: [&str; 2] = ["limit", "offset"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    /// Read `limit`/`offset` from query pairs. `limit=0` means the maximum.
    pub fn from_params(params: &[(String, String)], settings: &Settings) -> Result<Self, AppError> {
        let limit = match last_value(params, "limit") {
            None => settings.limit_per_page,
            Some(raw) => match parse_non_negative("limit", raw)? {
                0 => settings.max_limit,
                n => n.min(settings.max_limit),
            },
        };
        let offset = match last_value(params, "offset") {
            None => 0,
            Some(raw) => parse_non_negative("offset", raw)?,
        };
        Ok(Page { limit, offset })
    }
}

fn last_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn parse_non_negative(key: &str, raw: &str) -> Result<u32, AppError> {
    raw.trim().parse::<u32>().map_err(|_| {
        AppError::BadRequest(format!(
            "invalid {} '{}': must be a non-negative integer",
            key, raw
        ))
    })
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Meta {
    pub limit: u32,
    pub offset: u32,
    pub total_count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
}

impl Meta {
    /// Build `meta` for one page of `total` results under `base_uri`.
    pub fn new(base_uri: &str, params: &[(String, String)], page: Page, total: u64) -> Self {
        let end = page.offset as u64 + page.limit as u64;
        let next = if page.limit > 0 && end < total {
            Some(page_uri(base_uri, params, page.limit, page.offset + page.limit))
        } else {
            None
        };
        let previous = if page.offset > 0 {
            Some(page_uri(
                base_uri,
                params,
                page.limit,
                page.offset.saturating_sub(page.limit),
            ))
        } else {
            None
        };
        Meta {
            limit: page.limit,
            offset: page.offset,
            total_count: total,
            next,
            previous,
        }
    }
}

fn page_uri(base_uri: &str, params: &[(String, String)], limit: u32, offset: u32) -> String {
    let mut pairs: Vec<String> = params
        .iter()
        .filter(|(k, _)| !PAGE_PARAMS.contains(&k.as_str()))
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    pairs.push(format!("limit={}", limit));
    pairs.push(format!("offset={}", offset));
    format!("{}?{}", base_uri, pairs.join("&"))
}
