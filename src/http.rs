//! REST wire helpers shared by the async and blocking HTTP backends.

use reqwest::{StatusCode, Url};

use crate::errors::{ApiFault, Fault};
use crate::types::RowQuery;

/// Header carrying the public key.
pub(crate) const API_KEY_HEADER: &str = "apikey";

pub(crate) const CLIENT_INFO_HEADER: &str = "X-Client-Info";

pub(crate) const OCTET_STREAM: &str = "application/octet-stream";

const REST_PREFIX: [&str; 2] = ["rest", "v1"];
const RPC_SEGMENT: &str = "rpc";
const STORAGE_PREFIX: [&str; 3] = ["storage", "v1", "object"];

fn endpoint<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> Url {
    let mut url = base.clone();
    url.set_query(None);
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    url
}

pub(crate) fn rpc_url(base: &Url, procedure: &str) -> Url {
    endpoint(base, REST_PREFIX.into_iter().chain([RPC_SEGMENT, procedure]))
}

pub(crate) fn rest_url(base: &Url, table: &str) -> Url {
    endpoint(base, REST_PREFIX.into_iter().chain([table]))
}

/// Storage URL for `key`; each `/`-separated part of the key becomes one
/// percent-encoded path segment.
pub(crate) fn storage_url(base: &Url, bucket: &str, key: &str) -> Url {
    endpoint(
        base,
        STORAGE_PREFIX
            .into_iter()
            .chain([bucket])
            .chain(key.split('/').filter(|s| !s.is_empty())),
    )
}

/// Query string pairs for a row fetch: `select=<cols>&<col>=eq.<value>`.
pub(crate) fn query_pairs(query: &RowQuery) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(query.filters.len() + 1);
    pairs.push(("select".to_string(), query.select.clone()));
    for filter in &query.filters {
        pairs.push((filter.column.clone(), format!("eq.{}", filter.value)));
    }
    pairs
}

/// Parses a non-2xx response body into a structured fault.
///
/// Error bodies look like `{"code": "P0001", "message": "...", "details": null, "hint": null}`.
/// Storage errors may use `error`/`statusCode` instead.
pub(crate) fn parse_fault(status: StatusCode, body: &str) -> Fault {
    let status_code = status.as_u16();
    let status_text = status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if value.is_object() {
            let code = value
                .get("code")
                .and_then(|v| match v {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty());
            let message = value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| status_text.clone());
            return Fault::Api(ApiFault {
                status: status_code,
                code,
                message,
            });
        }
    }

    let message = if body.trim().is_empty() {
        status_text
    } else {
        body.trim().to_string()
    };
    Fault::Api(ApiFault::new(status_code, message))
}

pub(crate) fn transport_fault(err: reqwest::Error) -> Fault {
    if err.is_decode() {
        Fault::Decode(err.to_string())
    } else {
        Fault::Transport(err.to_string())
    }
}

pub(crate) fn decode_fault(err: serde_json::Error) -> Fault {
    Fault::Decode(err.to_string())
}
