//! Input checks for credentials, timing parameters, tags and file references.
//!
//! All functions are pure; they run before any network call is made.

use std::sync::OnceLock;

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use regex::Regex;
use reqwest::Url;
use serde_json::Value;

use crate::errors::{Error, Result};
use crate::{
    MAX_RETRY_DELAY_SECS, MAX_TAG_LENGTH, MAX_TIMEOUT_SECS, MIN_RETRY_DELAY_SECS,
    MIN_TIMEOUT_SECS,
};

pub(crate) const TIMEOUT_RANGE_MESSAGE: &str = "Timeout must be between 1 and 3600 seconds";
pub(crate) const RETRY_DELAY_RANGE_MESSAGE: &str = "Retry delay must be between 1 and 60 seconds";

fn uuid_v4_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
            .expect("uuid v4 pattern compiles")
    })
}

fn jwt_segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("base64url pattern compiles"))
}

/// Unpadded base64url; unused trailing bits in the last symbol are ignored.
const JWT_SEGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone),
);

fn is_base64url_segment(segment: &str) -> bool {
    jwt_segment_pattern().is_match(segment) && JWT_SEGMENT_ENGINE.decode(segment).is_ok()
}

/// Checks that a token looks like a JWT: exactly three non-empty segments
/// separated by `.`, each of which decodes as unpadded base64url. Surrounding
/// whitespace is ignored.
pub fn is_valid_jwt(token: &str) -> bool {
    let token = token.trim();
    if token.is_empty() {
        return false;
    }
    let segments: Vec<&str> = token.split('.').collect();
    segments.len() == 3 && segments.iter().all(|segment| is_base64url_segment(segment))
}

/// Checks for the canonical hyphenated UUID v4 form (case-insensitive).
pub fn is_valid_uuid_v4(value: &str) -> bool {
    uuid_v4_pattern().is_match(value)
}

/// Checks for an absolute `http`/`https` URL with a host.
pub fn is_valid_api_url(value: &str) -> bool {
    match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Validates the three client credentials.
///
/// Presence is checked for all three before any format check runs.
pub fn validate_credentials(
    public_key: Option<&str>,
    secret_key: Option<&str>,
    api_url: Option<&str>,
) -> Result<()> {
    let public_key = present(public_key).ok_or_else(|| Error::config("Public key is required"))?;
    let secret_key = present(secret_key).ok_or_else(|| Error::config("Secret key is required"))?;
    let api_url = present(api_url).ok_or_else(|| Error::config("API URL is required"))?;

    if !is_valid_jwt(public_key) {
        return Err(Error::config("Malformed public key"));
    }
    if !is_valid_uuid_v4(secret_key) {
        return Err(Error::config("Malformed secret key"));
    }
    if !is_valid_api_url(api_url) {
        return Err(Error::config("Malformed API URL"));
    }
    Ok(())
}

fn within(value: f64, min: f64, max: f64) -> bool {
    // NaN fails both comparisons.
    value >= min && value <= max
}

/// Validates the poll timeout and retry delay, both in seconds.
pub fn validate_timing(timeout: f64, retry_delay: f64) -> Result<()> {
    if !within(timeout, MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS) {
        return Err(Error::validation(TIMEOUT_RANGE_MESSAGE));
    }
    if !within(retry_delay, MIN_RETRY_DELAY_SECS, MAX_RETRY_DELAY_SECS) {
        return Err(Error::validation(RETRY_DELAY_RANGE_MESSAGE));
    }
    Ok(())
}

/// Like [`validate_timing`], for values read from a dynamic JSON document.
/// Anything that is not a JSON number is rejected rather than coerced.
pub fn validate_timing_value(timeout: &Value, retry_delay: &Value) -> Result<(f64, f64)> {
    let timeout = timeout
        .as_f64()
        .ok_or_else(|| Error::validation(TIMEOUT_RANGE_MESSAGE))?;
    let retry_delay = retry_delay
        .as_f64()
        .ok_or_else(|| Error::validation(RETRY_DELAY_RANGE_MESSAGE))?;
    validate_timing(timeout, retry_delay)?;
    Ok((timeout, retry_delay))
}

/// Enforces the per-key and per-value tag length limit.
pub fn validate_tag_lengths<'a, I>(tags: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let too_long = |s: &str| s.chars().count() > MAX_TAG_LENGTH;
    if tags
        .into_iter()
        .any(|(key, value)| too_long(key) || too_long(value))
    {
        return Err(Error::validation(
            "Tag keys and values must be <= 255 characters",
        ));
    }
    Ok(())
}

/// Validates a dynamic tag mapping. `None` and JSON `null` are treated as
/// empty. Every entry is type-checked before any length is checked.
pub fn validate_tags(tags: Option<&Value>) -> Result<()> {
    let map = match tags {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(Error::validation("Tags must be a dictionary")),
    };

    let mut pairs = Vec::with_capacity(map.len());
    for (key, value) in map {
        let Some(value) = value.as_str() else {
            return Err(Error::validation("Tag keys and values must be strings"));
        };
        pairs.push((key.as_str(), value));
    }
    validate_tag_lengths(pairs)
}

/// Validates a dynamic mapping of argument keys to local file paths.
///
/// Existence of the paths is checked later, when the files are staged.
pub fn validate_files(files: Option<&Value>) -> Result<()> {
    let map = match files {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(Error::validation("Files must be a dictionary")),
    };
    if map.values().any(|value| !value.is_string()) {
        return Err(Error::validation(
            "File values must be file paths (strings)",
        ));
    }
    Ok(())
}
