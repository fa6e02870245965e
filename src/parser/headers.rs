//! Schema profile, `Prefer` tokens, accept and content type.

use http::{HeaderMap, HeaderValue, Method};

use crate::config::TranslatorConfig;
use crate::error::{Stage, TranslateError, TranslateResult};

/// One `key=value` token of the `Prefer` header. The key is lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preference {
    pub key: String,
    pub value: String,
}

impl Preference {
    fn parse(token: &str) -> Self {
        let (key, value) = token.split_once('=').unwrap_or((token, ""));
        Self {
            key: key.trim().to_ascii_lowercase(),
            value: value.trim().trim_matches('"').to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderInfo {
    pub schema: Option<String>,
    pub preferences: Vec<Preference>,
    pub accept: Option<String>,
}

impl HeaderInfo {
    /// Last value given for a preference key.
    pub fn preference(&self, key: &str) -> Option<&str> {
        self.preferences
            .iter()
            .rev()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }
}

pub fn parse_headers(
    method: &Method,
    headers: &HeaderMap,
    config: &TranslatorConfig,
) -> TranslateResult<HeaderInfo> {
    let profile_header = if method == Method::GET || method == Method::HEAD {
        "accept-profile"
    } else {
        "content-profile"
    };
    let profile = single(headers, profile_header)?;
    let schema = resolve_schema(profile, config)?;

    let mut joined = Vec::new();
    for value in headers.get_all("prefer") {
        joined.push(text("prefer", value)?);
    }
    let preferences = joined
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(Preference::parse)
        .collect();

    Ok(HeaderInfo {
        schema,
        preferences,
        accept: single(headers, "accept")?,
    })
}

/// The `Content-Type` header, trimmed; `None` when absent or blank.
pub fn content_type(headers: &HeaderMap) -> TranslateResult<Option<String>> {
    single(headers, "content-type")
}

fn resolve_schema(profile: Option<String>, config: &TranslatorConfig) -> TranslateResult<Option<String>> {
    if config.schemas.is_empty() {
        return Ok(profile);
    }
    match profile {
        None => Ok(config.default_schema().map(str::to_string)),
        Some(schema) if config.schemas.contains(&schema) => Ok(Some(schema)),
        Some(schema) => Err(TranslateError::validation(
            Stage::Headers,
            format!(
                "schema '{}' is not one of: {}",
                schema,
                config.schemas.join(", ")
            ),
        )),
    }
}

fn single(headers: &HeaderMap, name: &str) -> TranslateResult<Option<String>> {
    headers
        .get(name)
        .map(|value| text(name, value).map(|s| s.trim().to_string()))
        .transpose()
        .map(|value| value.filter(|s| !s.is_empty()))
}

fn text<'a>(name: &str, value: &'a HeaderValue) -> TranslateResult<&'a str> {
    value
        .to_str()
        .map_err(|_| TranslateError::parse(Stage::Headers, format!("'{}' header is not visible ASCII", name)))
}
