//! Path → table or callable.

use percent_encoding::percent_decode_str;
use url::Url;

use crate::config::TranslatorConfig;
use crate::error::{Stage, TranslateError, TranslateResult};

/// What the path names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Table(String),
    Function(String),
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Table(name) | Target::Function(name) => name,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Target::Function(_))
    }
}

pub fn parse_route(url: &Url, config: &TranslatorConfig) -> TranslateResult<Target> {
    let path = strip_base(url.path(), &config.base_path)?;

    let segments = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(decode)
        .collect::<TranslateResult<Vec<_>>>()?;

    match segments.as_slice() {
        [only] if *only == config.rpc_prefix => Err(TranslateError::parse(
            Stage::Route,
            format!("'{}' path names no function", only),
        )),
        [table] => Ok(Target::Table(table.clone())),
        [prefix, function] if *prefix == config.rpc_prefix => Ok(Target::Function(function.clone())),
        [] => Err(TranslateError::parse(Stage::Route, "path names no table or function")),
        _ => Err(TranslateError::parse(
            Stage::Route,
            format!("unsupported path '{}'", url.path()),
        )),
    }
}

fn strip_base<'a>(path: &'a str, base: &str) -> TranslateResult<&'a str> {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return Ok(path);
    }
    match path.strip_prefix(base) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => Ok(rest),
        _ => Err(TranslateError::parse(
            Stage::Route,
            format!("path '{}' is outside '{}'", path, base),
        )),
    }
}

fn decode(segment: &str) -> TranslateResult<String> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| TranslateError::parse(Stage::Route, format!("path segment is not UTF-8: {}", e)))
}
