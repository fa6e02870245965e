//! The `$meta` block: operation preferences that do not change what is selected.

use serde::{Deserialize, Serialize};

fn is_false(b: &bool) -> bool {
    !*b
}

/// Strict or lenient treatment of validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handling {
    Strict,
    #[default]
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountMode {
    Exact,
    Planned,
    Estimated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Cardinality {
    Many,
    One,
}

/// How columns absent from the payload are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Missing {
    Default,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReturnShape {
    Minimal,
    HeadersOnly,
    Representation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplainFormat {
    #[default]
    Text,
    Json,
}

/// Options carried by a plan media type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Explain {
    pub format: ExplainFormat,
    #[serde(rename = "for", skip_serializing_if = "Option::is_none")]
    pub for_media: Option<String>,
    pub analyze: bool,
    pub verbose: bool,
    pub settings: bool,
    pub buffers: bool,
    pub wal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallMethod {
    /// Arguments come from the query string.
    Get,
    /// Arguments come from the request body.
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Convention {
    Named,
    Positional,
    SingleObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallInfo {
    pub method: CallMethod,
    pub convention: Convention,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<CountMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<Cardinality>,
    pub handling: Handling,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Missing>,
    #[serde(rename = "return", skip_serializing_if = "Option::is_none")]
    pub return_shape: Option<ReturnShape>,
    #[serde(skip_serializing_if = "is_false")]
    pub rollback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_affected: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<Explain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub head: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<CallInfo>,
}
