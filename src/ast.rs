//! The engine-neutral AST produced for every request.
//!
//! Field names and `$operator` spellings are a wire contract: consumers read the AST as
//! JSON, so the serde attributes here are load-bearing.

pub mod filter;
pub mod meta;
pub mod operators;
pub mod select;
pub mod values;

use std::fmt;

use serde::Serialize;
use serde_json::Value;

pub use filter::{Filter, FilterEntry, Predicate, Term};
pub use meta::*;
pub use operators::{Operator, Quantifier, ValueShape};
pub use select::{
    Aggregate, EmbedEntry, FieldEntry, JoinDef, JoinMap, JoinType, PathKey, SelectEntry,
    SelectTree,
};

/// Kind of data operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Insert,
    Update,
    Delete,
    Upsert,
    Put,
    Rpc,
}

impl OperationKind {
    /// Operations whose payload becomes `values`.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            OperationKind::Insert | OperationKind::Update | OperationKind::Upsert | OperationKind::Put
        )
    }

    /// Operations that accept an explicit `columns` list.
    pub fn is_insert_like(&self) -> bool {
        matches!(self, OperationKind::Insert | OperationKind::Upsert)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Query => "query",
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Upsert => "upsert",
            OperationKind::Put => "put",
            OperationKind::Rpc => "rpc",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One `order` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTerm {
    pub column: String,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nulls_first: Option<bool>,
}

impl OrderTerm {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
            nulls_first: None,
        }
    }
}

/// Conflict handling for upserts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnConflict {
    pub columns: Vec<String>,
    pub ignore_duplicates: bool,
}

/// The root of a translated request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ast {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// `None` when the request carried no `select` parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<SelectEntry>>,
    #[serde(skip_serializing_if = "JoinMap::is_empty")]
    pub join: JoinMap,
    #[serde(rename = "where", skip_serializing_if = "Filter::is_empty")]
    pub filter: Filter,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<OrderTerm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_conflict: Option<OnConflict>,
    #[serde(rename = "$meta")]
    pub meta: Meta,
}

impl Ast {
    /// The AST as a JSON value.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Table or function this operation targets.
    pub fn target(&self) -> &str {
        self.from
            .as_deref()
            .or(self.function.as_deref())
            .unwrap_or_default()
    }
}
