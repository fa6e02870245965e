//! Phase 2: resolvers over the Phase 1 outputs.
//!
//! Every resolver reads the same [`Context`] and returns its own slice of the AST; the
//! assembler combines them.

pub mod filter;
pub mod meta;
pub mod operation;
pub mod rpc;
pub mod transform;
pub mod upsert;

use std::collections::BTreeSet;

use http::Method;

use crate::ast::operators::looks_like_filter;
use crate::ast::Handling;
use crate::error::{TranslateError, TranslateResult};
use crate::parser::{HeaderInfo, Payload, QueryParams, Target};

/// Query keys consumed structurally, never as filters or arguments.
pub const RESERVED_KEYS: [&str; 3] = ["select", "columns", "on_conflict"];

impl Handling {
    /// Apply the handling mode to a result.
    ///
    /// Validation errors become `Ok(None)` under lenient handling and are logged; every
    /// other error passes through untouched.
    pub fn check<T>(self, result: TranslateResult<T>) -> TranslateResult<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err @ TranslateError::Validation { .. }) if self == Handling::Lenient => {
                tracing::warn!(stage = ?err.stage(), "{} (ignored, lenient handling)", err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Report a validation error that has no result to carry.
    pub fn report(self, err: TranslateError) -> TranslateResult<()> {
        self.check(Err::<(), _>(err)).map(|_| ())
    }
}

/// Shared, read-only input of every resolver.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub method: &'a Method,
    pub target: &'a Target,
    pub headers: &'a HeaderInfo,
    pub params: &'a QueryParams,
    /// Dotted alias paths of every embed in `select`.
    pub embeds: &'a BTreeSet<String>,
    pub payload: Option<&'a Payload>,
    pub handling: Handling,
}

impl Context<'_> {
    pub fn is_read(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    /// Query-string call of a callable: non-filter params become arguments.
    pub fn is_query_call(&self) -> bool {
        self.target.is_callable() && self.is_read()
    }

    /// Whether the param at `key` is an argument of a query-string call.
    pub fn is_argument(&self, key: &str, value: &str) -> bool {
        self.is_query_call()
            && matches!(ParamKey::classify(key), ParamKey::Column(_))
            && !looks_like_filter(value)
    }

    /// Longest embed path `p` such that `key` is `p.rest`.
    pub fn split_embed<'k>(&self, key: &'k str) -> (Option<&'k str>, &'k str) {
        let mut best = None;
        for (i, _) in key.match_indices('.') {
            if self.embeds.contains(&key[..i]) {
                best = Some(i);
            }
        }
        match best {
            Some(i) => (Some(&key[..i]), &key[i + 1..]),
            None => (None, key),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformField {
    Order,
    Limit,
    Offset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Or,
    And,
}

/// Syntactic role of a query key. Embed prefixes are not checked here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKey<'a> {
    Reserved,
    Transform {
        path: Option<&'a str>,
        field: TransformField,
    },
    Group {
        path: Option<&'a str>,
        negated: bool,
        kind: GroupKind,
    },
    Column(&'a str),
}

impl<'a> ParamKey<'a> {
    pub fn classify(key: &'a str) -> Self {
        if RESERVED_KEYS.contains(&key) {
            return ParamKey::Reserved;
        }

        let (path, last) = match key.rsplit_once('.') {
            Some((path, last)) => (Some(path), last),
            None => (None, key),
        };

        let field = match last {
            "order" => Some(TransformField::Order),
            "limit" => Some(TransformField::Limit),
            "offset" => Some(TransformField::Offset),
            _ => None,
        };
        if let Some(field) = field {
            return ParamKey::Transform { path, field };
        }

        let kind = match last {
            "or" => GroupKind::Or,
            "and" => GroupKind::And,
            _ => return ParamKey::Column(key),
        };
        let (path, negated) = match path {
            Some("not") => (None, true),
            Some(p) => match p.strip_suffix(".not") {
                Some(p) => (Some(p), true),
                None => (Some(p), false),
            },
            None => (None, false),
        };
        ParamKey::Group {
            path,
            negated,
            kind,
        }
    }
}
