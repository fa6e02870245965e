//! Query params → `where` trees, top-level and per embed.

use std::collections::BTreeMap;

use nom::{
    bytes::complete::take_till,
    character::complete::char,
    sequence::terminated,
    IResult,
};
use serde_json::Value;

use super::{Context, GroupKind, ParamKey};
use crate::ast::filter::{Filter, FilterEntry, Predicate};
use crate::ast::operators::{split_operator_expr, ExprError, Operator, OperatorExpr};
use crate::ast::values::split_top_level;
use crate::error::{Stage, TranslateError, TranslateResult};

/// Nesting limit for `or(...)`/`and(...)` groups.
const MAX_GROUP_DEPTH: usize = 32;

/// Filters split by destination: the root and each embed path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutput {
    pub root: Filter,
    pub embedded: BTreeMap<String, Filter>,
}

impl FilterOutput {
    fn target(&mut self, path: Option<&str>) -> &mut Filter {
        match path {
            Some(path) => self.embedded.entry(path.to_string()).or_default(),
            None => &mut self.root,
        }
    }
}

pub fn resolve(ctx: &Context<'_>) -> TranslateResult<FilterOutput> {
    let mut out = FilterOutput::default();

    for (key, value) in ctx.params.iter() {
        if ctx.is_argument(key, value) {
            continue;
        }
        match ParamKey::classify(key) {
            ParamKey::Reserved | ParamKey::Transform { .. } => {}
            ParamKey::Group {
                path,
                negated,
                kind,
            } => {
                if let Some(path) = path {
                    if !ctx.embeds.contains(path) {
                        ctx.handling.report(TranslateError::validation(
                            Stage::Filter,
                            format!("'{}' refers to '{}', which is not embedded in select", key, path),
                        ))?;
                        continue;
                    }
                }
                let entry = group(ctx, path, kind, negated, value, 0)?;
                out.target(path).push(entry);
            }
            ParamKey::Column(key) => {
                let (path, column) = ctx.split_embed(key);
                if ctx.embeds.contains(key) {
                    if let Some(predicate) = existence_check(ctx, key, value)? {
                        out.target(path).push(FilterEntry::column(column, predicate));
                    }
                    continue;
                }
                let predicate = predicate(ctx, value)?;
                out.target(path).push(FilterEntry::column(column, predicate));
            }
        }
    }

    tracing::debug!(
        root = out.root.len(),
        embedded = out.embedded.len(),
        "filters resolved"
    );
    Ok(out)
}

/// `col=[not.]op.value` → operator object.
///
/// Under lenient handling an unreadable expression is kept verbatim as `$raw`.
fn predicate(ctx: &Context<'_>, raw: &str) -> TranslateResult<Predicate> {
    let expr = match split_operator_expr(raw) {
        Ok(expr) => expr,
        Err(err) => return raw_escape(ctx, raw, err.to_string()),
    };
    match value_of(&expr) {
        Ok(value) => {
            let predicate = Predicate::op(expr.operator, value);
            Ok(if expr.negated {
                predicate.negate()
            } else {
                predicate
            })
        }
        Err(err @ TranslateError::Validation { .. }) => raw_escape(ctx, raw, err.to_string()),
        Err(err) => Err(err),
    }
}

fn value_of(expr: &OperatorExpr<'_>) -> TranslateResult<Value> {
    expr.operator.parse_value(expr.value, expr.config).map_err(|msg| {
        if expr.value.starts_with('(') || expr.value.starts_with('{') {
            TranslateError::parse(Stage::Filter, msg)
        } else {
            TranslateError::validation(Stage::Filter, msg)
        }
    })
}

fn raw_escape(ctx: &Context<'_>, raw: &str, message: String) -> TranslateResult<Predicate> {
    ctx.handling
        .report(TranslateError::validation(Stage::Filter, message))?;
    Ok(Predicate::op(Operator::Raw, Value::String(raw.to_string())))
}

/// A bare join alias tests whether related rows exist.
fn existence_check(ctx: &Context<'_>, alias: &str, raw: &str) -> TranslateResult<Option<Predicate>> {
    let null_test = match split_operator_expr(raw) {
        Ok(expr) if expr.value.eq_ignore_ascii_case("null") => match (expr.operator, expr.negated) {
            (Operator::Is | Operator::Eq, false) | (Operator::Neq, true) => Some(Operator::Eq),
            (Operator::Is | Operator::Eq, true) | (Operator::Neq, false) => Some(Operator::Neq),
            _ => None,
        },
        _ => None,
    };
    match null_test {
        Some(op) => Ok(Some(Predicate::op(op, Value::Null))),
        None => {
            ctx.handling.report(TranslateError::validation(
                Stage::Filter,
                format!(
                    "'{}' is an embedded resource; only is.null and not.is.null apply to it, got '{}'",
                    alias, raw
                ),
            ))?;
            Ok(None)
        }
    }
}

/// `(cond,cond,...)` → `$or`/`$and`, optionally wrapped in `$not`.
///
/// `path` is the embed the group filters, `None` for the root.
fn group(
    ctx: &Context<'_>,
    path: Option<&str>,
    kind: GroupKind,
    negated: bool,
    raw: &str,
    depth: usize,
) -> TranslateResult<FilterEntry> {
    if depth >= MAX_GROUP_DEPTH {
        return Err(TranslateError::parse(
            Stage::Filter,
            format!("logical groups nested deeper than {}", MAX_GROUP_DEPTH),
        ));
    }
    let inner = raw
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| {
            TranslateError::parse(
                Stage::Filter,
                format!("logical group must be wrapped in parentheses: '{}'", raw),
            )
        })?;
    let parts = split_top_level(inner, ',').map_err(|e| {
        TranslateError::parse(Stage::Filter, format!("malformed logical group '{}': {}", raw, e))
    })?;

    let mut conditions = Vec::new();
    for part in parts.into_iter().map(str::trim) {
        if part.is_empty() {
            return Err(TranslateError::parse(
                Stage::Filter,
                format!("empty condition in '{}'", raw),
            ));
        }
        if let Some(entry) = condition(ctx, path, part, depth)? {
            conditions.push(Filter::from_entry(entry));
        }
    }

    let entry = match kind {
        GroupKind::Or => FilterEntry::Or(conditions),
        GroupKind::And => FilterEntry::And(conditions),
    };
    Ok(if negated {
        FilterEntry::Not(Box::new(entry))
    } else {
        entry
    })
}

/// One condition inside a group: a nested group or `column.[not.]op.value`.
fn condition(
    ctx: &Context<'_>,
    path: Option<&str>,
    raw: &str,
    depth: usize,
) -> TranslateResult<Option<FilterEntry>> {
    let (negated, rest) = match raw.strip_prefix("not.") {
        Some(rest) if rest.starts_with("or(") || rest.starts_with("and(") => (true, rest),
        _ => (false, raw),
    };
    if let Some(inner) = rest.strip_prefix("or") {
        if inner.starts_with('(') {
            return group(ctx, path, GroupKind::Or, negated, inner, depth + 1).map(Some);
        }
    }
    if let Some(inner) = rest.strip_prefix("and") {
        if inner.starts_with('(') {
            return group(ctx, path, GroupKind::And, negated, inner, depth + 1).map(Some);
        }
    }

    match split_condition(raw) {
        Ok((column, expr)) => {
            let embed = match path {
                Some(path) => format!("{}.{}", path, column),
                None => column.to_string(),
            };
            if ctx.embeds.contains(&embed) {
                let check = existence_check(ctx, column, expr)?;
                return Ok(check.map(|predicate| FilterEntry::column(column, predicate)));
            }
            let predicate = predicate(ctx, expr)?;
            Ok(Some(FilterEntry::column(column, predicate)))
        }
        Err(err) => {
            let (column, expr) = raw.split_once('.').unwrap_or((raw, ""));
            if column.is_empty() {
                return Err(TranslateError::parse(
                    Stage::Filter,
                    format!("condition '{}' names no column", raw),
                ));
            }
            ctx.handling.report(TranslateError::validation(
                Stage::Filter,
                format!("cannot read condition '{}': {}", raw, err),
            ))?;
            Ok(Some(FilterEntry::column(
                column,
                Predicate::op(Operator::Raw, Value::String(expr.to_string())),
            )))
        }
    }
}

/// The column ends at the first `.` after which a valid operator expression starts.
/// Dotted columns (`categories.active.eq.true`) are therefore kept whole.
fn split_condition(raw: &str) -> Result<(&str, &str), ExprError> {
    let mut last_err = ExprError::Unknown(raw.to_string());
    let mut rest = raw;
    while let Ok((expr, _)) = column_segment(rest) {
        rest = expr;
        let column = &raw[..raw.len() - expr.len() - 1];
        if column.is_empty() {
            continue;
        }
        match split_operator_expr(expr) {
            Ok(_) => return Ok((column, expr)),
            Err(err @ ExprError::Modifier(_)) => last_err = err,
            Err(_) => {}
        }
    }
    Err(last_err)
}

/// One dot-terminated piece of a column name.
fn column_segment(input: &str) -> IResult<&str, &str> {
    terminated(take_till(|c: char| c == '.'), char('.'))(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Handling;
    use crate::parser::{HeaderInfo, QueryParams, Target};
    use http::Method;
    use serde_json::json;
    use std::collections::BTreeSet;

    struct Fixture {
        method: Method,
        target: Target,
        headers: HeaderInfo,
        params: QueryParams,
        embeds: BTreeSet<String>,
    }

    impl Fixture {
        fn new(query: &str, embeds: &[&str]) -> Self {
            Self {
                method: Method::GET,
                target: Target::Table("products".into()),
                headers: HeaderInfo::default(),
                params: QueryParams::parse(Some(query)),
                embeds: embeds.iter().map(|s| s.to_string()).collect(),
            }
        }

        fn rpc(mut self) -> Self {
            self.target = Target::Function("search".into());
            self
        }

        fn resolve(&self, handling: Handling) -> TranslateResult<FilterOutput> {
            resolve(&Context {
                method: &self.method,
                target: &self.target,
                headers: &self.headers,
                params: &self.params,
                embeds: &self.embeds,
                payload: None,
                handling,
            })
        }
    }

    fn json(filter: &Filter) -> Value {
        serde_json::to_value(filter).unwrap()
    }

    #[test]
    fn test_bounds_on_one_column_merge() {
        let out = Fixture::new("price=gte.10&price=lte.20", &[])
            .resolve(Handling::Strict)
            .unwrap();
        assert_eq!(json(&out.root), json!({"price": {"$gte": 10, "$lte": 20}}));
    }

    #[test]
    fn test_not_prefix_folds_into_not() {
        let out = Fixture::new("status=not.eq.archived&id=not.in.(1,2)", &[])
            .resolve(Handling::Strict)
            .unwrap();
        assert_eq!(
            json(&out.root),
            json!({
                "status": {"$not": {"$eq": "archived"}},
                "id": {"$not": {"$in": [1, 2]}}
            })
        );
    }

    #[test]
    fn test_embedded_filters_are_routed() {
        let out = Fixture::new(
            "categories.active=eq.true&actors.films.year=gt.2000&name=ilike.*a*",
            &["categories", "actors", "actors.films"],
        )
        .resolve(Handling::Strict)
        .unwrap();
        assert_eq!(json(&out.root), json!({"name": {"$ilike": "%a%"}}));
        assert_eq!(
            json(&out.embedded["categories"]),
            json!({"active": {"$eq": true}})
        );
        assert_eq!(
            json(&out.embedded["actors.films"]),
            json!({"year": {"$gt": 2000}})
        );
    }

    #[test]
    fn test_join_alias_is_existence_check() {
        let out = Fixture::new(
            "categories=is.null&actors=not.is.null&actors.films=neq.null",
            &["categories", "actors", "actors.films"],
        )
        .resolve(Handling::Strict)
        .unwrap();
        assert_eq!(
            json(&out.root),
            json!({"categories": {"$eq": null}, "actors": {"$neq": null}})
        );
        assert_eq!(json(&out.embedded["actors"]), json!({"films": {"$neq": null}}));

        let err = Fixture::new("categories=eq.5", &["categories"])
            .resolve(Handling::Strict)
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Filter));

        let out = Fixture::new("categories=eq.5", &["categories"])
            .resolve(Handling::Lenient)
            .unwrap();
        assert!(out.root.is_empty());
    }

    #[test]
    fn test_logical_groups() {
        let out = Fixture::new(
            "or=(age.lt.18,and(age.gte.65,retired.is.true),name.not.like.A*)",
            &[],
        )
        .resolve(Handling::Strict)
        .unwrap();
        assert_eq!(
            json(&out.root),
            json!({"$or": [
                {"age": {"$lt": 18}},
                {"$and": [{"age": {"$gte": 65}}, {"retired": {"$is": true}}]},
                {"name": {"$not": {"$like": "A%"}}}
            ]})
        );
    }

    #[test]
    fn test_negated_and_embedded_groups() {
        let out = Fixture::new(
            "not.and=(a.eq.1,b.eq.2)&items.or=(qty.gt.5,categories.active.eq.true)",
            &["items"],
        )
        .resolve(Handling::Strict)
        .unwrap();
        assert_eq!(
            json(&out.root),
            json!({"$not": {"$and": [{"a": {"$eq": 1}}, {"b": {"$eq": 2}}]}})
        );
        assert_eq!(
            json(&out.embedded["items"]),
            json!({"$or": [{"qty": {"$gt": 5}}, {"categories.active": {"$eq": true}}]})
        );
    }

    #[test]
    fn test_join_alias_inside_group_is_existence_check() {
        let out = Fixture::new(
            "or=(reviews.is.null,id.eq.1)&authors.and=(books.not.is.null,name.eq.x)",
            &["reviews", "authors", "authors.books"],
        )
        .resolve(Handling::Strict)
        .unwrap();
        assert_eq!(
            json(&out.root),
            json!({"$or": [{"reviews": {"$eq": null}}, {"id": {"$eq": 1}}]})
        );
        assert_eq!(
            json(&out.embedded["authors"]),
            json!({"$and": [{"books": {"$neq": null}}, {"name": {"$eq": "x"}}]})
        );

        let err = Fixture::new("or=(reviews.eq.5,id.eq.1)", &["reviews"])
            .resolve(Handling::Strict)
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Filter));

        let out = Fixture::new("or=(reviews.eq.5,id.eq.1)", &["reviews"])
            .resolve(Handling::Lenient)
            .unwrap();
        assert_eq!(json(&out.root), json!({"$or": [{"id": {"$eq": 1}}]}));
    }

    #[test]
    fn test_group_into_unknown_embed() {
        let err = Fixture::new("ghost.or=(a.eq.1)", &[])
            .resolve(Handling::Strict)
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Filter));
    }

    #[test]
    fn test_malformed_groups_are_parse_errors_even_when_lenient() {
        for query in ["or=a.eq.1", "or=(a.eq.1,(b)", "or=(a.eq.1,)", "id=in.(1,2"] {
            let err = Fixture::new(query, &[]).resolve(Handling::Lenient).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Parse, "{}", query);
        }
    }

    #[test]
    fn test_unknown_operator_strict_vs_lenient() {
        let fixture = Fixture::new("price=between.1.5", &[]);
        let err = fixture.resolve(Handling::Strict).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);

        let out = fixture.resolve(Handling::Lenient).unwrap();
        assert_eq!(json(&out.root), json!({"price": {"$raw": "between.1.5"}}));
    }

    #[test]
    fn test_operator_catalog_values() {
        let out = Fixture::new(
            "tags=cs.{a,b}&during=ov.[2020-01-01,2020-02-01]&body=fts(english).cat&score=gt(any).{1,2}&flag=is.unknown",
            &[],
        )
        .resolve(Handling::Strict)
        .unwrap();
        assert_eq!(
            json(&out.root),
            json!({
                "tags": {"$contains": ["a", "b"]},
                "during": {"$overlaps": "[2020-01-01,2020-02-01]"},
                "body": {"$fts": {"query": "cat", "config": "english"}},
                "score": {"$gtAny": [1, 2]},
                "flag": {"$is": "unknown"}
            })
        );
    }

    #[test]
    fn test_query_call_skips_arguments() {
        let out = Fixture::new("term=phone&status=eq.active&limit=5", &[])
            .rpc()
            .resolve(Handling::Strict)
            .unwrap();
        assert_eq!(json(&out.root), json!({"status": {"$eq": "active"}}));
    }

    #[test]
    fn test_split_condition() {
        assert_eq!(split_condition("a.eq.1"), Ok(("a", "eq.1")));
        assert_eq!(
            split_condition("categories.active.eq.true"),
            Ok(("categories.active", "eq.true"))
        );
        assert_eq!(split_condition("price.gt.1.5"), Ok(("price", "gt.1.5")));
        assert_eq!(split_condition("age.not.eq.5"), Ok(("age", "not.eq.5")));
        assert!(split_condition("nothing").is_err());
    }
}
