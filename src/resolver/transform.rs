//! `order`, `limit` and `offset`, top-level and per embed.

use std::collections::BTreeMap;

use nom::{
    branch::alt,
    bytes::complete::take_till,
    character::complete::char,
    combinator::map,
    multi::many0,
    sequence::{delimited, pair, preceded},
    IResult,
};

use super::{Context, ParamKey, TransformField};
use crate::ast::values::split_top_level;
use crate::ast::{Direction, OrderTerm};
use crate::error::{Stage, TranslateError, TranslateResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transform {
    pub order: Vec<OrderTerm>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutput {
    pub root: Transform,
    pub embedded: BTreeMap<String, Transform>,
}

pub fn resolve(ctx: &Context<'_>) -> TranslateResult<TransformOutput> {
    let mut out = TransformOutput::default();

    for (key, value) in ctx.params.iter() {
        let ParamKey::Transform { path, field } = ParamKey::classify(key) else {
            continue;
        };
        let transform = match path {
            None => &mut out.root,
            Some(path) if ctx.embeds.contains(path) => {
                out.embedded.entry(path.to_string()).or_default()
            }
            Some(path) => {
                ctx.handling.report(TranslateError::validation(
                    Stage::Transform,
                    format!("'{}' refers to '{}', which is not embedded in select", key, path),
                ))?;
                continue;
            }
        };

        match field {
            TransformField::Order => {
                if let Some(terms) = ctx.handling.check(parse_order(value))? {
                    transform.order.extend(terms);
                }
            }
            TransformField::Limit => {
                if let Some(n) = ctx.handling.check(parse_count(key, value))? {
                    transform.limit = Some(n);
                }
            }
            TransformField::Offset => {
                if let Some(n) = ctx.handling.check(parse_count(key, value))? {
                    transform.offset = Some(n);
                }
            }
        }
    }

    Ok(out)
}

fn parse_count(key: &str, value: &str) -> TranslateResult<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        TranslateError::validation(
            Stage::Transform,
            format!("'{}' must be a non-negative integer, got '{}'", key, value),
        )
    })
}

/// `col[.asc|.desc][.nullsfirst|.nullslast]`, comma separated.
/// `alias(col)` names a column of a joined table and becomes `alias.col`.
pub fn parse_order(value: &str) -> TranslateResult<Vec<OrderTerm>> {
    if value.trim().is_empty() {
        return Ok(Vec::new());
    }
    let segments = split_top_level(value, ',').map_err(|e| {
        TranslateError::parse(Stage::Transform, format!("malformed order '{}': {}", value, e))
    })?;
    segments.into_iter().map(|s| order_term(s.trim())).collect()
}

/// A column name piece: anything up to `.`, `(` or `)`.
fn name(input: &str) -> IResult<&str, &str> {
    take_till(|c: char| matches!(c, '.' | '(' | ')'))(input)
}

/// `col` or `alias(col)`, the latter flattened to `alias.col`.
fn order_target(input: &str) -> IResult<&str, String> {
    alt((
        map(pair(name, delimited(char('('), name, char(')'))), |(alias, column)| {
            format!("{}.{}", alias, column)
        }),
        map(name, str::to_string),
    ))(input)
}

fn order_modifiers(input: &str) -> IResult<&str, Vec<&str>> {
    many0(preceded(char('.'), take_till(|c: char| c == '.')))(input)
}

fn order_term(segment: &str) -> TranslateResult<OrderTerm> {
    let malformed = |_| {
        TranslateError::parse(Stage::Transform, format!("malformed order term '{}'", segment))
    };
    let (rest, column) = order_target(segment).map_err(malformed)?;
    if rest.starts_with('(') {
        return Err(TranslateError::parse(
            Stage::Transform,
            format!("unclosed '(' in order '{}'", segment),
        ));
    }
    let (rest, modifiers) = order_modifiers(rest).map_err(malformed)?;
    if !rest.is_empty() {
        return Err(TranslateError::validation(
            Stage::Transform,
            format!("unexpected '{}' in order '{}'", rest, segment),
        ));
    }

    if column.is_empty() || column.starts_with('.') || column.ends_with('.') {
        return Err(TranslateError::validation(
            Stage::Transform,
            format!("order term '{}' names no column", segment),
        ));
    }

    let mut term = OrderTerm::asc(column);
    let mut seen_direction = false;
    for modifier in modifiers.into_iter().filter(|m| !m.is_empty()) {
        match modifier {
            "asc" | "desc" if !seen_direction && term.nulls_first.is_none() => {
                term.direction = if modifier == "asc" {
                    Direction::Asc
                } else {
                    Direction::Desc
                };
                seen_direction = true;
            }
            "nullsfirst" if term.nulls_first.is_none() => term.nulls_first = Some(true),
            "nullslast" if term.nulls_first.is_none() => term.nulls_first = Some(false),
            other => {
                return Err(TranslateError::validation(
                    Stage::Transform,
                    format!("unknown or misplaced order modifier '{}' in '{}'", other, segment),
                ));
            }
        }
    }
    Ok(term)
}
