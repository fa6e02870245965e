//! Wire-value helpers shared by the operator catalog and the resolvers.
//!
//! Everything here works on already percent-decoded query-string text.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{anychar, char, none_of},
    combinator::{all_consuming, recognize},
    error::{Error, ErrorKind},
    multi::{fold_many0, many0_count, separated_list0},
    sequence::{delimited, preceded},
    IResult,
};
use serde_json::{Number, Value};

/// One element of a parenthesized or brace-delimited list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub text: String,
    pub quoted: bool,
}

impl ListItem {
    /// Quoted items are always strings; bare items go through scalar coercion.
    pub fn to_value(&self) -> Value {
        if self.quoted {
            Value::String(self.text.clone())
        } else {
            coerce_scalar(&self.text)
        }
    }

    pub fn to_string_value(&self) -> Value {
        Value::String(self.text.clone())
    }
}

/// Coerce a bare scalar: `null`, booleans and canonical numbers become JSON values.
///
/// Only canonical numeric spellings are converted so that `007` or `1e5` keep their
/// text form.
pub fn coerce_scalar(raw: &str) -> Value {
    match raw {
        "null" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        if n.to_string() == raw {
            return Value::Number(n.into());
        }
    }
    if is_decimal(raw) {
        if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

fn is_decimal(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    let Some((int, frac)) = digits.split_once('.') else {
        return false;
    };
    !int.is_empty()
        && !frac.is_empty()
        && int.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit())
        && (int == "0" || !int.starts_with('0'))
}

/// Strip surrounding double quotes and resolve `\"` / `\\` escapes.
pub fn unquote(raw: &str) -> (String, bool) {
    match all_consuming(quoted)(raw) {
        Ok((_, text)) => (text, true),
        Err(_) => (raw.to_string(), false),
    }
}

/// Deepest `()`/`{}`/`[]` nesting accepted inside a value.
const MAX_NESTING: usize = 64;

const DELIMITERS: &str = "\"(){}[]";

/// `"..."` with backslash escapes resolved.
fn quoted(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        fold_many0(
            alt((preceded(char('\\'), anychar), none_of("\\\""))),
            String::new,
            |mut out, c| {
                out.push(c);
                out
            },
        ),
        char('"'),
    )(input)
}

/// A `(…)`, `{…}` or `[…]` group closed by its own delimiter.
fn nested(input: &str, depth: usize) -> IResult<&str, &str> {
    if depth > MAX_NESTING {
        return Err(nom::Err::Failure(Error::new(input, ErrorKind::TooLarge)));
    }
    let inner = |i| balanced(i, depth);
    recognize(alt((
        delimited(char('('), inner, char(')')),
        delimited(char('{'), inner, char('}')),
        delimited(char('['), inner, char(']')),
    )))(input)
}

/// Text whose delimiters pair up, possibly empty.
fn balanced(input: &str, depth: usize) -> IResult<&str, &str> {
    recognize(many0_count(alt((
        recognize(quoted),
        |i| nested(i, depth + 1),
        take_while1(|c: char| !DELIMITERS.contains(c)),
    ))))(input)
}

/// One `sep`-delimited piece at the current level.
fn segment(input: &str, sep: char, depth: usize) -> IResult<&str, &str> {
    recognize(many0_count(alt((
        recognize(quoted),
        |i| nested(i, depth + 1),
        take_while1(|c: char| c != sep && !DELIMITERS.contains(c)),
    ))))(input)
}

/// Describe where a delimited value stopped parsing.
fn stray(full: &str, rest: &str) -> String {
    match rest.chars().next() {
        None => "unexpected end of value".to_string(),
        Some('"') => "unterminated quoted value".to_string(),
        Some(open @ ('(' | '{' | '[')) => format!("missing closing for '{}'", open),
        Some(c) => format!("unbalanced '{}' at position {}", c, full.len() - rest.len()),
    }
}

fn nesting_error(err: nom::Err<Error<&str>>, full: &str) -> String {
    match err {
        nom::Err::Failure(_) => format!("delimiters nested deeper than {}", MAX_NESTING),
        nom::Err::Error(e) => stray(full, e.input),
        nom::Err::Incomplete(_) => stray(full, ""),
    }
}

/// Split `input` on `sep`, ignoring separators nested in `()`, `{}`, `[]` or double quotes.
///
/// Fails on unbalanced delimiters or an unterminated quote.
pub fn split_top_level(input: &str, sep: char) -> Result<Vec<&str>, String> {
    match separated_list0(char(sep), |i| segment(i, sep, 0))(input) {
        Ok(("", parts)) => Ok(parts),
        Ok((rest, _)) => Err(stray(input, rest)),
        Err(err) => Err(nesting_error(err, input)),
    }
}

/// Parse `(a,b,"c,d")` or `{a,b}` into its items. Returns `None` when `raw` is not
/// wrapped in matching list delimiters.
pub fn parse_list(raw: &str) -> Option<Result<Vec<ListItem>, String>> {
    let raw = raw.trim();
    let (open, close) = match raw.chars().next()? {
        '(' => ('(', ')'),
        '{' => ('{', '}'),
        _ => return None,
    };
    if raw.len() < 2 || !raw.ends_with(close) {
        return None;
    }

    let items = delimited(
        char(open),
        separated_list0(char(','), |i| segment(i, ',', 1)),
        char(close),
    )(raw);
    let parts = match items {
        Ok(("", parts)) => parts,
        Ok((rest, _)) => return Some(Err(stray(raw, rest))),
        Err(err) => return Some(Err(nesting_error(err, raw))),
    };
    if let [only] = parts.as_slice() {
        if only.trim().is_empty() {
            return Some(Ok(Vec::new()));
        }
    }

    Some(Ok(parts
        .into_iter()
        .map(|part| {
            let (text, quoted) = unquote(part.trim());
            ListItem { text, quoted }
        })
        .collect()))
}

/// Translate the wire wildcard `*` into the SQL pattern wildcard `%`.
pub fn like_pattern(raw: &str) -> String {
    raw.replace('*', "%")
}
