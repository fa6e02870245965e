//! The operator catalog.
//!
//! A closed set: every operator the AST can carry, its `$key` spelling, the wire token it
//! is parsed from and the shape its value must have. Negation is not an operator; it is
//! expressed by wrapping a predicate in `$not`.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use nom::{
    bytes::complete::{tag, take_till},
    character::complete::{alpha1, char},
    combinator::{map, opt},
    sequence::delimited,
    IResult,
};
use serde_json::{Map, Value};

use super::values::{coerce_scalar, like_pattern, parse_list, unquote};

/// `(any)` / `(all)` wire suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    Any,
    All,
}

impl Quantifier {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "any" => Some(Quantifier::Any),
            "all" => Some(Quantifier::All),
            _ => None,
        }
    }
}

/// What an operator's value must look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// Single value, coerced to number/bool/null when it looks like one.
    Scalar,
    /// Array from a `(…)` or `{…}` list, elements coerced.
    List,
    /// Array of LIKE patterns.
    PatternList,
    /// Array of regular expressions.
    RegexList,
    /// `null`, `true`, `false` or `unknown`.
    TriState,
    /// LIKE pattern, `*` becomes `%`.
    Pattern,
    /// Regular expression, passed through.
    Regex,
    /// JSON document, brace array or opaque range literal.
    Containment,
    /// Range literal, passed through untouched.
    Range,
    /// Full-text query with optional configuration.
    TextSearch,
    /// Unparsed input kept under lenient handling.
    Raw,
}

impl fmt::Display for ValueShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueShape::Scalar => "scalar",
            ValueShape::List => "array",
            ValueShape::PatternList => "array of patterns",
            ValueShape::RegexList => "array of regexes",
            ValueShape::TriState => "null|true|false|unknown",
            ValueShape::Pattern => "pattern",
            ValueShape::Regex => "regex",
            ValueShape::Containment => "json|array|range",
            ValueShape::Range => "range",
            ValueShape::TextSearch => "{query, config?}",
            ValueShape::Raw => "string",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    EqAny,
    EqAll,
    NeqAny,
    NeqAll,
    GtAny,
    GtAll,
    GteAny,
    GteAll,
    LtAny,
    LtAll,
    LteAny,
    LteAll,
    In,
    Is,
    IsDistinct,
    Like,
    Ilike,
    LikeAny,
    LikeAll,
    IlikeAny,
    IlikeAll,
    Match,
    Imatch,
    MatchAny,
    MatchAll,
    ImatchAny,
    ImatchAll,
    Contains,
    ContainedBy,
    Overlaps,
    StrictlyLeft,
    StrictlyRight,
    NotExtendRight,
    NotExtendLeft,
    Adjacent,
    Fts,
    Plfts,
    Phfts,
    Wfts,
    Raw,
}

impl Operator {
    pub const ALL: [Operator; 46] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::EqAny,
        Operator::EqAll,
        Operator::NeqAny,
        Operator::NeqAll,
        Operator::GtAny,
        Operator::GtAll,
        Operator::GteAny,
        Operator::GteAll,
        Operator::LtAny,
        Operator::LtAll,
        Operator::LteAny,
        Operator::LteAll,
        Operator::In,
        Operator::Is,
        Operator::IsDistinct,
        Operator::Like,
        Operator::Ilike,
        Operator::LikeAny,
        Operator::LikeAll,
        Operator::IlikeAny,
        Operator::IlikeAll,
        Operator::Match,
        Operator::Imatch,
        Operator::MatchAny,
        Operator::MatchAll,
        Operator::ImatchAny,
        Operator::ImatchAll,
        Operator::Contains,
        Operator::ContainedBy,
        Operator::Overlaps,
        Operator::StrictlyLeft,
        Operator::StrictlyRight,
        Operator::NotExtendRight,
        Operator::NotExtendLeft,
        Operator::Adjacent,
        Operator::Fts,
        Operator::Plfts,
        Operator::Phfts,
        Operator::Wfts,
        Operator::Raw,
    ];

    /// AST key, e.g. `$likeAny`.
    pub fn key(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Neq => "$neq",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::EqAny => "$eqAny",
            Operator::EqAll => "$eqAll",
            Operator::NeqAny => "$neqAny",
            Operator::NeqAll => "$neqAll",
            Operator::GtAny => "$gtAny",
            Operator::GtAll => "$gtAll",
            Operator::GteAny => "$gteAny",
            Operator::GteAll => "$gteAll",
            Operator::LtAny => "$ltAny",
            Operator::LtAll => "$ltAll",
            Operator::LteAny => "$lteAny",
            Operator::LteAll => "$lteAll",
            Operator::In => "$in",
            Operator::Is => "$is",
            Operator::IsDistinct => "$isDistinct",
            Operator::Like => "$like",
            Operator::Ilike => "$ilike",
            Operator::LikeAny => "$likeAny",
            Operator::LikeAll => "$likeAll",
            Operator::IlikeAny => "$ilikeAny",
            Operator::IlikeAll => "$ilikeAll",
            Operator::Match => "$match",
            Operator::Imatch => "$imatch",
            Operator::MatchAny => "$matchAny",
            Operator::MatchAll => "$matchAll",
            Operator::ImatchAny => "$imatchAny",
            Operator::ImatchAll => "$imatchAll",
            Operator::Contains => "$contains",
            Operator::ContainedBy => "$containedBy",
            Operator::Overlaps => "$overlaps",
            Operator::StrictlyLeft => "$strictlyLeft",
            Operator::StrictlyRight => "$strictlyRight",
            Operator::NotExtendRight => "$notExtendRight",
            Operator::NotExtendLeft => "$notExtendLeft",
            Operator::Adjacent => "$adjacent",
            Operator::Fts => "$fts",
            Operator::Plfts => "$plfts",
            Operator::Phfts => "$phfts",
            Operator::Wfts => "$wfts",
            Operator::Raw => "$raw",
        }
    }

    /// Wire token and quantifier this operator is spelled with in a query string.
    pub fn wire(&self) -> Option<(&'static str, Option<Quantifier>)> {
        use Quantifier::{All, Any};
        let w = match self {
            Operator::Eq => ("eq", None),
            Operator::Neq => ("neq", None),
            Operator::Gt => ("gt", None),
            Operator::Gte => ("gte", None),
            Operator::Lt => ("lt", None),
            Operator::Lte => ("lte", None),
            Operator::EqAny => ("eq", Some(Any)),
            Operator::EqAll => ("eq", Some(All)),
            Operator::NeqAny => ("neq", Some(Any)),
            Operator::NeqAll => ("neq", Some(All)),
            Operator::GtAny => ("gt", Some(Any)),
            Operator::GtAll => ("gt", Some(All)),
            Operator::GteAny => ("gte", Some(Any)),
            Operator::GteAll => ("gte", Some(All)),
            Operator::LtAny => ("lt", Some(Any)),
            Operator::LtAll => ("lt", Some(All)),
            Operator::LteAny => ("lte", Some(Any)),
            Operator::LteAll => ("lte", Some(All)),
            Operator::In => ("in", None),
            Operator::Is => ("is", None),
            Operator::IsDistinct => ("isdistinct", None),
            Operator::Like => ("like", None),
            Operator::Ilike => ("ilike", None),
            Operator::LikeAny => ("like", Some(Any)),
            Operator::LikeAll => ("like", Some(All)),
            Operator::IlikeAny => ("ilike", Some(Any)),
            Operator::IlikeAll => ("ilike", Some(All)),
            Operator::Match => ("match", None),
            Operator::Imatch => ("imatch", None),
            Operator::MatchAny => ("match", Some(Any)),
            Operator::MatchAll => ("match", Some(All)),
            Operator::ImatchAny => ("imatch", Some(Any)),
            Operator::ImatchAll => ("imatch", Some(All)),
            Operator::Contains => ("cs", None),
            Operator::ContainedBy => ("cd", None),
            Operator::Overlaps => ("ov", None),
            Operator::StrictlyLeft => ("sl", None),
            Operator::StrictlyRight => ("sr", None),
            Operator::NotExtendRight => ("nxr", None),
            Operator::NotExtendLeft => ("nxl", None),
            Operator::Adjacent => ("adj", None),
            Operator::Fts => ("fts", None),
            Operator::Plfts => ("plfts", None),
            Operator::Phfts => ("phfts", None),
            Operator::Wfts => ("wfts", None),
            Operator::Raw => return None,
        };
        Some(w)
    }

    pub fn shape(&self) -> ValueShape {
        match self {
            Operator::Eq
            | Operator::Neq
            | Operator::Gt
            | Operator::Gte
            | Operator::Lt
            | Operator::Lte
            | Operator::IsDistinct => ValueShape::Scalar,
            Operator::EqAny
            | Operator::EqAll
            | Operator::NeqAny
            | Operator::NeqAll
            | Operator::GtAny
            | Operator::GtAll
            | Operator::GteAny
            | Operator::GteAll
            | Operator::LtAny
            | Operator::LtAll
            | Operator::LteAny
            | Operator::LteAll
            | Operator::In => ValueShape::List,
            Operator::Is => ValueShape::TriState,
            Operator::Like | Operator::Ilike => ValueShape::Pattern,
            Operator::LikeAny | Operator::LikeAll | Operator::IlikeAny | Operator::IlikeAll => {
                ValueShape::PatternList
            }
            Operator::Match | Operator::Imatch => ValueShape::Regex,
            Operator::MatchAny | Operator::MatchAll | Operator::ImatchAny | Operator::ImatchAll => {
                ValueShape::RegexList
            }
            Operator::Contains | Operator::ContainedBy | Operator::Overlaps => {
                ValueShape::Containment
            }
            Operator::StrictlyLeft
            | Operator::StrictlyRight
            | Operator::NotExtendRight
            | Operator::NotExtendLeft
            | Operator::Adjacent => ValueShape::Range,
            Operator::Fts | Operator::Plfts | Operator::Phfts | Operator::Wfts => {
                ValueShape::TextSearch
            }
            Operator::Raw => ValueShape::Raw,
        }
    }

    /// Full-text operators accept a `(config)` suffix instead of a quantifier.
    pub fn takes_config(&self) -> bool {
        self.shape() == ValueShape::TextSearch
    }

    /// Resolve a wire token with its optional quantifier.
    pub fn lookup(token: &str, quantifier: Option<Quantifier>) -> Option<Operator> {
        let entry = WIRE_TABLE.get(token)?;
        match quantifier {
            None => entry.base,
            Some(Quantifier::Any) => entry.any,
            Some(Quantifier::All) => entry.all,
        }
    }

    /// Whether `token` names any operator, quantified or not.
    pub fn is_wire_token(token: &str) -> bool {
        WIRE_TABLE.contains_key(token)
    }

    /// Validate and convert a raw wire value into the operator's value shape.
    pub fn parse_value(&self, raw: &str, config: Option<&str>) -> Result<Value, String> {
        match self.shape() {
            ValueShape::Scalar => {
                let (text, quoted) = unquote(raw);
                Ok(if quoted {
                    Value::String(text)
                } else {
                    coerce_scalar(&text)
                })
            }
            ValueShape::List | ValueShape::PatternList | ValueShape::RegexList => {
                let items = match parse_list(raw) {
                    Some(items) => items?,
                    None => {
                        return Err(format!(
                            "operator '{}' expects a list like (a,b) or {{a,b}}, got '{}'",
                            self.key(),
                            raw
                        ));
                    }
                };
                let values = items
                    .iter()
                    .map(|item| match self.shape() {
                        ValueShape::PatternList => Value::String(like_pattern(&item.text)),
                        ValueShape::RegexList => item.to_string_value(),
                        _ => item.to_value(),
                    })
                    .collect();
                Ok(Value::Array(values))
            }
            ValueShape::TriState => match raw.to_ascii_lowercase().as_str() {
                "null" => Ok(Value::Null),
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "unknown" => Ok(Value::String("unknown".to_string())),
                _ => Err(format!(
                    "operator '$is' accepts null, true, false or unknown, got '{}'",
                    raw
                )),
            },
            ValueShape::Pattern => Ok(Value::String(like_pattern(&unquote(raw).0))),
            ValueShape::Regex => Ok(Value::String(unquote(raw).0)),
            ValueShape::Containment => Ok(parse_containment(raw)),
            ValueShape::Range | ValueShape::Raw => Ok(Value::String(raw.to_string())),
            ValueShape::TextSearch => {
                let mut obj = Map::new();
                obj.insert("query".to_string(), Value::String(unquote(raw).0));
                if let Some(config) = config {
                    obj.insert("config".to_string(), Value::String(config.to_string()));
                }
                Ok(Value::Object(obj))
            }
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

fn parse_containment(raw: &str) -> Value {
    if raw.starts_with('[') || raw.starts_with('{') {
        if let Ok(json @ (Value::Array(_) | Value::Object(_))) = serde_json::from_str::<Value>(raw) {
            return json;
        }
    }
    if raw.starts_with('{') {
        if let Some(Ok(items)) = parse_list(raw) {
            return Value::Array(items.iter().map(|i| i.to_value()).collect());
        }
    }
    Value::String(raw.to_string())
}

/// Wire token → base operator plus its quantified variants.
#[derive(Debug, Clone, Copy, Default)]
struct WireEntry {
    base: Option<Operator>,
    any: Option<Operator>,
    all: Option<Operator>,
}

static WIRE_TABLE: LazyLock<HashMap<&'static str, WireEntry>> = LazyLock::new(|| {
    let mut table: HashMap<&'static str, WireEntry> = HashMap::new();
    for op in Operator::ALL {
        if let Some((token, quantifier)) = op.wire() {
            let entry = table.entry(token).or_default();
            match quantifier {
                None => entry.base = Some(op),
                Some(Quantifier::Any) => entry.any = Some(op),
                Some(Quantifier::All) => entry.all = Some(op),
            }
        }
    }
    table
});

/// A `[not.]op[(modifier)].value` expression split into its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorExpr<'a> {
    pub negated: bool,
    pub operator: Operator,
    pub config: Option<&'a str>,
    pub value: &'a str,
}

/// Why a value could not be read as an operator expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// No `op.` prefix, or the token is not in the catalog.
    Unknown(String),
    /// Known token with a modifier it does not accept.
    Modifier(String),
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprError::Unknown(token) => write!(f, "unknown operator '{}'", token),
            ExprError::Modifier(msg) => f.write_str(msg),
        }
    }
}

/// `not.` prefix.
fn negation(input: &str) -> IResult<&str, bool> {
    map(opt(tag("not.")), |not| not.is_some())(input)
}

/// `(modifier)` after an operator token.
fn modifier(input: &str) -> IResult<&str, &str> {
    delimited(char('('), take_till(|c: char| c == ')'), char(')'))(input)
}

/// Split `raw` into negation, operator and value.
pub fn split_operator_expr(raw: &str) -> Result<OperatorExpr<'_>, ExprError> {
    let unknown = |token: &str| ExprError::Unknown(token.to_string());

    let (rest, negated) = negation(raw).map_err(|_| unknown(raw))?;
    let (after, token) = alpha1::<_, nom::error::Error<&str>>(rest).map_err(|_| unknown(rest))?;
    let (after, modifier) = opt(modifier)(after).map_err(|_| unknown(token))?;
    if after.starts_with('(') {
        return Err(ExprError::Modifier(format!("unclosed modifier in '{}'", rest)));
    }
    let (value, _) = char::<_, nom::error::Error<&str>>('.')(after).map_err(|_| unknown(token))?;

    let base = Operator::lookup(token, None).ok_or_else(|| unknown(token))?;

    match modifier {
        None => Ok(OperatorExpr {
            negated,
            operator: base,
            config: None,
            value,
        }),
        Some(m) if base.takes_config() => Ok(OperatorExpr {
            negated,
            operator: base,
            config: Some(m),
            value,
        }),
        Some(m) => {
            let quantifier = Quantifier::parse(m).ok_or_else(|| {
                ExprError::Modifier(format!("unknown modifier '({})' on '{}'", m, token))
            })?;
            let operator = Operator::lookup(token, Some(quantifier)).ok_or_else(|| {
                ExprError::Modifier(format!("operator '{}' cannot be quantified", token))
            })?;
            Ok(OperatorExpr {
                negated,
                operator,
                config: None,
                value,
            })
        }
    }
}

/// Whether a query value reads as a filter (`op.rest`, `not.op.rest`, `op(any).rest`).
pub fn looks_like_filter(raw: &str) -> bool {
    split_operator_expr(raw).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_wire_form_round_trips_through_lookup() {
        for op in Operator::ALL {
            if let Some((token, quantifier)) = op.wire() {
                assert_eq!(Operator::lookup(token, quantifier), Some(op), "{}", op);
            }
        }
    }

    #[test]
    fn test_split_simple_and_negated() {
        let expr = split_operator_expr("eq.5").unwrap();
        assert_eq!(expr.operator, Operator::Eq);
        assert!(!expr.negated);
        assert_eq!(expr.value, "5");

        let expr = split_operator_expr("not.like.*phone*").unwrap();
        assert!(expr.negated);
        assert_eq!(expr.operator, Operator::Like);
        assert_eq!(expr.value, "*phone*");
    }

    #[test]
    fn test_split_quantified_and_config() {
        let expr = split_operator_expr("like(any).{a*,b*}").unwrap();
        assert_eq!(expr.operator, Operator::LikeAny);

        let expr = split_operator_expr("gte(all).{1,2}").unwrap();
        assert_eq!(expr.operator, Operator::GteAll);

        let expr = split_operator_expr("fts(english).cat.dog").unwrap();
        assert_eq!(expr.operator, Operator::Fts);
        assert_eq!(expr.config, Some("english"));
        assert_eq!(expr.value, "cat.dog");
    }

    #[test]
    fn test_split_rejects_unknown_and_bad_modifiers() {
        assert_eq!(
            split_operator_expr("phone"),
            Err(ExprError::Unknown("phone".into()))
        );
        assert_eq!(
            split_operator_expr("between.1"),
            Err(ExprError::Unknown("between".into()))
        );
        assert!(matches!(
            split_operator_expr("in(any).(1,2)"),
            Err(ExprError::Modifier(_))
        ));
        assert!(matches!(
            split_operator_expr("eq(some).1"),
            Err(ExprError::Modifier(_))
        ));
        assert!(matches!(
            split_operator_expr("like(any.{a*}"),
            Err(ExprError::Modifier(_))
        ));
        assert_eq!(
            split_operator_expr("2024.01"),
            Err(ExprError::Unknown("2024.01".into()))
        );
    }

    #[test]
    fn test_split_keeps_dots_in_value() {
        let expr = split_operator_expr("not.eq.v1.2.3").unwrap();
        assert!(expr.negated);
        assert_eq!(expr.operator, Operator::Eq);
        assert_eq!(expr.value, "v1.2.3");

        let expr = split_operator_expr("eq.").unwrap();
        assert_eq!(expr.value, "");
    }

    #[test]
    fn test_parse_values_by_shape() {
        assert_eq!(Operator::Eq.parse_value("10", None), Ok(json!(10)));
        assert_eq!(Operator::Eq.parse_value("\"10\"", None), Ok(json!("10")));
        assert_eq!(
            Operator::In.parse_value("(1,2,\"a,b\")", None),
            Ok(json!([1, 2, "a,b"]))
        );
        assert!(Operator::In.parse_value("1,2", None).is_err());
        assert_eq!(Operator::Is.parse_value("NULL", None), Ok(Value::Null));
        assert!(Operator::Is.parse_value("maybe", None).is_err());
        assert_eq!(Operator::Like.parse_value("*ph*", None), Ok(json!("%ph%")));
        assert_eq!(
            Operator::LikeAll.parse_value("{a*,*b}", None),
            Ok(json!(["a%", "%b"]))
        );
        assert_eq!(
            Operator::Contains.parse_value(r#"{"a":1}"#, None),
            Ok(json!({"a": 1}))
        );
        assert_eq!(
            Operator::Contains.parse_value("{1,2}", None),
            Ok(json!([1, 2]))
        );
        assert_eq!(
            Operator::Overlaps.parse_value("[2017-01-01,2017-06-30]", None),
            Ok(json!("[2017-01-01,2017-06-30]"))
        );
        assert_eq!(
            Operator::Adjacent.parse_value("(1,10)", None),
            Ok(json!("(1,10)"))
        );
        assert_eq!(
            Operator::Contains.parse_value("(1,5)", None),
            Ok(json!("(1,5)"))
        );
        assert_eq!(
            Operator::ContainedBy.parse_value("{}", None),
            Ok(json!({}))
        );
        assert_eq!(
            Operator::Wfts.parse_value("cat or dog", Some("french")),
            Ok(json!({"query": "cat or dog", "config": "french"}))
        );
    }

    #[test]
    fn test_looks_like_filter() {
        assert!(looks_like_filter("eq.active"));
        assert!(looks_like_filter("not.in.(1,2)"));
        assert!(looks_like_filter("ilike(all).{a,b}"));
        assert!(!looks_like_filter("phone"));
        assert!(!looks_like_filter("2024.01"));
    }
}
