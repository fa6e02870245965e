//! `select=` grammar.
//!
//! ```text
//! list      := node ("," node)*
//! node      := "*" | "..." field | alias ":" field | field
//! field     := ident modifier* "(" list? ")"                  -- embed
//!            | "count()" cast?                                 -- row count
//!            | ident path? cast? ("." agg "()" cast?)?         -- plain
//! modifier  := "!" ident                  -- inner | left | hint
//! path      := ("->" key)* ("->>" key)?
//! ```
//!
//! Errors carry the character offset where parsing stopped.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{anychar, char, digit1, multispace0, none_of},
    combinator::{opt, recognize},
    error::{ErrorKind, ParseError},
    multi::fold_many0,
    sequence::{delimited, pair, preceded},
    IResult,
};

use crate::ast::select::{
    Aggregate, EmbedEntry, FieldEntry, JoinDef, JoinType, PathKey, SelectEntry, SelectTree,
};
use crate::error::{TranslateError, TranslateResult};

/// Grammar error pointing at the remaining input.
#[derive(Debug, Clone, PartialEq)]
pub struct GrammarError<'a> {
    input: &'a str,
    message: String,
}

impl<'a> GrammarError<'a> {
    fn new(input: &'a str, message: impl Into<String>) -> Self {
        Self {
            input,
            message: message.into(),
        }
    }
}

impl<'a> ParseError<&'a str> for GrammarError<'a> {
    fn from_error_kind(input: &'a str, kind: ErrorKind) -> Self {
        Self::new(input, format!("unexpected input ({:?})", kind))
    }

    fn append(_: &'a str, _: ErrorKind, other: Self) -> Self {
        other
    }
}

type PResult<'a, T> = IResult<&'a str, T, GrammarError<'a>>;

fn fail<T>(input: &str, message: impl Into<String>) -> PResult<'_, T> {
    Err(nom::Err::Failure(GrammarError::new(input, message)))
}

/// Parse a complete `select` value.
pub fn parse_select(input: &str, max_depth: usize) -> TranslateResult<SelectTree> {
    match select_list(input, 0, max_depth) {
        Ok((rest, tree)) => {
            let rest = rest.trim_start();
            if rest.is_empty() {
                Ok(tree)
            } else {
                Err(TranslateError::syntax(
                    char_offset(input, rest),
                    format!("unexpected '{}'", rest.chars().next().unwrap_or_default()),
                ))
            }
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(TranslateError::syntax(char_offset(input, e.input), e.message))
        }
        Err(nom::Err::Incomplete(_)) => Err(TranslateError::syntax(
            input.chars().count(),
            "unexpected end of input",
        )),
    }
}

fn char_offset(full: &str, rest: &str) -> usize {
    let consumed = full.len().saturating_sub(rest.len());
    full[..consumed].chars().count()
}

enum Node {
    Entry(SelectEntry),
    Embed(EmbedEntry, JoinDef),
}

fn select_list(input: &str, depth: usize, max_depth: usize) -> PResult<'_, SelectTree> {
    let (mut input, _) = multispace0(input)?;
    let mut tree = SelectTree::default();
    if input.is_empty() || input.starts_with(')') {
        return Ok((input, tree));
    }

    loop {
        let (rest, node) = select_node(input, depth, max_depth)?;
        match node {
            Node::Entry(entry) => tree.entries.push(entry),
            Node::Embed(embed, join) => {
                tree.joins.entry(embed.alias.clone()).or_insert(join);
                tree.entries.push(SelectEntry::Embed(embed));
            }
        }
        let (rest, _) = multispace0(rest)?;
        match opt(char(','))(rest)? {
            (next, Some(_)) => input = next,
            (rest, None) => return Ok((rest, tree)),
        }
    }
}

fn select_node(input: &str, depth: usize, max_depth: usize) -> PResult<'_, Node> {
    let (input, _) = multispace0(input)?;

    if let (rest, Some(_)) = opt(tag("..."))(input)? {
        let (rest, node) = aliased_field(rest, depth, max_depth)?;
        return match node {
            Node::Embed(mut embed, join) => {
                embed.spread = true;
                Ok((rest, Node::Embed(embed, join)))
            }
            Node::Entry(_) => fail(input, "'...' can only spread an embedded resource"),
        };
    }

    if let (rest, Some(_)) = opt(char('*'))(input)? {
        return Ok((rest, Node::Entry(SelectEntry::Wildcard)));
    }

    aliased_field(input, depth, max_depth)
}

fn aliased_field(input: &str, depth: usize, max_depth: usize) -> PResult<'_, Node> {
    let (after, name) = identifier(input)?;
    if after.starts_with(':') && !after.starts_with("::") {
        let (rest, _) = multispace0(&after[1..])?;
        return field(rest, Some(name), depth, max_depth);
    }
    field(input, None, depth, max_depth)
}

fn field(input: &str, alias: Option<String>, depth: usize, max_depth: usize) -> PResult<'_, Node> {
    let (rest, name) = identifier(input)?;

    if name == "count" {
        if let (rest, Some(_)) = opt(tag("()"))(rest)? {
            let (rest, cast) = opt(cast)(rest)?;
            let mut entry = FieldEntry::row_count();
            entry.cast = cast;
            if let Some(alias) = alias {
                entry.alias = alias;
            }
            return Ok((rest, Node::Entry(SelectEntry::Field(entry))));
        }
    }

    if rest.starts_with('!') || rest.starts_with('(') {
        return embed(rest, name, alias, depth, max_depth);
    }

    plain_field(rest, name, alias)
}

fn embed(
    input: &str,
    table: String,
    alias: Option<String>,
    depth: usize,
    max_depth: usize,
) -> PResult<'_, Node> {
    let mut join_type = None;
    let mut hint = None;
    let mut input = input;

    while let (rest, Some(_)) = opt(char('!'))(input)? {
        let (rest, modifier) = identifier(rest)?;
        match modifier.as_str() {
            "inner" | "left" => {
                if join_type.is_some() {
                    return fail(input, "join type given twice");
                }
                join_type = Some(if modifier == "inner" {
                    JoinType::Inner
                } else {
                    JoinType::Left
                });
            }
            _ => {
                if hint.is_some() {
                    return fail(input, "only one disambiguation hint is allowed");
                }
                hint = Some(modifier);
            }
        }
        input = rest;
    }

    let Ok((rest, _)) = char::<_, GrammarError>('(')(input) else {
        return fail(input, "expected '(' after embedded resource");
    };
    if depth + 1 > max_depth {
        return fail(input, format!("embedding is nested deeper than {} levels", max_depth));
    }

    let (rest, nested) = select_list(rest, depth + 1, max_depth)?;
    let (rest, _) = multispace0(rest)?;
    let Ok((rest, _)) = char::<_, GrammarError>(')')(rest) else {
        return fail(rest, "expected ',' or ')'");
    };

    let join = JoinDef {
        table: table.clone(),
        join_type: join_type.unwrap_or_default(),
        hint,
    };
    let embed = EmbedEntry {
        alias: alias.unwrap_or(table),
        select: nested.entries,
        join: nested.joins,
        ..Default::default()
    };
    Ok((rest, Node::Embed(embed, join)))
}

fn plain_field(input: &str, column: String, alias: Option<String>) -> PResult<'_, Node> {
    let (input, (path, path_as_text)) = json_path(input)?;
    let (input, first_cast) = opt(cast)(input)?;
    let (input, aggregate) = aggregate(input)?;
    let (input, second_cast) = match aggregate {
        Some(_) => opt(cast)(input)?,
        None => (input, None),
    };

    let (pre_cast, cast) = match aggregate {
        Some(_) => (first_cast, second_cast),
        None => (None, first_cast),
    };

    let mut field = FieldEntry {
        alias: String::new(),
        column: Some(column.clone()),
        path,
        path_as_text,
        pre_cast,
        aggregate,
        cast,
    };
    field.alias = alias.unwrap_or_else(|| field.default_alias());

    let plain = field.path.is_empty()
        && field.cast.is_none()
        && field.aggregate.is_none()
        && field.alias == column;
    let entry = if plain {
        SelectEntry::Column(column)
    } else {
        SelectEntry::Field(field)
    };
    Ok((input, Node::Entry(entry)))
}

fn json_path(input: &str) -> PResult<'_, (Vec<PathKey>, bool)> {
    let mut path = Vec::new();
    let mut input = input;
    loop {
        match opt(alt((tag("->>"), tag("->"))))(input)? {
            (rest, Some("->>")) => {
                let (rest, key) = path_key(rest)?;
                path.push(key);
                if rest.starts_with("->") {
                    return fail(rest, "'->>' must be the last JSON accessor");
                }
                return Ok((rest, (path, true)));
            }
            (rest, Some(_)) => {
                let (rest, key) = path_key(rest)?;
                path.push(key);
                input = rest;
            }
            (rest, None) => return Ok((rest, (path, false))),
        }
    }
}

fn path_key(input: &str) -> PResult<'_, PathKey> {
    if let Ok((rest, digits)) = recognize::<_, _, GrammarError, _>(pair(opt(char('-')), digit1))(input) {
        if let Ok(index) = digits.parse::<i64>() {
            return Ok((rest, PathKey::Index(index)));
        }
    }
    match identifier(input) {
        Ok((rest, key)) => Ok((rest, PathKey::Key(key))),
        Err(_) => fail(input, "expected a JSON key or array index"),
    }
}

fn cast(input: &str) -> PResult<'_, String> {
    let (input, _) = tag("::")(input)?;
    let (input, name) = recognize::<_, _, GrammarError, _>(pair(
        take_while1(|c: char| c.is_alphanumeric() || c == '_'),
        opt(tag("[]")),
    ))(input)
    .or_else(|_| fail(input, "expected a type name after '::'"))?;
    Ok((input, name.to_string()))
}

fn aggregate(input: &str) -> PResult<'_, Option<Aggregate>> {
    let (rest, Some(_)) = opt(char('.'))(input)? else {
        return Ok((input, None));
    };
    let (rest, name) = identifier(rest)?;
    let Ok((after, _)) = tag::<_, _, GrammarError>("()")(rest) else {
        return fail(rest, "expected '()' after aggregate function");
    };
    match Aggregate::parse(&name) {
        Some(agg) => Ok((after, Some(agg))),
        None => fail(input, format!("unknown aggregate function '{}'", name)),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn identifier(input: &str) -> PResult<'_, String> {
    if input.starts_with('"') {
        return quoted_identifier(input);
    }
    match take_while1::<_, _, GrammarError>(is_ident_char)(input) {
        Ok((rest, name)) => Ok((rest, name.to_string())),
        Err(_) => fail(input, "expected a field name"),
    }
}

/// `"..."` with backslash escapes.
fn quoted_identifier(input: &str) -> PResult<'_, String> {
    let body = fold_many0(
        alt((preceded(char('\\'), anychar), none_of("\\\""))),
        String::new,
        |mut out, c| {
            out.push(c);
            out
        },
    );
    match delimited(char::<_, GrammarError>('"'), body, char('"'))(input) {
        Ok((_, name)) if name.is_empty() => fail(input, "empty quoted identifier"),
        Ok((rest, name)) => Ok((rest, name)),
        Err(_) => fail(input, "unterminated quoted identifier"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::select::render_select;
    use crate::error::ErrorKind as TranslateErrorKind;

    fn parse(input: &str) -> SelectTree {
        parse_select(input, 16).unwrap()
    }

    fn field(entry: &SelectEntry) -> &FieldEntry {
        match entry {
            SelectEntry::Field(f) => f,
            other => panic!("expected a field, got {:?}", other),
        }
    }

    fn embed(entry: &SelectEntry) -> &EmbedEntry {
        match entry {
            SelectEntry::Embed(e) => e,
            other => panic!("expected an embed, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_columns_and_wildcard() {
        let tree = parse("id, name ,*");
        assert_eq!(
            tree.entries,
            vec![
                SelectEntry::Column("id".into()),
                SelectEntry::Column("name".into()),
                SelectEntry::Wildcard,
            ]
        );
        assert!(tree.joins.is_empty());
    }

    #[test]
    fn test_empty_select_is_empty_list() {
        assert!(parse("").entries.is_empty());
    }

    #[test]
    fn test_rename_and_cast() {
        let tree = parse("total:price::text,qty::int");
        let total = field(&tree.entries[0]);
        assert_eq!(total.alias, "total");
        assert_eq!(total.column.as_deref(), Some("price"));
        assert_eq!(total.cast.as_deref(), Some("text"));
        assert_eq!(total.pre_cast, None);

        let qty = field(&tree.entries[1]);
        assert_eq!(qty.alias, "qty");
        assert_eq!(qty.cast.as_deref(), Some("int"));
    }

    #[test]
    fn test_json_path() {
        let tree = parse("data->owner->>name,data->tags->0");
        let name = field(&tree.entries[0]);
        assert_eq!(name.alias, "name");
        assert_eq!(
            name.path,
            vec![PathKey::Key("owner".into()), PathKey::Key("name".into())]
        );
        assert!(name.path_as_text);

        let first = field(&tree.entries[1]);
        assert_eq!(first.path, vec![PathKey::Key("tags".into()), PathKey::Index(0)]);
        assert!(!first.path_as_text);
        assert_eq!(first.alias, "data");
    }

    #[test]
    fn test_text_accessor_must_be_last() {
        let err = parse_select("data->>a->b", 16).unwrap_err();
        assert_eq!(err.position(), Some(8));
    }

    #[test]
    fn test_aggregates() {
        let tree = parse("category,price.sum(),count(),n:id.count()");
        assert_eq!(tree.entries[0], SelectEntry::Column("category".into()));

        let sum = field(&tree.entries[1]);
        assert_eq!(sum.alias, "sum");
        assert_eq!(sum.aggregate, Some(Aggregate::Sum));

        let rows = field(&tree.entries[2]);
        assert_eq!(rows.column, None);
        assert_eq!(rows.aggregate, Some(Aggregate::Count));

        let n = field(&tree.entries[3]);
        assert_eq!(n.alias, "n");
        assert_eq!(n.column.as_deref(), Some("id"));
    }

    #[test]
    fn test_cast_ordering_around_aggregates() {
        // (input, pre_cast, aggregate, cast)
        let cases = [
            ("amount::numeric.sum()", Some("numeric"), Some(Aggregate::Sum), None),
            ("amount.sum()::text", None, Some(Aggregate::Sum), Some("text")),
            ("amount::numeric.avg()::int", Some("numeric"), Some(Aggregate::Avg), Some("int")),
            ("amount::int.min()::text", Some("int"), Some(Aggregate::Min), Some("text")),
            ("amount::int.max()", Some("int"), Some(Aggregate::Max), None),
            ("amount::text.count()::int", Some("text"), Some(Aggregate::Count), Some("int")),
            ("amount::text", None, None, Some("text")),
            ("count()::int", None, Some(Aggregate::Count), Some("int")),
        ];
        for (input, pre, agg, cast) in cases {
            let tree = parse(input);
            let f = field(&tree.entries[0]);
            assert_eq!(f.pre_cast.as_deref(), pre, "{}", input);
            assert_eq!(f.aggregate, agg, "{}", input);
            assert_eq!(f.cast.as_deref(), cast, "{}", input);
        }
    }

    #[test]
    fn test_unknown_aggregate_is_error() {
        let err = parse_select("price.median()", 16).unwrap_err();
        assert_eq!(err.kind(), TranslateErrorKind::Parse);
        assert_eq!(err.position(), Some(5));
    }

    #[test]
    fn test_embed_with_modifiers() {
        let tree = parse("id,categories!inner(id,name),owner:users!fk_owner(email),tags!fk_tag!left(*)");
        assert_eq!(tree.entries.len(), 4);

        let categories = embed(&tree.entries[1]);
        assert_eq!(categories.select.len(), 2);
        let join = &tree.joins["categories"];
        assert_eq!(join.table, "categories");
        assert_eq!(join.join_type, JoinType::Inner);

        let owner = embed(&tree.entries[2]);
        assert_eq!(owner.alias, "owner");
        let join = &tree.joins["owner"];
        assert_eq!(join.table, "users");
        assert_eq!(join.hint.as_deref(), Some("fk_owner"));
        assert_eq!(join.join_type, JoinType::Left);

        let join = &tree.joins["tags"];
        assert_eq!(join.hint.as_deref(), Some("fk_tag"));
    }

    #[test]
    fn test_nested_embeds_and_spread() {
        let tree = parse("title,actors(name,...agents(agency,films(title)))");
        let actors = embed(&tree.entries[1]);
        assert!(actors.join.contains_key("agents"));
        let agents = embed(&actors.select[1]);
        assert!(agents.spread);
        assert!(agents.join.contains_key("films"));

        let paths: Vec<String> = tree.embed_paths().into_iter().collect();
        assert_eq!(paths, vec!["actors", "actors.agents", "actors.agents.films"]);
    }

    #[test]
    fn test_spread_requires_embed() {
        let err = parse_select("...name", 16).unwrap_err();
        assert_eq!(err.position(), Some(0));
    }

    #[test]
    fn test_modifier_conflicts() {
        assert!(parse_select("a!inner!left(id)", 16).is_err());
        assert!(parse_select("a!h1!h2(id)", 16).is_err());
    }

    #[test]
    fn test_malformed_inputs_report_offsets() {
        let cases = [
            ("id,", 3),
            ("id,,name", 3),
            ("items(id", 8),
            ("items(id))", 9),
            ("id name", 3),
            ("a::", 3),
            ("\"open", 0),
            ("id,\"\"", 3),
            ("a::int[", 6),
        ];
        for (input, position) in cases {
            let err = parse_select(input, 16).unwrap_err();
            assert_eq!(err.position(), Some(position), "{}", input);
        }
    }

    #[test]
    fn test_depth_guard() {
        assert!(parse_select("a(b(c(id)))", 3).is_ok());
        let err = parse_select("a(b(c(d(id))))", 3).unwrap_err();
        assert_eq!(err.kind(), TranslateErrorKind::Parse);
    }

    #[test]
    fn test_quoted_identifiers() {
        let tree = parse(r#""first name","odd\"col":id"#);
        assert_eq!(tree.entries[0], SelectEntry::Column("first name".into()));
        assert_eq!(field(&tree.entries[1]).alias, "odd\"col");
    }

    #[test]
    fn test_top_level_segments_match_entry_count() {
        let inputs = [
            "*",
            "id,name",
            "id,categories!inner(id,name),tags(*)",
            "a:b::text,c->d->>e,count(),x.sum()::int",
            "...rel(a,b(c,d)),z",
            "id,empty()",
        ];
        for input in inputs {
            let segments = crate::ast::values::split_top_level(input, ',').unwrap();
            assert_eq!(parse(input).entries.len(), segments.len(), "{}", input);
        }
    }

    #[test]
    fn test_render_then_reparse_is_identity() {
        let inputs = [
            "id,name,*",
            "total:price::numeric.sum()::text,count(),n:count()",
            "data->owner->>name,data->tags->0,data->\"0\"",
            "id,cat:categories!fk_cat!inner(id,tags(name)),...owner:users(email)",
            "\"first name\",x:\"odd col\"::text",
        ];
        for input in inputs {
            let tree = parse(input);
            let rendered = render_select(&tree.entries, &tree.joins);
            let reparsed = parse(&rendered);
            assert_eq!(reparsed, tree, "{} -> {}", input, rendered);
        }
    }
}
