//! Select list and join definitions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::filter::Filter;
use super::OrderTerm;

/// Join type of an embedded relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Left,
    Inner,
}

/// A declared relationship. Joins never add output columns on their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinDef {
    pub table: String,
    #[serde(rename = "type")]
    pub join_type: JoinType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl JoinDef {
    pub fn left(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            join_type: JoinType::Left,
            hint: None,
        }
    }
}

/// Join definitions keyed by alias.
pub type JoinMap = BTreeMap<String, JoinDef>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl Aggregate {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(Aggregate::Sum),
            "avg" => Some(Aggregate::Avg),
            "min" => Some(Aggregate::Min),
            "max" => Some(Aggregate::Max),
            "count" => Some(Aggregate::Count),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Aggregate::Sum => "sum",
            Aggregate::Avg => "avg",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
            Aggregate::Count => "count",
        }
    }
}

/// One step of a JSON path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathKey {
    Key(String),
    Index(i64),
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A renamed, cast, JSON-path or aggregated column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldEntry {
    #[serde(skip)]
    pub alias: String,
    /// `None` only for a bare `count()`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathKey>,
    #[serde(skip_serializing_if = "is_false")]
    pub path_as_text: bool,
    /// Cast applied before the aggregate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_cast: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Aggregate>,
    /// Cast applied last (after the aggregate, if any).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cast: Option<String>,
}

impl FieldEntry {
    pub fn column(column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            alias: column.clone(),
            column: Some(column),
            path: Vec::new(),
            path_as_text: false,
            pre_cast: None,
            aggregate: None,
            cast: None,
        }
    }

    /// Row count: `count()` with no target column.
    pub fn row_count() -> Self {
        Self {
            alias: Aggregate::Count.name().to_string(),
            column: None,
            path: Vec::new(),
            path_as_text: false,
            pre_cast: None,
            aggregate: Some(Aggregate::Count),
            cast: None,
        }
    }

    /// The name this field gets when no alias is written.
    pub fn default_alias(&self) -> String {
        if let Some(agg) = self.aggregate {
            return agg.name().to_string();
        }
        match self.path.last() {
            Some(PathKey::Key(key)) => key.clone(),
            _ => self.column.clone().unwrap_or_default(),
        }
    }
}

/// A nested sub-query on a related table.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EmbedEntry {
    #[serde(skip)]
    pub alias: String,
    pub select: Vec<SelectEntry>,
    #[serde(rename = "where", skip_serializing_if = "Filter::is_empty")]
    pub filter: Filter,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<OrderTerm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub spread: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub join: JoinMap,
}

/// One entry of a select list.
///
/// Serialized as `"*"`, `"column"`, or a single-key object `{alias: {...}}`. An object
/// value is an embed exactly when it carries a nested `select`.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectEntry {
    Wildcard,
    Column(String),
    Field(FieldEntry),
    Embed(EmbedEntry),
}

impl SelectEntry {
    /// Output name of the entry; `None` for the wildcard.
    pub fn alias(&self) -> Option<&str> {
        match self {
            SelectEntry::Wildcard => None,
            SelectEntry::Column(name) => Some(name),
            SelectEntry::Field(field) => Some(&field.alias),
            SelectEntry::Embed(embed) => Some(&embed.alias),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, SelectEntry::Field(f) if f.aggregate.is_some())
    }

    /// Source column for a plain (non-aggregate, non-embed) entry.
    pub fn plain_column(&self) -> Option<&str> {
        match self {
            SelectEntry::Column(name) => Some(name),
            SelectEntry::Field(f) if f.aggregate.is_none() => f.column.as_deref(),
            _ => None,
        }
    }
}

impl Serialize for SelectEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SelectEntry::Wildcard => serializer.serialize_str("*"),
            SelectEntry::Column(name) => serializer.serialize_str(name),
            SelectEntry::Field(field) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(&field.alias, field)?;
                map.end()
            }
            SelectEntry::Embed(embed) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(&embed.alias, embed)?;
                map.end()
            }
        }
    }
}

/// Parsed `select` parameter: entries plus the joins their embeds declare.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectTree {
    pub entries: Vec<SelectEntry>,
    pub joins: JoinMap,
}

impl SelectTree {
    /// Dotted alias paths of every embed, at any depth (`"a"`, `"a.b"`).
    pub fn embed_paths(&self) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        collect_paths(&self.entries, "", &mut paths);
        paths
    }
}

fn collect_paths(entries: &[SelectEntry], prefix: &str, out: &mut BTreeSet<String>) {
    for entry in entries {
        if let SelectEntry::Embed(embed) = entry {
            let path = if prefix.is_empty() {
                embed.alias.clone()
            } else {
                format!("{}.{}", prefix, embed.alias)
            };
            collect_paths(&embed.select, &path, out);
            out.insert(path);
        }
    }
}

/// Find the embed at a dotted alias path.
pub fn find_embed_mut<'a>(entries: &'a mut [SelectEntry], path: &str) -> Option<&'a mut EmbedEntry> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let embed = entries.iter_mut().find_map(|entry| match entry {
        SelectEntry::Embed(embed) if embed.alias == head => Some(embed),
        _ => None,
    })?;
    match rest {
        Some(rest) => find_embed_mut(&mut embed.select, rest),
        None => Some(embed),
    }
}

/// Render entries back into `select=` syntax.
pub fn render_select(entries: &[SelectEntry], joins: &JoinMap) -> String {
    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        render_entry(entry, joins, &mut out);
    }
    out
}

fn render_entry(entry: &SelectEntry, joins: &JoinMap, out: &mut String) {
    match entry {
        SelectEntry::Wildcard => out.push('*'),
        SelectEntry::Column(name) => out.push_str(&Ident(name).to_string()),
        SelectEntry::Field(field) => render_field(field, out),
        SelectEntry::Embed(embed) => {
            let join = joins
                .get(&embed.alias)
                .cloned()
                .unwrap_or_else(|| JoinDef::left(embed.alias.clone()));
            if embed.spread {
                out.push_str("...");
            }
            if embed.alias != join.table {
                out.push_str(&format!("{}:", Ident(&embed.alias)));
            }
            out.push_str(&Ident(&join.table).to_string());
            if let Some(hint) = &join.hint {
                out.push_str(&format!("!{}", Ident(hint)));
            }
            if join.join_type == JoinType::Inner {
                out.push_str("!inner");
            }
            out.push('(');
            out.push_str(&render_select(&embed.select, &embed.join));
            out.push(')');
        }
    }
}

fn render_field(field: &FieldEntry, out: &mut String) {
    if field.alias != field.default_alias() {
        out.push_str(&format!("{}:", Ident(&field.alias)));
    }
    let Some(column) = &field.column else {
        out.push_str("count()");
        if let Some(cast) = &field.cast {
            out.push_str(&format!("::{}", cast));
        }
        return;
    };
    out.push_str(&Ident(column).to_string());
    let last = field.path.len().saturating_sub(1);
    for (i, key) in field.path.iter().enumerate() {
        out.push_str(if i == last && field.path_as_text { "->>" } else { "->" });
        match key {
            PathKey::Key(k) if k.parse::<i64>().is_ok() => out.push_str(&format!("\"{}\"", k)),
            PathKey::Key(k) => out.push_str(&Ident(k).to_string()),
            PathKey::Index(n) => out.push_str(&n.to_string()),
        }
    }
    if let Some(agg) = field.aggregate {
        if let Some(pre) = &field.pre_cast {
            out.push_str(&format!("::{}", pre));
        }
        out.push_str(&format!(".{}()", agg.name()));
    }
    if let Some(cast) = &field.cast {
        out.push_str(&format!("::{}", cast));
    }
}

/// Identifier, double-quoted when it is not a plain word.
struct Ident<'a>(&'a str);

impl fmt::Display for Ident<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plain = !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '$');
        if plain {
            f.write_str(self.0)
        } else {
            write!(f, "\"{}\"", self.0.replace('\\', "\\\\").replace('"', "\\\""))
        }
    }
}
