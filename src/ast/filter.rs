//! Filter trees.
//!
//! A [`Filter`] serializes as a JSON object whose keys are column names (possibly dotted
//! `alias.column`), bare join aliases (existence checks) or the combinators `$or`, `$and`
//! and `$not`. Keys keep insertion order. Entries never overwrite each other: a key that
//! is already taken is pushed into the level's `$and` list instead.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;

use super::operators::Operator;

/// One key of an operator object.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Op(Operator, Value),
    Not(Predicate),
}

impl Term {
    pub fn key(&self) -> &'static str {
        match self {
            Term::Op(op, _) => op.key(),
            Term::Not(_) => "$not",
        }
    }
}

/// An operator object: `{ "$gte": 1, "$lte": 5 }`. All terms hold (AND).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    pub terms: Vec<Term>,
}

impl Predicate {
    pub fn op(operator: Operator, value: Value) -> Self {
        Self {
            terms: vec![Term::Op(operator, value)],
        }
    }

    /// Wrap into `{ "$not": self }`.
    pub fn negate(self) -> Self {
        Self {
            terms: vec![Term::Not(self)],
        }
    }

    fn has_key(&self, key: &str) -> bool {
        self.terms.iter().any(|t| t.key() == key)
    }

    /// Merge `other` into `self` when none of its keys are already taken.
    pub fn merge(&mut self, other: Predicate) -> Result<(), Predicate> {
        if other.terms.iter().any(|t| self.has_key(t.key())) {
            return Err(other);
        }
        self.terms.extend(other.terms);
        Ok(())
    }
}

impl Serialize for Predicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.terms.len()))?;
        for term in &self.terms {
            match term {
                Term::Op(op, value) => map.serialize_entry(op.key(), value)?,
                Term::Not(inner) => map.serialize_entry("$not", inner)?,
            }
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterEntry {
    /// Column (or dotted reference, or join alias) → operator object.
    Column { column: String, predicate: Predicate },
    Or(Vec<Filter>),
    And(Vec<Filter>),
    /// Negated compound; holds an `Or` or `And`.
    Not(Box<FilterEntry>),
}

impl FilterEntry {
    pub fn column(column: impl Into<String>, predicate: Predicate) -> Self {
        FilterEntry::Column {
            column: column.into(),
            predicate,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            FilterEntry::Column { column, .. } => column,
            FilterEntry::Or(_) => "$or",
            FilterEntry::And(_) => "$and",
            FilterEntry::Not(_) => "$not",
        }
    }
}

/// A filter object; entries are implicitly AND-ed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    entries: Vec<FilterEntry>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entry(entry: FilterEntry) -> Self {
        let mut filter = Self::new();
        filter.push(entry);
        filter
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    /// Add an entry with AND semantics.
    ///
    /// Predicates on the same column merge into one operator object when their operator
    /// keys are disjoint; anything that would collide lands in `$and`.
    pub fn push(&mut self, entry: FilterEntry) {
        let Some(pos) = self.entries.iter().position(|e| e.key() == entry.key()) else {
            self.entries.push(entry);
            return;
        };

        match entry {
            FilterEntry::Column { column, predicate } => {
                let rejected = match &mut self.entries[pos] {
                    FilterEntry::Column {
                        predicate: existing,
                        ..
                    } => existing.merge(predicate).err(),
                    _ => Some(predicate),
                };
                if let Some(predicate) = rejected {
                    self.push_and(Filter::from_entry(FilterEntry::Column { column, predicate }));
                }
            }
            FilterEntry::And(filters) => {
                if let FilterEntry::And(existing) = &mut self.entries[pos] {
                    existing.extend(filters);
                }
            }
            other => self.push_and(Filter::from_entry(other)),
        }
    }

    fn push_and(&mut self, filter: Filter) {
        for entry in self.entries.iter_mut() {
            if let FilterEntry::And(list) = entry {
                list.push(filter);
                return;
            }
        }
        self.entries.push(FilterEntry::And(vec![filter]));
    }

    /// Append every entry of `other`.
    pub fn extend(&mut self, other: Filter) {
        for entry in other.entries {
            self.push(entry);
        }
    }

    /// Visit every column key at any nesting depth.
    pub fn visit_columns<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        for entry in &self.entries {
            visit_entry(entry, f);
        }
    }

    /// Drop column entries rejected by `keep`, then any compound left empty.
    pub fn retain_columns(&mut self, keep: &mut impl FnMut(&str) -> bool) {
        self.entries.retain_mut(|entry| retain_entry(entry, keep));
    }
}

fn visit_entry<'a>(entry: &'a FilterEntry, f: &mut impl FnMut(&'a str)) {
    match entry {
        FilterEntry::Column { column, .. } => f(column),
        FilterEntry::Or(list) | FilterEntry::And(list) => {
            for filter in list {
                filter.visit_columns(f);
            }
        }
        FilterEntry::Not(inner) => visit_entry(inner, f),
    }
}

fn retain_entry(entry: &mut FilterEntry, keep: &mut impl FnMut(&str) -> bool) -> bool {
    match entry {
        FilterEntry::Column { column, .. } => keep(column),
        FilterEntry::Or(list) | FilterEntry::And(list) => {
            for filter in list.iter_mut() {
                filter.retain_columns(keep);
            }
            list.retain(|f| !f.is_empty());
            !list.is_empty()
        }
        FilterEntry::Not(inner) => retain_entry(inner, keep),
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            serialize_entry(&mut map, entry)?;
        }
        map.end()
    }
}

fn serialize_entry<M: SerializeMap>(map: &mut M, entry: &FilterEntry) -> Result<(), M::Error> {
    match entry {
        FilterEntry::Column { column, predicate } => map.serialize_entry(column, predicate),
        FilterEntry::Or(list) => map.serialize_entry("$or", list),
        FilterEntry::And(list) => map.serialize_entry("$and", list),
        FilterEntry::Not(inner) => map.serialize_entry("$not", &SingleEntry(inner)),
    }
}

struct SingleEntry<'a>(&'a FilterEntry);

impl Serialize for SingleEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        serialize_entry(&mut map, self.0)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn col(name: &str, op: Operator, value: Value) -> FilterEntry {
        FilterEntry::column(name, Predicate::op(op, value))
    }

    #[test]
    fn test_same_column_bounds_merge() {
        let mut filter = Filter::new();
        filter.push(col("price", Operator::Gte, json!(10)));
        filter.push(col("price", Operator::Lte, json!(20)));
        assert_eq!(filter.len(), 1);
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"price": {"$gte": 10, "$lte": 20}})
        );
    }

    #[test]
    fn test_colliding_operator_goes_to_and() {
        let mut filter = Filter::new();
        filter.push(col("tag", Operator::Neq, json!("a")));
        filter.push(col("tag", Operator::Neq, json!("b")));
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"tag": {"$neq": "a"}, "$and": [{"tag": {"$neq": "b"}}]})
        );
    }

    #[test]
    fn test_not_wraps_compound() {
        let inner = Filter::from_entry(col("a", Operator::Eq, json!(1)));
        let mut filter = Filter::new();
        filter.push(FilterEntry::Not(Box::new(FilterEntry::Or(vec![inner]))));
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"$not": {"$or": [{"a": {"$eq": 1}}]}})
        );
    }

    #[test]
    fn test_negated_predicate_merges_with_bound() {
        let mut filter = Filter::new();
        filter.push(FilterEntry::column(
            "age",
            Predicate::op(Operator::Eq, json!(30)).negate(),
        ));
        filter.push(col("age", Operator::Gt, json!(18)));
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"age": {"$not": {"$eq": 30}, "$gt": 18}})
        );
    }

    #[test]
    fn test_retain_columns_prunes_empty_groups() {
        let mut filter = Filter::new();
        filter.push(col("id", Operator::Eq, json!(1)));
        filter.push(FilterEntry::Or(vec![Filter::from_entry(col(
            "ghost.name",
            Operator::Eq,
            json!("x"),
        ))]));
        filter.retain_columns(&mut |c| !c.contains('.'));
        assert_eq!(serde_json::to_value(&filter).unwrap(), json!({"id": {"$eq": 1}}));
    }
}
