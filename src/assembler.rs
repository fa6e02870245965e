//! Combine resolver outputs into the final [`Ast`] and validate its structure.

use std::collections::HashSet;

use serde_json::Value;

use crate::ast::select::{find_embed_mut, JoinDef, JoinMap, SelectEntry, SelectTree};
use crate::ast::{Ast, Filter, Handling, Meta, OnConflict, OperationKind, OrderTerm};
use crate::error::{Stage, TranslateError, TranslateResult};
use crate::parser::Target;
use crate::resolver::filter::FilterOutput;
use crate::resolver::rpc::RpcOutput;
use crate::resolver::transform::TransformOutput;

/// Everything Phase 2 produced for one request.
#[derive(Debug)]
pub struct Parts {
    pub kind: OperationKind,
    pub target: Target,
    pub schema: Option<String>,
    pub select: Option<SelectTree>,
    pub filters: FilterOutput,
    pub transforms: TransformOutput,
    pub meta: Meta,
    pub rpc: Option<RpcOutput>,
    pub on_conflict: Option<OnConflict>,
    pub values: Option<Value>,
}

pub fn assemble(parts: Parts) -> TranslateResult<Ast> {
    let handling = parts.meta.handling;
    let Parts {
        kind,
        target,
        schema,
        select,
        filters,
        transforms,
        mut meta,
        rpc,
        on_conflict,
        values,
    } = parts;

    let (mut entries, mut joins, has_select) = match select {
        Some(tree) => (tree.entries, tree.joins, true),
        None => (Vec::new(), JoinMap::new(), false),
    };

    dedupe_aliases(&mut entries, handling)?;

    for (path, filter) in filters.embedded {
        let embed = find_embed_mut(&mut entries, &path).ok_or_else(|| missing_embed(&path))?;
        embed.filter.extend(filter);
    }
    for (path, transform) in transforms.embedded {
        let embed = find_embed_mut(&mut entries, &path).ok_or_else(|| missing_embed(&path))?;
        embed.order.extend(transform.order);
        embed.limit = transform.limit.or(embed.limit);
        embed.offset = transform.offset.or(embed.offset);
    }

    let mut filter = filters.root;
    let mut order = transforms.root.order;
    check_references(&mut filter, &mut order, &joins, handling)?;
    fill_joins(&mut entries, &mut joins);
    let group = derive_group(&entries);
    validate_levels(&mut entries, handling)?;

    let (from, function) = match target {
        Target::Table(name) => (Some(name), None),
        Target::Function(name) => (None, Some(name)),
    };
    let args = rpc.map(|rpc| {
        meta.call = Some(rpc.call);
        rpc.args
    });

    let ast = Ast {
        kind,
        from,
        function,
        schema,
        select: has_select.then_some(entries),
        join: joins,
        filter,
        group,
        order,
        limit: transforms.root.limit,
        offset: transforms.root.offset,
        values: if kind.is_write() { values } else { None },
        args,
        on_conflict,
        meta,
    };
    tracing::debug!(kind = %ast.kind, resource = ast.target(), "ast assembled");
    Ok(ast)
}

fn missing_embed(path: &str) -> TranslateError {
    TranslateError::validation(
        Stage::Assembler,
        format!("no embedded resource at '{}'", path),
    )
}

/// Aliases must be unique per select level; later duplicates are dropped when lenient.
fn dedupe_aliases(entries: &mut Vec<SelectEntry>, handling: Handling) -> TranslateResult<()> {
    let mut seen = HashSet::new();
    let mut keep = Vec::with_capacity(entries.len());
    for entry in entries.drain(..) {
        if let Some(alias) = entry.alias() {
            if !seen.insert(alias.to_string()) {
                handling.report(TranslateError::validation(
                    Stage::Assembler,
                    format!("duplicate alias '{}' in select", alias),
                ))?;
                continue;
            }
        }
        keep.push(entry);
    }
    *entries = keep;

    for entry in entries.iter_mut() {
        if let SelectEntry::Embed(embed) = entry {
            dedupe_aliases(&mut embed.select, handling)?;
        }
    }
    Ok(())
}

/// Dotted filter and order references must start with a join alias of their level.
fn check_references(
    filter: &mut Filter,
    order: &mut Vec<OrderTerm>,
    joins: &JoinMap,
    handling: Handling,
) -> TranslateResult<()> {
    let resolves = |column: &str| -> bool {
        match column.split_once('.') {
            Some((alias, _)) => joins.contains_key(alias),
            None => true,
        }
    };

    let mut dangling = Vec::new();
    filter.visit_columns(&mut |column| {
        if !resolves(column) {
            dangling.push(column.to_string());
        }
    });
    dangling.extend(
        order
            .iter()
            .filter(|t| !resolves(t.column.as_str()))
            .map(|t| t.column.clone()),
    );

    for column in &dangling {
        handling.report(TranslateError::validation(
            Stage::Assembler,
            format!("'{}' does not refer to an embedded resource", column),
        ))?;
    }
    if !dangling.is_empty() {
        filter.retain_columns(&mut |column| resolves(column));
        order.retain(|t| resolves(t.column.as_str()));
    }
    Ok(())
}

/// Every embed gets a join definition at its level, defaulting to a left join on the alias.
fn fill_joins(entries: &mut [SelectEntry], joins: &mut JoinMap) {
    for entry in entries.iter_mut() {
        if let SelectEntry::Embed(embed) = entry {
            joins
                .entry(embed.alias.clone())
                .or_insert_with(|| JoinDef::left(embed.alias.clone()));
            fill_joins(&mut embed.select, &mut embed.join);
        }
    }
}

fn validate_levels(entries: &mut [SelectEntry], handling: Handling) -> TranslateResult<()> {
    for entry in entries.iter_mut() {
        if let SelectEntry::Embed(embed) = entry {
            let mut filter = std::mem::take(&mut embed.filter);
            let mut order = std::mem::take(&mut embed.order);
            check_references(&mut filter, &mut order, &embed.join, handling)?;
            embed.filter = filter;
            embed.order = order;
            if embed.group.is_empty() {
                embed.group = derive_group(&embed.select);
            }
            validate_levels(&mut embed.select, handling)?;
        }
    }
    Ok(())
}

/// Grouping columns when aggregates and plain columns share a level.
fn derive_group(entries: &[SelectEntry]) -> Vec<String> {
    if !entries.iter().any(SelectEntry::is_aggregate) {
        return Vec::new();
    }
    let mut group: Vec<String> = Vec::new();
    for column in entries.iter().filter_map(SelectEntry::plain_column) {
        if !group.iter().any(|g| g == column) {
            group.push(column.to_string());
        }
    }
    group
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::filter::{FilterEntry, Predicate};
    use crate::ast::Operator;
    use crate::parser::select::parse_select;
    use crate::resolver::transform::Transform;
    use serde_json::json;

    fn parts(select: Option<&str>) -> Parts {
        Parts {
            kind: OperationKind::Query,
            target: Target::Table("products".into()),
            schema: None,
            select: select.map(|s| parse_select(s, 16).unwrap()),
            filters: FilterOutput::default(),
            transforms: TransformOutput::default(),
            meta: Meta {
                handling: Handling::Strict,
                ..Meta::default()
            },
            rpc: None,
            on_conflict: None,
            values: None,
        }
    }

    fn eq(column: &str, value: Value) -> FilterEntry {
        FilterEntry::column(column, Predicate::op(Operator::Eq, value))
    }

    #[test]
    fn test_absent_and_empty_select_differ() {
        let absent = assemble(parts(None)).unwrap();
        assert_eq!(absent.select, None);
        assert!(absent.to_json().get("select").is_none());

        let empty = assemble(parts(Some(""))).unwrap();
        assert_eq!(empty.select, Some(vec![]));
        assert_eq!(empty.to_json()["select"], json!([]));
    }

    #[test]
    fn test_embedded_where_and_transforms_are_merged() {
        let mut p = parts(Some("id,categories!inner(id,name)"));
        p.filters
            .embedded
            .insert("categories".into(), Filter::from_entry(eq("active", json!(true))));
        p.transforms.embedded.insert(
            "categories".into(),
            Transform {
                order: vec![OrderTerm::asc("name")],
                limit: Some(2),
                offset: None,
            },
        );
        let ast = assemble(p).unwrap();
        assert_eq!(
            ast.to_json()["select"],
            json!(["id", {"categories": {
                "select": ["id", "name"],
                "where": {"active": {"$eq": true}},
                "order": [{"column": "name", "direction": "asc"}],
                "limit": 2
            }}])
        );
        assert_eq!(ast.to_json()["join"], json!({"categories": {"table": "categories", "type": "inner"}}));
    }

    #[test]
    fn test_duplicate_alias() {
        assert!(assemble(parts(Some("id,id"))).is_err());
        assert!(assemble(parts(Some("a(x:id,x:name)"))).is_err());

        let mut p = parts(Some("id,name,id"));
        p.meta.handling = Handling::Lenient;
        let ast = assemble(p).unwrap();
        assert_eq!(ast.to_json()["select"], json!(["id", "name"]));
    }

    #[test]
    fn test_dotted_references_must_resolve() {
        let mut p = parts(Some("id,categories(name)"));
        p.filters.root.push(FilterEntry::Or(vec![
            Filter::from_entry(eq("categories.active", json!(true))),
            Filter::from_entry(eq("id", json!(1))),
        ]));
        assert!(assemble(p).is_ok());

        let mut p = parts(Some("id"));
        p.filters.root.push(eq("ghost.name", json!("x")));
        assert!(assemble(p).is_err());

        let mut p = parts(Some("id"));
        p.meta.handling = Handling::Lenient;
        p.filters.root.push(eq("ghost.name", json!("x")));
        p.transforms.root.order.push(OrderTerm::asc("ghost.rank"));
        let ast = assemble(p).unwrap();
        assert!(ast.filter.is_empty());
        assert!(ast.order.is_empty());
    }

    #[test]
    fn test_group_is_derived_per_level() {
        let ast = assemble(parts(Some(
            "category,total:price.sum(),stores(city,n:count())",
        )))
        .unwrap();
        assert_eq!(ast.group, vec!["category"]);
        match &ast.select.as_ref().unwrap()[2] {
            SelectEntry::Embed(stores) => assert_eq!(stores.group, vec!["city"]),
            other => panic!("expected embed, got {:?}", other),
        }

        let ast = assemble(parts(Some("count()"))).unwrap();
        assert!(ast.group.is_empty());
    }

    #[test]
    fn test_rpc_parts_land_in_args_and_meta() {
        let mut p = parts(None);
        p.kind = OperationKind::Rpc;
        p.target = Target::Function("search".into());
        p.rpc = Some(RpcOutput {
            args: json!({"term": "phone"}),
            call: crate::ast::CallInfo {
                method: crate::ast::CallMethod::Get,
                convention: crate::ast::Convention::Named,
            },
        });
        let json = assemble(p).unwrap().to_json();
        assert_eq!(json["type"], "rpc");
        assert_eq!(json["function"], "search");
        assert_eq!(json["args"], json!({"term": "phone"}));
        assert_eq!(json["$meta"]["call"], json!({"method": "get", "convention": "named"}));
    }
}
