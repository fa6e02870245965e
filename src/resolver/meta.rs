//! `Prefer` tokens, the accept value and the method → `$meta`.

use std::collections::HashSet;
use std::sync::LazyLock;

use http::Method;

use super::Context;
use crate::ast::{
    Cardinality, CountMode, Explain, ExplainFormat, Handling, Meta, Missing, OperationKind,
    ReturnShape,
};
use crate::config::TranslatorConfig;
use crate::error::{Stage, TranslateError, TranslateResult};
use crate::parser::{HeaderInfo, Preference};

/// Every `Prefer` key the translator understands.
static PREFERENCE_KEYS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "count",
        "return",
        "missing",
        "handling",
        "tx",
        "max-affected",
        "timezone",
        "resolution",
        "params",
    ]
    .into_iter()
    .collect()
});

const OBJECT_MEDIA: [&str; 2] = ["application/vnd.pgrst.object", "application/vnd.pgrst.object+json"];
const ARRAY_MEDIA: [&str; 2] = ["application/vnd.pgrst.array", "application/vnd.pgrst.array+json"];
const DEFAULT_MEDIA: [&str; 3] = ["application/json", "application/*", "*/*"];
const PLAN_MEDIA: &str = "application/vnd.pgrst.plan";

/// Handling mode from `Prefer: handling=…`, falling back to the configured default.
///
/// Decided before any other resolver runs since all of them consult it.
pub fn resolve_handling(headers: &HeaderInfo, config: &TranslatorConfig) -> TranslateResult<Handling> {
    match headers.preference("handling") {
        None => Ok(config.default_handling),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "strict" => Ok(Handling::Strict),
            "lenient" => Ok(Handling::Lenient),
            _ => {
                config.default_handling.report(TranslateError::validation(
                    Stage::Meta,
                    format!("handling must be strict or lenient, got '{}'", value),
                ))?;
                Ok(config.default_handling)
            }
        },
    }
}

pub fn resolve(ctx: &Context<'_>, kind: OperationKind) -> TranslateResult<Meta> {
    let mut meta = Meta {
        handling: ctx.handling,
        head: ctx.method == Method::HEAD,
        ..Meta::default()
    };

    for pref in &ctx.headers.preferences {
        ctx.handling.check(apply_preference(&mut meta, pref))?;
    }

    if let Some(accept) = &ctx.headers.accept {
        ctx.handling.check(apply_accept(&mut meta, accept))?;
    }

    if let Some(columns) = ctx.params.last("columns") {
        if kind.is_insert_like() {
            meta.columns = Some(
                columns
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        } else {
            ctx.handling.report(TranslateError::validation(
                Stage::Meta,
                format!("'columns' only applies to inserts and upserts, not {}", kind),
            ))?;
        }
    }

    Ok(meta)
}

fn bad_value(pref: &Preference, expected: &str) -> TranslateError {
    TranslateError::validation(
        Stage::Meta,
        format!(
            "Prefer '{}' accepts {}, got '{}'",
            pref.key, expected, pref.value
        ),
    )
}

fn apply_preference(meta: &mut Meta, pref: &Preference) -> TranslateResult<()> {
    if !PREFERENCE_KEYS.contains(pref.key.as_str()) {
        return Err(TranslateError::validation(
            Stage::Meta,
            format!("unknown Prefer key '{}'", pref.key),
        ));
    }
    let value = pref.value.as_str();
    match pref.key.as_str() {
        "count" => {
            meta.count = Some(match value {
                "exact" => CountMode::Exact,
                "planned" => CountMode::Planned,
                "estimated" => CountMode::Estimated,
                _ => return Err(bad_value(pref, "exact, planned or estimated")),
            });
        }
        "return" => {
            meta.return_shape = Some(match value {
                "minimal" => ReturnShape::Minimal,
                "headers-only" => ReturnShape::HeadersOnly,
                "representation" => ReturnShape::Representation,
                _ => return Err(bad_value(pref, "minimal, headers-only or representation")),
            });
        }
        "missing" => {
            meta.missing = Some(match value {
                "default" => Missing::Default,
                "null" => Missing::Null,
                _ => return Err(bad_value(pref, "default or null")),
            });
        }
        "tx" => {
            meta.rollback = match value {
                "commit" => false,
                "rollback" => true,
                _ => return Err(bad_value(pref, "commit or rollback")),
            };
        }
        "max-affected" => {
            let n = value
                .parse::<u64>()
                .map_err(|_| bad_value(pref, "a non-negative integer"))?;
            meta.max_affected = Some(n);
        }
        "timezone" => {
            if value.is_empty() {
                return Err(bad_value(pref, "a time zone name"));
            }
            meta.timezone = Some(value.to_string());
        }
        // Resolved by the handling, operation, upsert and rpc resolvers.
        _ => {}
    }
    Ok(())
}

fn apply_accept(meta: &mut Meta, accept: &str) -> TranslateResult<()> {
    let Some(first) = accept.split(',').map(str::trim).find(|m| !m.is_empty()) else {
        return Ok(());
    };
    let mut parts = first.split(';').map(str::trim);
    let media = parts.next().unwrap_or_default().to_ascii_lowercase();
    let params: Vec<(String, String)> = parts
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().trim_matches('"').to_string()))
        .collect();

    if DEFAULT_MEDIA.contains(&media.as_str()) {
        return Ok(());
    }
    if OBJECT_MEDIA.contains(&media.as_str()) {
        meta.cardinality = Some(Cardinality::One);
        return Ok(());
    }
    if ARRAY_MEDIA.contains(&media.as_str()) {
        meta.cardinality = Some(Cardinality::Many);
        return Ok(());
    }
    if let Some(suffix) = media.strip_prefix(PLAN_MEDIA) {
        meta.explain = Some(explain(suffix, &params)?);
        return Ok(());
    }
    meta.accept = Some(media);
    Ok(())
}

fn explain(suffix: &str, params: &[(String, String)]) -> TranslateResult<Explain> {
    let mut explain = Explain {
        format: match suffix {
            "" | "+text" => ExplainFormat::Text,
            "+json" => ExplainFormat::Json,
            other => {
                return Err(TranslateError::validation(
                    Stage::Meta,
                    format!("unknown plan media type suffix '{}'", other),
                ));
            }
        },
        ..Explain::default()
    };

    for (key, value) in params {
        match key.as_str() {
            "for" => explain.for_media = Some(value.clone()),
            "format" => {
                explain.format = match value.as_str() {
                    "text" => ExplainFormat::Text,
                    "json" => ExplainFormat::Json,
                    _ => {
                        return Err(TranslateError::validation(
                            Stage::Meta,
                            format!("plan format must be text or json, got '{}'", value),
                        ));
                    }
                }
            }
            "options" => {
                for option in value.split('|').map(str::trim).filter(|o| !o.is_empty()) {
                    match option {
                        "analyze" => explain.analyze = true,
                        "verbose" => explain.verbose = true,
                        "settings" => explain.settings = true,
                        "buffers" => explain.buffers = true,
                        "wal" => explain.wal = true,
                        _ => {
                            return Err(TranslateError::validation(
                                Stage::Meta,
                                format!("unknown explain option '{}'", option),
                            ));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Ok(explain)
}
