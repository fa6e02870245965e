//! Method + target + `resolution` preference → operation kind.

use http::Method;

use super::Context;
use crate::ast::OperationKind;
use crate::error::{Stage, TranslateError, TranslateResult};
use crate::parser::Target;

/// Known values of `Prefer: resolution`.
pub const RESOLUTIONS: [&str; 2] = ["merge-duplicates", "ignore-duplicates"];

pub fn resolve(ctx: &Context<'_>) -> TranslateResult<OperationKind> {
    let method = ctx.method;
    let kind = match ctx.target {
        Target::Function(name) => {
            if method == Method::GET || method == Method::HEAD || method == Method::POST {
                OperationKind::Rpc
            } else {
                return Err(unsupported(method, &format!("function '{}'", name)));
            }
        }
        Target::Table(name) => match *method {
            Method::GET | Method::HEAD => OperationKind::Query,
            Method::POST => post_kind(ctx)?,
            Method::PATCH => OperationKind::Update,
            Method::PUT => OperationKind::Put,
            Method::DELETE => OperationKind::Delete,
            _ => return Err(unsupported(method, &format!("table '{}'", name))),
        },
    };
    tracing::debug!(%method, resource = ctx.target.name(), %kind, "operation resolved");
    Ok(kind)
}

fn post_kind(ctx: &Context<'_>) -> TranslateResult<OperationKind> {
    let Some(resolution) = ctx.headers.preference("resolution") else {
        return Ok(OperationKind::Insert);
    };
    if RESOLUTIONS.contains(&resolution) {
        return Ok(OperationKind::Upsert);
    }
    ctx.handling.report(TranslateError::validation(
        Stage::Operation,
        format!(
            "resolution must be one of {}, got '{}'",
            RESOLUTIONS.join(", "),
            resolution
        ),
    ))?;
    Ok(OperationKind::Insert)
}

fn unsupported(method: &Method, target: &str) -> TranslateError {
    TranslateError::parse(
        Stage::Operation,
        format!("method {} is not supported on {}", method, target),
    )
}
