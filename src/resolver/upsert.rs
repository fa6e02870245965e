//! Conflict target and duplicate policy of an upsert.

use super::Context;
use crate::ast::OnConflict;
use crate::error::TranslateResult;

pub fn resolve(ctx: &Context<'_>) -> TranslateResult<OnConflict> {
    let columns = ctx
        .params
        .last("on_conflict")
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    // The operation resolver already rejected unknown values.
    let ignore_duplicates = ctx.headers.preference("resolution") == Some("ignore-duplicates");

    Ok(OnConflict {
        columns,
        ignore_duplicates,
    })
}
