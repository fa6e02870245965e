//! Arguments and calling convention of a callable target.
//!
//! A query-string call splits its params with [`Context::is_argument`]: a value that reads
//! as `op.rest` is a result filter, anything else is an argument. An argument whose value
//! happens to look like `eq.x` is therefore taken as a filter; without the function's
//! signature there is nothing better to go on.

use serde_json::{Map, Value};

use super::Context;
use crate::ast::{CallInfo, CallMethod, Convention};
use crate::error::{Stage, TranslateError, TranslateResult};
use crate::parser::Payload;

#[derive(Debug, Clone, PartialEq)]
pub struct RpcOutput {
    pub args: Value,
    pub call: CallInfo,
}

pub fn resolve(ctx: &Context<'_>) -> TranslateResult<RpcOutput> {
    let out = if ctx.is_read() {
        query_call(ctx)
    } else {
        body_call(ctx)?
    };
    tracing::debug!(
        function = ctx.target.name(),
        method = ?out.call.method,
        convention = ?out.call.convention,
        "call resolved"
    );
    Ok(out)
}

fn query_call(ctx: &Context<'_>) -> RpcOutput {
    let mut args = Map::new();
    for (key, value) in ctx.params.iter() {
        if !ctx.is_argument(key, value) {
            continue;
        }
        let value = Value::String(value.to_string());
        match args.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                args.insert(key.to_string(), value);
            }
        }
    }
    RpcOutput {
        args: Value::Object(args),
        call: CallInfo {
            method: CallMethod::Get,
            convention: Convention::Named,
        },
    }
}

fn body_call(ctx: &Context<'_>) -> TranslateResult<RpcOutput> {
    let single_object = match ctx.headers.preference("params") {
        None => false,
        Some("single-object") => true,
        Some(other) => {
            ctx.handling.report(TranslateError::validation(
                Stage::Rpc,
                format!("Prefer 'params' accepts single-object, got '{}'", other),
            ))?;
            false
        }
    };

    let (args, convention) = match ctx.payload {
        None => (Value::Object(Map::new()), Convention::Named),
        Some(payload) if single_object => (payload.clone().into_value(), Convention::SingleObject),
        Some(Payload::Json(Value::Object(map))) => (Value::Object(map.clone()), Convention::Named),
        Some(Payload::Json(Value::Array(items))) => {
            (Value::Array(items.clone()), Convention::Positional)
        }
        Some(payload) => {
            ctx.handling.report(TranslateError::validation(
                Stage::Rpc,
                "call payload must be a JSON object or array; use Prefer: params=single-object to pass it whole",
            ))?;
            (payload.clone().into_value(), Convention::SingleObject)
        }
    };

    Ok(RpcOutput {
        args,
        call: CallInfo {
            method: CallMethod::Post,
            convention,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Handling;
    use crate::parser::{HeaderInfo, Preference, QueryParams, Target};
    use http::Method;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn call(
        method: Method,
        query: &str,
        payload: Option<Payload>,
        prefer_params: Option<&str>,
        handling: Handling,
    ) -> TranslateResult<RpcOutput> {
        let headers = HeaderInfo {
            preferences: prefer_params
                .map(|v| {
                    vec![Preference {
                        key: "params".into(),
                        value: v.into(),
                    }]
                })
                .unwrap_or_default(),
            ..HeaderInfo::default()
        };
        let params = QueryParams::parse(Some(query));
        let embeds = BTreeSet::new();
        resolve(&Context {
            method: &method,
            target: &Target::Function("search_items".into()),
            headers: &headers,
            params: &params,
            embeds: &embeds,
            payload: payload.as_ref(),
            handling,
        })
    }

    #[test]
    fn test_query_call_splits_arguments_from_filters() {
        let out = call(
            Method::GET,
            "term=phone&status=eq.active&tag=a&tag=b&select=id&order=id",
            None,
            None,
            Handling::Strict,
        )
        .unwrap();
        assert_eq!(out.args, json!({"term": "phone", "tag": ["a", "b"]}));
        assert_eq!(out.call.method, CallMethod::Get);
        assert_eq!(out.call.convention, Convention::Named);
    }

    #[test]
    fn test_argument_that_looks_like_a_filter_is_a_filter() {
        let out = call(Method::GET, "code=eq.5", None, None, Handling::Strict).unwrap();
        assert_eq!(out.args, json!({}));
    }

    #[test]
    fn test_body_call_conventions() {
        let named = call(
            Method::POST,
            "",
            Some(Payload::Json(json!({"a": 1}))),
            None,
            Handling::Strict,
        )
        .unwrap();
        assert_eq!(named.args, json!({"a": 1}));
        assert_eq!(named.call.convention, Convention::Named);
        assert_eq!(named.call.method, CallMethod::Post);

        let positional = call(
            Method::POST,
            "",
            Some(Payload::Json(json!([1, "x"]))),
            None,
            Handling::Strict,
        )
        .unwrap();
        assert_eq!(positional.call.convention, Convention::Positional);

        let single = call(
            Method::POST,
            "",
            Some(Payload::Json(json!({"a": 1}))),
            Some("single-object"),
            Handling::Strict,
        )
        .unwrap();
        assert_eq!(single.call.convention, Convention::SingleObject);
        assert_eq!(single.args, json!({"a": 1}));

        let empty = call(Method::POST, "", None, None, Handling::Strict).unwrap();
        assert_eq!(empty.args, json!({}));
    }

    #[test]
    fn test_scalar_payload() {
        assert!(call(Method::POST, "", Some(Payload::Json(json!(5))), None, Handling::Strict).is_err());
        let out = call(
            Method::POST,
            "",
            Some(Payload::Text("hello".into())),
            None,
            Handling::Lenient,
        )
        .unwrap();
        assert_eq!(out.args, json!("hello"));
        assert_eq!(out.call.convention, Convention::SingleObject);
    }
}
