//! The two-phase pipeline: parse, resolve, assemble.

use crate::assembler::{self, Parts};
use crate::ast::{Ast, OperationKind};
use crate::config::TranslatorConfig;
use crate::error::{TranslateError, TranslateResult};
use crate::parser::{self, body, headers, query::QueryParams, route, select};
use crate::request::Request;
use crate::resolver::{self, Context};

/// Request → AST translator.
///
/// Holds only configuration; a single instance can serve any number of requests
/// concurrently.
#[derive(Debug, Clone, Default)]
pub struct Translator {
    config: TranslatorConfig,
}

impl Translator {
    pub fn new(config: TranslatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Translate one request.
    ///
    /// Dropping the returned future while the body is still being read abandons the
    /// translation; no partial AST is ever produced.
    pub async fn translate(&self, request: Request) -> TranslateResult<Ast> {
        let Request {
            method,
            target,
            headers: header_map,
            body,
        } = request;
        tracing::trace!(%method, uri = %target, "translating request");

        let url = parser::parse_target(&target)?;
        let select_raw = url
            .query_pairs()
            .filter(|(k, _)| k == "select")
            .last()
            .map(|(_, v)| v.into_owned());
        let content_type = headers::content_type(&header_map)?;

        // Phase 1
        let (route, header_info, select_tree, payload, params) = tokio::try_join!(
            async { route::parse_route(&url, &self.config) },
            async { headers::parse_headers(&method, &header_map, &self.config) },
            async {
                select_raw
                    .as_deref()
                    .map(|s| select::parse_select(s, self.config.max_embed_depth))
                    .transpose()
            },
            body::read_body(body, content_type.as_deref(), self.config.max_body_bytes),
            async { Ok::<_, TranslateError>(QueryParams::parse(url.query())) },
        )?;
        tracing::debug!(
            resource = route.name(),
            select = select_tree.is_some(),
            params = params.len(),
            payload = payload.is_some(),
            "request parsed"
        );

        // Phase 2
        let handling = resolver::meta::resolve_handling(&header_info, &self.config)?;
        let embeds = select_tree
            .as_ref()
            .map(|tree| tree.embed_paths())
            .unwrap_or_default();
        let ctx = Context {
            method: &method,
            target: &route,
            headers: &header_info,
            params: &params,
            embeds: &embeds,
            payload: payload.as_ref(),
            handling,
        };

        let kind = resolver::operation::resolve(&ctx)?;
        let filters = resolver::filter::resolve(&ctx)?;
        let transforms = resolver::transform::resolve(&ctx)?;
        let meta = resolver::meta::resolve(&ctx, kind)?;
        let rpc = match kind {
            OperationKind::Rpc => Some(resolver::rpc::resolve(&ctx)?),
            _ => None,
        };
        let on_conflict = match kind {
            OperationKind::Upsert => Some(resolver::upsert::resolve(&ctx)?),
            _ => None,
        };

        let values = match (kind, payload) {
            (OperationKind::Rpc, _) => None,
            (_, Some(payload)) => Some(payload.into_value()),
            (_, None) => None,
        };

        assembler::assemble(Parts {
            kind,
            target: route,
            schema: header_info.schema.clone(),
            select: select_tree,
            filters,
            transforms,
            meta,
            rpc,
            on_conflict,
            values,
        })
    }
}
