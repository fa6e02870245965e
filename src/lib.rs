//! # pgrest-ast
//!
//! Translate PostgREST-style HTTP requests into one engine-neutral AST.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use pgrest_ast::prelude::*;
//!
//! let request = Request::get("/products?select=id,categories!inner(name)&price=gte.10")
//!     .header("Prefer", "count=exact")
//!     .build()?;
//! let ast = pgrest_ast::translate(request).await?;
//!
//! assert_eq!(ast.to_json()["where"], serde_json::json!({"price": {"$gte": 10}}));
//! ```
//!
//! ## Pipeline
//!
//! | Phase | Step      | Reads                          | Produces                         |
//! |-------|-----------|--------------------------------|----------------------------------|
//! | 1     | route     | path                           | table or function                |
//! | 1     | headers   | profiles, `Prefer`, `Accept`   | schema, preference tokens        |
//! | 1     | select    | `select=`                      | select list, joins, embed paths  |
//! | 1     | body      | payload stream                 | JSON or raw text                 |
//! | 1     | query     | query string                   | ordered multimap                 |
//! | 2     | resolvers | all of the above               | operation, where, order, `$meta` |
//! | -     | assembler | resolver outputs               | [`Ast`](ast::Ast)                |

pub mod assembler;
pub mod ast;
pub mod config;
pub mod error;
pub mod parser;
pub mod request;
pub mod resolver;
pub mod translator;

pub mod prelude {
    pub use crate::ast::select::render_select;
    pub use crate::ast::*;
    pub use crate::config::TranslatorConfig;
    pub use crate::error::*;
    pub use crate::parser::select::parse_select;
    pub use crate::request::{Body, Request};
    pub use crate::translator::Translator;
}

/// Translate a request with the default configuration.
pub async fn translate(request: request::Request) -> Result<ast::Ast, error::TranslateError> {
    translator::Translator::default().translate(request).await
}
