//! Phase 1: independent parsers over the raw request.
//!
//! Each parser sees only its own slice of the request and never consults another's
//! output, so the translator can run them side by side.

pub mod body;
pub mod headers;
pub mod query;
pub mod route;
pub mod select;

use url::Url;

use crate::error::{Stage, TranslateError, TranslateResult};

pub use body::Payload;
pub use headers::{HeaderInfo, Preference};
pub use query::QueryParams;
pub use route::Target;

/// Parse an origin-form (`/items?x=1`) or absolute request target.
pub fn parse_target(target: &str) -> TranslateResult<Url> {
    let base = Url::parse("http://localhost/")
        .map_err(|e| TranslateError::parse(Stage::Route, e.to_string()))?;
    Url::options()
        .base_url(Some(&base))
        .parse(target)
        .map_err(|e| TranslateError::parse(Stage::Route, format!("invalid request target '{}': {}", target, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_forms() {
        let url = parse_target("/items?select=id").unwrap();
        assert_eq!(url.path(), "/items");
        assert_eq!(url.query(), Some("select=id"));

        let url = parse_target("https://api.example.com/rest/v1/items").unwrap();
        assert_eq!(url.path(), "/rest/v1/items");
        assert_eq!(url.query(), None);
    }
}
