//! The inbound request handed to the translator.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use http::{HeaderMap, HeaderName, HeaderValue, Method};

use crate::error::{Stage, TranslateError, TranslateResult};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// A request body that can be read at most once.
#[derive(Default)]
pub struct Body {
    stream: Option<BodyStream>,
}

impl Body {
    pub fn empty() -> Self {
        Self { stream: None }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Self::empty();
        }
        Self {
            stream: Some(stream::once(async move { Ok(bytes) }).boxed()),
        }
    }

    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self {
            stream: Some(stream.map(|chunk| chunk.map_err(Into::into)).boxed()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stream.is_none()
    }

    pub(crate) fn into_stream(self) -> Option<BodyStream> {
        self.stream
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("empty", &self.stream.is_none())
            .finish()
    }
}

/// Method, target (path plus query string), headers and a one-shot body.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub target: String,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Request {
    pub fn builder(method: Method, target: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            method,
            target: target.into(),
            headers: Vec::new(),
            body: Body::empty(),
        }
    }

    pub fn get(target: impl Into<String>) -> RequestBuilder {
        Self::builder(Method::GET, target)
    }

    pub fn post(target: impl Into<String>) -> RequestBuilder {
        Self::builder(Method::POST, target)
    }
}

impl From<http::Request<Body>> for Request {
    fn from(req: http::Request<Body>) -> Self {
        let (parts, body) = req.into_parts();
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        Self {
            method: parts.method,
            target,
            headers: parts.headers,
            body,
        }
    }
}

/// Builder collecting headers as text; invalid names or values surface at `build`.
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    target: String,
    headers: Vec<(String, String)>,
    body: Body,
}

impl RequestBuilder {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = Body::from_bytes(bytes);
        self
    }

    pub fn body_stream(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn build(self) -> TranslateResult<Request> {
        let mut headers = HeaderMap::new();
        for (name, value) in self.headers {
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                TranslateError::parse(Stage::Headers, format!("invalid header name '{}': {}", name, e))
            })?;
            let value = HeaderValue::from_str(&value).map_err(|e| {
                TranslateError::parse(Stage::Headers, format!("invalid value for '{}': {}", name, e))
            })?;
            headers.append(header, value);
        }
        Ok(Request {
            method: self.method,
            target: self.target,
            headers,
            body: self.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_repeated_headers() {
        let req = Request::get("/items?select=id")
            .header("Prefer", "count=exact")
            .header("Prefer", "handling=strict")
            .build()
            .unwrap();
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.headers.get_all("prefer").iter().count(), 2);
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_builder_rejects_bad_header() {
        let err = Request::get("/items").header("bad header", "x").build().unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Headers));
    }

    #[test]
    fn test_from_http_request() {
        let http_req = http::Request::builder()
            .method(Method::PATCH)
            .uri("http://localhost/items?id=eq.1")
            .body(Body::from_bytes("{}"))
            .unwrap();
        let req = Request::from(http_req);
        assert_eq!(req.target, "/items?id=eq.1");
        assert!(!req.body.is_empty());
    }
}
