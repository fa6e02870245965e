//! One-shot body draining and payload decoding.

use bytes::BytesMut;
use futures::StreamExt;
use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::error::{Stage, TranslateError, TranslateResult};
use crate::request::Body;

/// A decoded request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    /// CSV or plain text, passed through untouched.
    Text(String),
}

impl Payload {
    pub fn into_value(self) -> Value {
        match self {
            Payload::Json(value) => value,
            Payload::Text(text) => Value::String(text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Json,
    Form,
    Text,
}

fn encoding(content_type: Option<&str>) -> TranslateResult<Encoding> {
    let Some(content_type) = content_type else {
        return Ok(Encoding::Json);
    };
    let media = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match media.as_str() {
        "" | "application/json" => Ok(Encoding::Json),
        m if m.starts_with("application/") && m.ends_with("+json") => Ok(Encoding::Json),
        "application/x-www-form-urlencoded" => Ok(Encoding::Form),
        "text/csv" | "text/plain" => Ok(Encoding::Text),
        other => Err(TranslateError::parse(
            Stage::Body,
            format!("unsupported content type '{}'", other),
        )),
    }
}

/// Drain `body` and decode it. `Ok(None)` means the request carried no payload.
///
/// The stream is owned by this function and dropped on every return path, including
/// when the enclosing future is cancelled mid-read.
pub async fn read_body(
    body: Body,
    content_type: Option<&str>,
    limit: usize,
) -> TranslateResult<Option<Payload>> {
    let Some(mut stream) = body.into_stream() else {
        return Ok(None);
    };
    let encoding = encoding(content_type)?;

    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| TranslateError::Body(format!("failed to read body: {}", e)))?;
        if buf.len() + chunk.len() > limit {
            return Err(TranslateError::Body(format!(
                "payload exceeds {} bytes",
                limit
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    drop(stream);
    tracing::trace!(bytes = buf.len(), ?encoding, "body drained");

    let text = std::str::from_utf8(&buf)
        .map_err(|e| TranslateError::Body(format!("payload is not UTF-8: {}", e)))?;
    if text.trim().is_empty() {
        return Ok(None);
    }

    let payload = match encoding {
        Encoding::Json => Payload::Json(serde_json::from_str(text).map_err(|e| {
            TranslateError::parse(Stage::Body, format!("invalid JSON payload: {}", e))
        })?),
        Encoding::Form => Payload::Json(decode_form(text)),
        Encoding::Text => Payload::Text(text.to_string()),
    };
    Ok(Some(payload))
}

fn decode_form(text: &str) -> Value {
    let mut object = Map::new();
    for (key, value) in form_urlencoded::parse(text.as_bytes()) {
        let value = Value::String(value.into_owned());
        match object.get_mut(&*key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                object.insert(key.into_owned(), value);
            }
        }
    }
    Value::Object(object)
}
