//! Error types for request translation.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// The sub-parser or resolver an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Route,
    Headers,
    Select,
    Body,
    QueryParams,
    Operation,
    Filter,
    Transform,
    Meta,
    Rpc,
    Upsert,
    Assembler,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Route => "route",
            Stage::Headers => "headers",
            Stage::Select => "select",
            Stage::Body => "body",
            Stage::QueryParams => "query params",
            Stage::Operation => "operation",
            Stage::Filter => "filter",
            Stage::Transform => "transform",
            Stage::Meta => "meta",
            Stage::Rpc => "rpc",
            Stage::Upsert => "upsert",
            Stage::Assembler => "assembler",
        };
        f.write_str(name)
    }
}

/// Coarse error classification.
///
/// `Parse` and `Body` errors always abort translation. `Validation` errors abort
/// only under strict handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Parse,
    Validation,
    Body,
    Config,
}

/// The main error type for translation.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// Malformed select grammar, located by character offset.
    #[error("Parse error in {stage} at position {position}: {message}")]
    Syntax {
        stage: Stage,
        position: usize,
        message: String,
    },

    /// Malformed input without a meaningful offset (lists, groups, payloads).
    #[error("Parse error in {stage}: {message}")]
    Parse { stage: Stage, message: String },

    /// Well-formed but unacceptable input.
    #[error("Validation error in {stage}: {message}")]
    Validation { stage: Stage, message: String },

    /// Reading the request body failed.
    #[error("Body error: {0}")]
    Body(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranslateError {
    /// Create a select-grammar error at the given character offset.
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            stage: Stage::Select,
            position,
            message: message.into(),
        }
    }

    pub fn parse(stage: Stage, message: impl Into<String>) -> Self {
        Self::Parse {
            stage,
            message: message.into(),
        }
    }

    pub fn validation(stage: Stage, message: impl Into<String>) -> Self {
        Self::Validation {
            stage,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Syntax { .. } | Self::Parse { .. } => ErrorKind::Parse,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Body(_) => ErrorKind::Body,
            Self::Config(_) | Self::Io(_) => ErrorKind::Config,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Syntax { stage, .. } | Self::Parse { stage, .. } | Self::Validation { stage, .. } => {
                Some(*stage)
            }
            Self::Body(_) => Some(Stage::Body),
            Self::Config(_) | Self::Io(_) => None,
        }
    }

    /// Character offset, only present for select-grammar errors.
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Syntax { position, .. } => Some(*position),
            _ => None,
        }
    }

    /// HTTP status a transport layer would answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Syntax { .. } | Self::Parse { .. } | Self::Validation { .. } => 400,
            Self::Body(msg) if msg.contains("exceeds") => 413,
            Self::Body(_) => 400,
            Self::Config(_) | Self::Io(_) => 500,
        }
    }
}

/// Result type alias for translation.
pub type TranslateResult<T> = Result<T, TranslateError>;
