//! Translator configuration

use std::path::Path;

use serde::Deserialize;

use crate::ast::Handling;
use crate::error::{TranslateError, TranslateResult};

/// Main translator configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Path prefix stripped before route parsing (e.g. `/rest/v1`)
    pub base_path: String,

    /// Path segment that marks a callable target
    pub rpc_prefix: String,

    /// Allowed schemas; the first one is the default
    pub schemas: Vec<String>,

    /// Handling applied when the request carries no `Prefer: handling=…`
    pub default_handling: Handling,

    /// Deepest embed nesting accepted in `select`
    pub max_embed_depth: usize,

    /// Largest request body accepted, in bytes
    pub max_body_bytes: usize,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            rpc_prefix: "rpc".to_string(),
            schemas: Vec::new(),
            default_handling: Handling::Lenient,
            max_embed_depth: 16,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl TranslatorConfig {
    /// Create a new configuration builder
    pub fn builder() -> TranslatorConfigBuilder {
        TranslatorConfigBuilder::default()
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> TranslateResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: TranslatorConfig = toml::from_str(&content).map_err(|e| {
            TranslateError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loaded translator config from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Load `<config dir>/pgrest-ast/config.toml`, falling back to defaults
    pub fn load_default() -> TranslateResult<Self> {
        match dirs::config_dir().map(|dir| dir.join("pgrest-ast").join("config.toml")) {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// The schema used when the request names none
    pub fn default_schema(&self) -> Option<&str> {
        self.schemas.first().map(String::as_str)
    }

    fn validate(&self) -> TranslateResult<()> {
        if self.max_embed_depth == 0 {
            return Err(TranslateError::Config(
                "max_embed_depth must be at least 1".to_string(),
            ));
        }
        if self.rpc_prefix.is_empty() || self.rpc_prefix.contains('/') {
            return Err(TranslateError::Config(format!(
                "rpc_prefix must be a single path segment, got '{}'",
                self.rpc_prefix
            )));
        }
        Ok(())
    }
}

/// Builder for TranslatorConfig
#[derive(Debug, Default)]
pub struct TranslatorConfigBuilder {
    config: TranslatorConfig,
}

impl TranslatorConfigBuilder {
    /// Set the path prefix
    pub fn base_path(mut self, prefix: impl Into<String>) -> Self {
        self.config.base_path = prefix.into();
        self
    }

    /// Set the callable path segment
    pub fn rpc_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.rpc_prefix = prefix.into();
        self
    }

    /// Add an allowed schema
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.config.schemas.push(schema.into());
        self
    }

    /// Set the default handling
    pub fn handling(mut self, handling: Handling) -> Self {
        self.config.default_handling = handling;
        self
    }

    /// Set the embed depth limit
    pub fn max_embed_depth(mut self, depth: usize) -> Self {
        self.config.max_embed_depth = depth;
        self
    }

    /// Set the body size limit
    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.config.max_body_bytes = bytes;
        self
    }

    /// Build the configuration
    pub fn build(self) -> TranslatorConfig {
        self.config
    }
}
