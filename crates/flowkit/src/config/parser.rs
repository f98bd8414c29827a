//! Parser plugins keyed by file format.

use std::{path::Path, sync::Arc};

use derive_more::Deref;

use crate::{
    config::{Config, JsonParser, TomlParser},
    error::ConfigError,
};

/// Translates a file format to and from the canonical [`Config`].
pub trait Parser: Send + Sync {
    fn serialize(&self, config: &Config) -> Result<Vec<u8>, ConfigError>;

    fn deserialize(&self, raw: &[u8]) -> Result<Config, ConfigError>;

    /// Whether this parser handles files with the `format` extension.
    fn supports(&self, format: &str) -> bool;
}

/// Registry of available parsers, searched in registration order.
#[derive(Clone, Deref)]
pub struct Parsers(Vec<Arc<dyn Parser>>);

impl Parsers {
    /// An empty registry.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn register(mut self, parser: impl Parser + 'static) -> Self {
        self.0.push(Arc::new(parser));
        self
    }

    pub fn find_for_format(&self, format: &str) -> Option<&dyn Parser> {
        self.0
            .iter()
            .find(|p| p.supports(format))
            .map(|p| p.as_ref())
    }

    /// The parser for `path`'s extension; extensionless paths are treated as JSON.
    pub fn for_path(&self, path: &Path) -> Result<&dyn Parser, ConfigError> {
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("json");
        self.find_for_format(format)
            .ok_or_else(|| ConfigError::ParserNotFound {
                format: format.to_string(),
            })
    }
}

impl Default for Parsers {
    fn default() -> Self {
        Self::empty().register(JsonParser).register(TomlParser)
    }
}

impl std::fmt::Debug for Parsers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parsers").field("count", &self.0.len()).finish()
    }
}
