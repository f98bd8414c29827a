//! JSON configuration format (`flow.json`).

use crate::{
    config::{Config, Parser},
    error::ConfigError,
};

pub(crate) mod schema;
use schema::ConfigDocument;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl Parser for JsonParser {
    fn serialize(&self, config: &Config) -> Result<Vec<u8>, ConfigError> {
        let document = ConfigDocument::from_config(config);
        let mut bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| ConfigError::semantics(format!("failed to encode configuration: {e}")))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn deserialize(&self, raw: &[u8]) -> Result<Config, ConfigError> {
        let document: ConfigDocument =
            serde_json::from_slice(raw).map_err(ConfigError::syntax)?;
        document.into_config()
    }

    fn supports(&self, format: &str) -> bool {
        format.eq_ignore_ascii_case("json")
    }
}
