//! TOML configuration format (`flow.toml`), sharing the JSON record shapes.

use crate::{
    config::{Config, Parser, json::schema::ConfigDocument},
    error::ConfigError,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct TomlParser;

impl Parser for TomlParser {
    fn serialize(&self, config: &Config) -> Result<Vec<u8>, ConfigError> {
        let document = ConfigDocument::from_config(config);
        toml::to_string_pretty(&document)
            .map(String::into_bytes)
            .map_err(|e| ConfigError::semantics(format!("failed to encode configuration: {e}")))
    }

    fn deserialize(&self, raw: &[u8]) -> Result<Config, ConfigError> {
        let text = std::str::from_utf8(raw).map_err(ConfigError::syntax)?;
        let document: ConfigDocument = toml::from_str(text).map_err(ConfigError::syntax)?;
        document.into_config()
    }

    fn supports(&self, format: &str) -> bool {
        format.eq_ignore_ascii_case("toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{SERVICE_KEY, sample_config};

    #[test]
    fn test_parse_simple_forms() {
        let raw = format!(
            r#"
[networks]
emulator = "127.0.0.1:3569"

[accounts.emulator-account]
address = "service"
chain = "flow-emulator"
keys = "{SERVICE_KEY}"

[deployments.emulator]
emulator-account = ["A"]

[contracts]
A = "./A.cdc"
"#
        );
        let config = TomlParser.deserialize(raw.as_bytes()).unwrap();

        assert_eq!(config.accounts[0].keys[0].private_key(), Some(SERVICE_KEY));
        assert_eq!(config.deployments[0].contracts[0].name, "A");
        config.validate().unwrap();
    }

    #[test]
    fn test_roundtrip() {
        let config = sample_config();
        let bytes = TomlParser.serialize(&config).unwrap();
        assert_eq!(TomlParser.deserialize(&bytes).unwrap(), config);
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            TomlParser.deserialize(b"[accounts"),
            Err(ConfigError::InvalidSyntax { .. })
        ));
    }
}
