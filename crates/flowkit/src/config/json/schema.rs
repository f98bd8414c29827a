//! File-level shapes shared by the JSON and TOML parsers.
//!
//! Each polymorphic field has an untagged two-variant decoder (simple, then
//! advanced). Serialization picks the simple variant whenever the canonical
//! record is structurally eligible.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    address::{Address, ChainId},
    cadence::Value,
    config::{
        Account, AccountKey, Config, Contract, ContractDeployment, Deployment, Emulator, Network,
    },
    crypto::{HashAlgorithm, SignatureAlgorithm},
    error::ConfigError,
};

/// The on-disk document.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConfigDocument {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub emulators: IndexMap<String, EmulatorDocument>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub contracts: IndexMap<String, ContractDocument>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub networks: IndexMap<String, NetworkDocument>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub accounts: IndexMap<String, AccountEntry>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub deployments: IndexMap<String, IndexMap<String, Vec<DeploymentEntry>>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EmulatorDocument {
    pub port: u16,
    pub service_account: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum ContractDocument {
    Simple(String),
    Advanced {
        source: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        aliases: IndexMap<String, String>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum NetworkDocument {
    Simple(String),
    Advanced {
        host: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chain: Option<String>,
    },
}

/// An inline account, or a reference to the file that defines it.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum AccountEntry {
    Import {
        #[serde(rename = "fromFile")]
        from_file: String,
    },
    Inline(AccountDocument),
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AccountDocument {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    pub keys: KeysDocument,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum KeysDocument {
    Simple(String),
    Advanced(Vec<KeyDocument>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct KeyDocument {
    #[serde(rename = "type")]
    pub key_type: String,
    #[serde(default)]
    pub index: u32,
    #[serde(default = "default_signature_algorithm")]
    pub signature_algorithm: String,
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,
    #[serde(default)]
    pub context: IndexMap<String, String>,
}

fn default_signature_algorithm() -> String {
    SignatureAlgorithm::default().to_string()
}

fn default_hash_algorithm() -> String {
    HashAlgorithm::default().to_string()
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum DeploymentEntry {
    Simple(String),
    Advanced {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<serde_json::Value>,
    },
}

impl ConfigDocument {
    /// Normalize into the canonical model.
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let mut config = Config::default();

        for (name, emulator) in self.emulators {
            config.emulators.push(Emulator {
                name,
                port: emulator.port,
                service_account: emulator.service_account,
            });
        }

        for (name, contract) in self.contracts {
            match contract {
                ContractDocument::Simple(source) => {
                    config.contracts.push(Contract::new(name, source));
                }
                ContractDocument::Advanced { source, aliases } => {
                    config.contracts.push(Contract::new(name.clone(), source.clone()));
                    for (network, alias) in aliases {
                        let address = Address::from_hex(&alias).map_err(|e| {
                            ConfigError::semantics(format!("contract {name} alias on {network}: {e}"))
                        })?;
                        config.contracts.push(Contract {
                            name: name.clone(),
                            source: source.clone(),
                            network: Some(network),
                            alias: Some(address),
                        });
                    }
                }
            }
        }

        for (name, network) in self.networks {
            let network = match network {
                NetworkDocument::Simple(host) => Network::new(name, host),
                NetworkDocument::Advanced { host, chain } => Network {
                    chain: chain.as_deref().map(parse_chain).transpose()?,
                    ..Network::new(name, host)
                },
            };
            config.networks.push(network);
        }

        for (name, account) in self.accounts {
            match account {
                AccountEntry::Import { from_file } => {
                    config.imports.insert(name, from_file);
                }
                AccountEntry::Inline(account) => config.accounts.push(account.into_account(name)?),
            }
        }

        for (network, accounts) in self.deployments {
            for (account, entries) in accounts {
                let contracts = entries
                    .into_iter()
                    .map(DeploymentEntry::into_contract_deployment)
                    .collect::<Result<Vec<_>, _>>()?;
                config.deployments.push(Deployment {
                    network: network.clone(),
                    account,
                    contracts,
                });
            }
        }

        Ok(config)
    }

    /// Project the canonical model, preferring simple forms.
    pub fn from_config(config: &Config) -> Self {
        let mut document = ConfigDocument::default();

        for emulator in config.emulators.iter() {
            document.emulators.insert(
                emulator.name.clone(),
                EmulatorDocument {
                    port: emulator.port,
                    service_account: emulator.service_account.clone(),
                },
            );
        }

        for name in config.contracts.names() {
            let records: Vec<&Contract> =
                config.contracts.iter().filter(|c| c.name == name).collect();
            let source = records
                .iter()
                .find(|c| c.network.is_none())
                .or(records.first())
                .map(|c| c.source.clone())
                .unwrap_or_default();
            let aliases: IndexMap<String, String> = records
                .iter()
                .filter_map(|c| match (&c.network, c.alias) {
                    (Some(network), Some(alias)) => Some((network.clone(), alias.to_hex())),
                    _ => None,
                })
                .collect();

            let document_contract = if aliases.is_empty() {
                ContractDocument::Simple(source)
            } else {
                ContractDocument::Advanced { source, aliases }
            };
            document.contracts.insert(name.to_string(), document_contract);
        }

        for network in config.networks.iter() {
            let document_network = if network.is_simple() {
                NetworkDocument::Simple(network.host.clone())
            } else {
                NetworkDocument::Advanced {
                    host: network.host.clone(),
                    chain: network.chain.map(|c| c.to_string()),
                }
            };
            document.networks.insert(network.name.clone(), document_network);
        }

        for account in config.accounts.iter() {
            let entry = match config.imports.get(&account.name) {
                Some(from_file) => AccountEntry::Import {
                    from_file: from_file.clone(),
                },
                None => AccountEntry::Inline(AccountDocument::from_account(
                    account,
                    &config.env_references,
                )),
            };
            document.accounts.insert(account.name.clone(), entry);
        }

        for deployment in config.deployments.iter() {
            let entries = deployment
                .contracts
                .iter()
                .map(DeploymentEntry::from_contract_deployment)
                .collect();
            document
                .deployments
                .entry(deployment.network.clone())
                .or_default()
                .insert(deployment.account.clone(), entries);
        }

        document
    }
}

fn parse_chain(value: &str) -> Result<ChainId, ConfigError> {
    value
        .parse::<ChainId>()
        .map_err(|_| ConfigError::semantics(format!("unknown chain '{value}'")))
}

impl AccountDocument {
    fn into_account(self, name: String) -> Result<Account, ConfigError> {
        let explicit_chain = self.chain.as_deref().map(parse_chain).transpose()?;
        let address = Address::from_config(&self.address, explicit_chain)
            .map_err(|e| ConfigError::semantics(format!("account {name}: {e}")))?;
        let chain = explicit_chain.or_else(|| address.infer_chain()).ok_or_else(|| {
            ConfigError::semantics(format!(
                "account {name}: cannot infer chain of address {}",
                address.to_hex()
            ))
        })?;

        let keys = match self.keys {
            KeysDocument::Simple(private_key) => vec![AccountKey::hex(private_key)],
            KeysDocument::Advanced(keys) => keys
                .into_iter()
                .map(|key| key.into_account_key(&name))
                .collect::<Result<_, _>>()?,
        };
        if keys.is_empty() {
            return Err(ConfigError::semantics(format!("account {name} has no keys")));
        }

        Ok(Account {
            name,
            address,
            chain,
            keys,
        })
    }

    /// Key material found in `env_references` is written as its reference.
    fn from_account(account: &Account, env_references: &IndexMap<String, String>) -> Self {
        let unresolve = |value: &str| {
            env_references
                .get(value)
                .cloned()
                .unwrap_or_else(|| value.to_string())
        };
        let keys = match account.simple_key().and_then(AccountKey::private_key) {
            Some(private_key) => KeysDocument::Simple(unresolve(private_key)),
            None => KeysDocument::Advanced(
                account
                    .keys
                    .iter()
                    .map(|key| {
                        let mut document = KeyDocument::from(key);
                        for value in document.context.values_mut() {
                            *value = unresolve(value);
                        }
                        document
                    })
                    .collect(),
            ),
        };
        Self {
            address: account.address.to_hex(),
            chain: Some(account.chain.to_string()),
            keys,
        }
    }
}

impl KeyDocument {
    fn into_account_key(self, account: &str) -> Result<AccountKey, ConfigError> {
        let signature_algorithm = self
            .signature_algorithm
            .parse::<SignatureAlgorithm>()
            .map_err(|_| {
                ConfigError::semantics(format!(
                    "account {account}: unsupported signature algorithm '{}'",
                    self.signature_algorithm
                ))
            })?;
        let hash_algorithm = self.hash_algorithm.parse::<HashAlgorithm>().map_err(|_| {
            ConfigError::semantics(format!(
                "account {account}: unsupported hash algorithm '{}'",
                self.hash_algorithm
            ))
        })?;
        Ok(AccountKey {
            key_type: self.key_type,
            index: self.index,
            signature_algorithm,
            hash_algorithm,
            context: self.context,
        })
    }
}

impl From<&AccountKey> for KeyDocument {
    fn from(key: &AccountKey) -> Self {
        Self {
            key_type: key.key_type.clone(),
            index: key.index,
            signature_algorithm: key.signature_algorithm.to_string(),
            hash_algorithm: key.hash_algorithm.to_string(),
            context: key.context.clone(),
        }
    }
}

impl DeploymentEntry {
    fn into_contract_deployment(self) -> Result<ContractDeployment, ConfigError> {
        match self {
            DeploymentEntry::Simple(name) => Ok(ContractDeployment::new(name)),
            DeploymentEntry::Advanced { name, args } => {
                let args = args
                    .iter()
                    .map(Value::from_json)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| {
                        ConfigError::semantics(format!("init arguments of {name}: {e}"))
                    })?;
                Ok(ContractDeployment { name, args })
            }
        }
    }

    fn from_contract_deployment(contract: &ContractDeployment) -> Self {
        if contract.args.is_empty() {
            DeploymentEntry::Simple(contract.name.clone())
        } else {
            DeploymentEntry::Advanced {
                name: contract.name.clone(),
                args: contract.args.iter().map(Value::to_json).collect(),
            }
        }
    }
}
