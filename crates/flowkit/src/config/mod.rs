//! Canonical configuration model.
//!
//! A [`Config`] is produced by the [`Loader`] from one or more files and is
//! the single source of truth for networks, accounts, contracts and
//! deployments. Parsers translate file formats to and from this model.

use std::collections::HashSet;

use derive_more::{Deref, DerefMut, From};
use indexmap::IndexMap;

use crate::{
    address::{Address, ChainId},
    cadence::Value,
    crypto::{HashAlgorithm, SignatureAlgorithm},
    error::ConfigError,
};

mod json;
pub use json::JsonParser;

mod loader;
pub use loader::{DEFAULT_CONFIG_FILE, EnvLookup, Loader, default_paths, global_path};

mod parser;
pub use parser::{Parser, Parsers};

mod processor;
pub use processor::{PreprocessedConfig, preprocess, substitute_env};

mod toml;
pub use toml::TomlParser;

/// Context field holding a hex private key.
pub const PRIVATE_KEY_FIELD: &str = "privateKey";

/// Context field holding a cloud KMS resource id.
pub const KMS_RESOURCE_ID_FIELD: &str = "kmsResourceId";

/// Key type tag of an in-memory hex key.
pub const HEX_KEY_TYPE: &str = "hex";

/// Key type tag of a Google Cloud KMS key.
pub const GOOGLE_KMS_KEY_TYPE: &str = "google-kms";

/// The whole configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub emulators: Emulators,
    pub contracts: Contracts,
    pub networks: Networks,
    pub accounts: Accounts,
    pub deployments: Deployments,
    /// Accounts loaded from another file, by name, with the path as written.
    /// They are saved back as references, never inline.
    pub imports: IndexMap<String, String>,
    /// Key material that came from an environment reference, mapped to that
    /// reference. Saving writes the reference instead of the value.
    pub env_references: IndexMap<String, String>,
}

impl Config {
    /// Right-biased merge of `other` into `self`.
    pub fn merge(&mut self, other: Config) {
        for emulator in other.emulators.0 {
            self.emulators.add_or_update(emulator);
        }
        for contract in other.contracts.0 {
            self.contracts.add_or_update(contract);
        }
        for network in other.networks.0 {
            self.networks.add_or_update(network);
        }
        for account in other.accounts.0 {
            self.imports.shift_remove(&account.name);
            self.accounts.add_or_update(account);
        }
        for deployment in other.deployments.0 {
            self.deployments.add_if_absent(deployment);
        }
        self.imports.extend(other.imports);
        self.env_references.extend(other.env_references);
    }

    /// Forget that `account` was imported, so it is saved inline.
    pub fn inline_account(&mut self, account: &str) {
        self.imports.shift_remove(account);
    }

    /// Merge an ordered list of partial configurations.
    pub fn compose(configs: impl IntoIterator<Item = Config>) -> Config {
        configs.into_iter().fold(Config::default(), |mut acc, next| {
            acc.merge(next);
            acc
        })
    }

    /// Cross-section consistency checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for emulator in self.emulators.iter() {
            if self.accounts.by_name(&emulator.service_account).is_none() {
                return Err(ConfigError::semantics(format!(
                    "emulator {} references unknown service account {}",
                    emulator.name, emulator.service_account
                )));
            }
        }

        for contract in self.contracts.iter() {
            let (Some(network), Some(alias)) = (&contract.network, contract.alias) else {
                continue;
            };
            let Some(chain) = self.networks.by_name(network).and_then(Network::chain) else {
                continue;
            };
            if !alias.is_valid_on(chain) {
                return Err(ConfigError::semantics(format!(
                    "alias {} of contract {} is not a valid {} address",
                    alias.to_hex(),
                    contract.name,
                    chain
                )));
            }
        }

        let mut seen_pairs = HashSet::new();
        for deployment in self.deployments.iter() {
            if self.networks.by_name(&deployment.network).is_none() {
                return Err(ConfigError::semantics(format!(
                    "deployment references unknown network {}",
                    deployment.network
                )));
            }
            if self.accounts.by_name(&deployment.account).is_none() {
                return Err(ConfigError::semantics(format!(
                    "deployment on {} references unknown account {}",
                    deployment.network, deployment.account
                )));
            }

            let mut names = HashSet::new();
            for contract in &deployment.contracts {
                if !self.contracts.contains_name(&contract.name) {
                    return Err(ConfigError::semantics(format!(
                        "deployment on {} references unknown contract {}",
                        deployment.network, contract.name
                    )));
                }
                if self
                    .contracts
                    .by_name_and_network(&contract.name, &deployment.network)
                    .is_some_and(Contract::is_alias)
                {
                    return Err(ConfigError::semantics(format!(
                        "contract {} is an alias on {} and cannot be deployed",
                        contract.name, deployment.network
                    )));
                }
                if !names.insert(contract.name.as_str()) {
                    return Err(ConfigError::semantics(format!(
                        "contract {} is listed twice for account {} on {}",
                        contract.name, deployment.account, deployment.network
                    )));
                }
                let pair = (
                    deployment.network.as_str(),
                    deployment.account.as_str(),
                    contract.name.as_str(),
                );
                if !seen_pairs.insert(pair) {
                    return Err(ConfigError::semantics(format!(
                        "contract {} is deployed to account {} more than once on {}",
                        contract.name, deployment.account, deployment.network
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A local emulator profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emulator {
    pub name: String,
    pub port: u16,
    pub service_account: String,
}

impl Emulator {
    pub const DEFAULT_NAME: &'static str = "default";
    pub const DEFAULT_PORT: u16 = 3569;
    pub const DEFAULT_SERVICE_ACCOUNT: &'static str = "emulator-account";
}

impl Default for Emulator {
    fn default() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            port: Self::DEFAULT_PORT,
            service_account: Self::DEFAULT_SERVICE_ACCOUNT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, DerefMut, From)]
pub struct Emulators(pub Vec<Emulator>);

impl Emulators {
    pub fn by_name(&self, name: &str) -> Option<&Emulator> {
        self.0.iter().find(|e| e.name == name)
    }

    /// The designated default profile.
    pub fn default_emulator(&self) -> Option<&Emulator> {
        self.by_name(Emulator::DEFAULT_NAME)
    }

    pub fn add_or_update(&mut self, emulator: Emulator) {
        match self.0.iter_mut().find(|e| e.name == emulator.name) {
            Some(existing) => *existing = emulator,
            None => self.0.push(emulator),
        }
    }
}

/// A network an access node can be reached on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub name: String,
    /// Access node `host:port` or URL.
    pub host: String,
    /// Explicit chain; when absent the chain is inferred from the name.
    pub chain: Option<ChainId>,
}

impl Network {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            chain: None,
        }
    }

    pub fn chain(&self) -> Option<ChainId> {
        self.chain.or_else(|| ChainId::from_network_name(&self.name))
    }

    /// Whether the record can be written as a bare host string.
    pub(crate) fn is_simple(&self) -> bool {
        self.chain.is_none() || self.chain == ChainId::from_network_name(&self.name)
    }

    /// The conventional emulator, testnet and mainnet networks.
    pub fn defaults() -> Vec<Network> {
        vec![
            Network::new("emulator", "127.0.0.1:3569"),
            Network::new("testnet", "access.devnet.nodes.onflow.org:9000"),
            Network::new("mainnet", "access.mainnet.nodes.onflow.org:9000"),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, DerefMut, From)]
pub struct Networks(pub Vec<Network>);

impl Networks {
    pub fn by_name(&self, name: &str) -> Option<&Network> {
        self.0.iter().find(|n| n.name == name)
    }

    pub fn add_or_update(&mut self, network: Network) {
        match self.0.iter_mut().find(|n| n.name == network.name) {
            Some(existing) => *existing = network,
            None => self.0.push(network),
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|n| n.name != name);
        before != self.0.len()
    }
}

/// Canonical form of an account key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountKey {
    /// Variant tag, dispatched on by the key factory.
    pub key_type: String,
    pub index: u32,
    pub signature_algorithm: SignatureAlgorithm,
    pub hash_algorithm: HashAlgorithm,
    /// Variant-specific payload.
    pub context: IndexMap<String, String>,
}

impl AccountKey {
    /// A hex key with default algorithms at index 0.
    pub fn hex(private_key: impl Into<String>) -> Self {
        Self {
            key_type: HEX_KEY_TYPE.to_string(),
            index: 0,
            signature_algorithm: SignatureAlgorithm::default(),
            hash_algorithm: HashAlgorithm::default(),
            context: IndexMap::from([(PRIVATE_KEY_FIELD.to_string(), private_key.into())]),
        }
    }

    pub fn private_key(&self) -> Option<&str> {
        self.context.get(PRIVATE_KEY_FIELD).map(String::as_str)
    }

    /// Whether this key can be written as a bare private key string.
    pub(crate) fn is_default_hex(&self) -> bool {
        self.key_type == HEX_KEY_TYPE
            && self.index == 0
            && self.signature_algorithm == SignatureAlgorithm::default()
            && self.hash_algorithm == HashAlgorithm::default()
            && self.context.len() == 1
            && self.private_key().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub address: Address,
    pub chain: ChainId,
    pub keys: Vec<AccountKey>,
}

impl Account {
    /// The single key written in simple form, if eligible.
    pub(crate) fn simple_key(&self) -> Option<&AccountKey> {
        match self.keys.as_slice() {
            [key] if key.is_default_hex() => Some(key),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, DerefMut, From)]
pub struct Accounts(pub Vec<Account>);

impl Accounts {
    pub fn by_name(&self, name: &str) -> Option<&Account> {
        self.0.iter().find(|a| a.name == name)
    }

    pub fn by_address(&self, address: Address) -> Option<&Account> {
        self.0.iter().find(|a| a.address == address)
    }

    pub fn add_or_update(&mut self, account: Account) {
        match self.0.iter_mut().find(|a| a.name == account.name) {
            Some(existing) => *existing = account,
            None => self.0.push(account),
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|a| a.name != name);
        before != self.0.len()
    }
}

/// A contract source, or an alias on one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    pub name: String,
    /// Source path, or the address of an already deployed contract.
    pub source: String,
    /// Network binding; `None` applies to every network.
    pub network: Option<String>,
    /// Pre-existing on-chain location on `network`.
    pub alias: Option<Address>,
}

impl Contract {
    /// A network-independent record; an address `source` makes it an alias.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            name: name.into(),
            alias: source_address(&source),
            source,
            network: None,
        }
    }

    pub fn is_alias(&self) -> bool {
        self.alias.is_some()
    }
}

/// The address a contract `source` names, if it is one rather than a path.
///
/// Only `0x`-prefixed or full-length hex counts, so short hex file names stay paths.
pub fn source_address(source: &str) -> Option<Address> {
    let hex_like = source.starts_with("0x") || source.len() == 16;
    hex_like.then(|| Address::from_hex(source).ok()).flatten()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, DerefMut, From)]
pub struct Contracts(pub Vec<Contract>);

impl Contracts {
    pub fn contains_name(&self, name: &str) -> bool {
        self.0.iter().any(|c| c.name == name)
    }

    /// The record for `name` on `network`, falling back to the network-independent one.
    pub fn by_name_and_network(&self, name: &str, network: &str) -> Option<&Contract> {
        self.0
            .iter()
            .find(|c| c.name == name && c.network.as_deref() == Some(network))
            .or_else(|| {
                self.0
                    .iter()
                    .find(|c| c.name == name && c.network.is_none())
            })
    }

    pub fn by_source(&self, source: &str) -> Option<&Contract> {
        self.0.iter().find(|c| c.source == source)
    }

    /// Contracts that resolve to an alias on `network`, one record per name.
    pub fn aliases_for_network<'a>(&'a self, network: &'a str) -> impl Iterator<Item = &'a Contract> {
        self.names()
            .into_iter()
            .filter_map(move |name| self.by_name_and_network(name, network))
            .filter(|c| c.is_alias())
    }

    /// Upsert keyed by `(name, network)`.
    pub fn add_or_update(&mut self, contract: Contract) {
        match self
            .0
            .iter_mut()
            .find(|c| c.name == contract.name && c.network == contract.network)
        {
            Some(existing) => *existing = contract,
            None => self.0.push(contract),
        }
    }

    /// Distinct names in first-appearance order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for contract in self.0.iter() {
            if !names.contains(&contract.name.as_str()) {
                names.push(&contract.name);
            }
        }
        names
    }
}

/// One contract entry of a deployment, with optional init arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractDeployment {
    pub name: String,
    pub args: Vec<Value>,
}

impl ContractDeployment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub network: String,
    pub account: String,
    pub contracts: Vec<ContractDeployment>,
}

impl Deployment {
    fn same_target(&self, other: &Deployment) -> bool {
        let names = |d: &Deployment| -> HashSet<String> {
            d.contracts.iter().map(|c| c.name.clone()).collect()
        };
        self.network == other.network
            && self.account == other.account
            && names(self) == names(other)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deref, DerefMut, From)]
pub struct Deployments(pub Vec<Deployment>);

impl Deployments {
    pub fn by_network<'a>(&'a self, network: &'a str) -> impl Iterator<Item = &'a Deployment> {
        self.0.iter().filter(move |d| d.network == network)
    }

    pub fn by_account_and_network(&self, account: &str, network: &str) -> Option<&Deployment> {
        self.0
            .iter()
            .find(|d| d.account == account && d.network == network)
    }

    /// Add unless an equivalent record is already present.
    pub fn add_if_absent(&mut self, deployment: Deployment) {
        if !self.0.iter().any(|d| d.same_target(&deployment)) {
            self.0.push(deployment);
        }
    }

    /// Add or replace the record for the same `(network, account)`.
    pub fn add_or_update(&mut self, deployment: Deployment) {
        match self
            .0
            .iter_mut()
            .find(|d| d.network == deployment.network && d.account == deployment.account)
        {
            Some(existing) => *existing = deployment,
            None => self.0.push(deployment),
        }
    }
}
