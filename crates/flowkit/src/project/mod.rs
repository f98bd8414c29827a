//! The runtime project: configuration plus materialized accounts.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    address::{Address, ChainId},
    cadence::Value,
    config::{self, Config, Deployment, Emulator, Loader, Network},
    contracts::{Aliases, SourceLoader},
    crypto::{HashAlgorithm, PrivateKey},
    error::{ConfigError, Error, NotFoundError, Result},
    keys::{self, AccountKey, KeyContext},
    signer::Signer,
};

mod account;
pub use account::Account;

/// A contract to deploy from source, resolved against its deployment record.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractTarget {
    pub name: String,
    pub source: String,
    pub account: String,
    pub address: Address,
    pub args: Vec<Value>,
}

/// Configuration with runtime accounts, bound to the files it came from.
#[derive(Debug, Clone)]
pub struct Project {
    config: Config,
    loader: Loader,
    paths: Vec<PathBuf>,
    accounts: Vec<Account>,
    key_context: KeyContext,
}

impl Project {
    /// Load and compose `paths`; the last path is where changes are saved.
    pub fn load(loader: Loader, paths: &[PathBuf]) -> Result<Self> {
        let config = loader.load(paths)?;
        Self::new(loader, config, paths.to_vec())
    }

    /// Materialize runtime accounts from `config`.
    pub fn new(loader: Loader, config: Config, paths: Vec<PathBuf>) -> Result<Self> {
        let accounts = config
            .accounts
            .iter()
            .map(Account::from_config)
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            config,
            loader,
            paths,
            accounts,
            key_context: KeyContext::default(),
        })
    }

    /// A fresh project with the default emulator, networks and service account.
    pub fn init(
        loader: Loader,
        path: impl Into<PathBuf>,
        service_key: PrivateKey,
        hash_algorithm: HashAlgorithm,
    ) -> Result<Self> {
        let service = Account {
            name: Emulator::DEFAULT_SERVICE_ACCOUNT.to_string(),
            address: Address::service(ChainId::Emulator),
            chain: ChainId::Emulator,
            keys: vec![AccountKey::hex(0, service_key, hash_algorithm)],
        };
        let config = Config {
            emulators: vec![Emulator::default()].into(),
            networks: Network::defaults().into(),
            accounts: vec![service.to_config()].into(),
            ..Config::default()
        };
        config.validate()?;

        tracing::info!(address = %service.address, "Initialized project");
        Self::new(loader, config, vec![path.into()])
    }

    pub fn with_key_context(mut self, key_context: KeyContext) -> Self {
        self.key_context = key_context;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn key_context(&self) -> &KeyContext {
        &self.key_context
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// The file changes are written to.
    pub fn save_path(&self) -> Result<&Path> {
        self.paths
            .last()
            .map(PathBuf::as_path)
            .ok_or_else(|| ConfigError::semantics("project has no configuration path").into())
    }

    /// Directory contract sources are resolved against.
    pub fn root(&self) -> PathBuf {
        self.paths
            .last()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// A source loader rooted at the project directory.
    pub fn source_loader(&self) -> Arc<dyn SourceLoader> {
        Arc::new(crate::contracts::FsSourceLoader::new(
            self.loader.fs().clone(),
            self.root(),
        ))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(self.save_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.loader.save(&self.config, path)?;
        Ok(())
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn account_by_name(&self, name: &str) -> Result<&Account> {
        self.accounts
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| NotFoundError::AccountName(name.to_string()).into())
    }

    pub fn account_by_address(&self, address: Address) -> Option<&Account> {
        self.accounts.iter().find(|a| a.address == address)
    }

    /// Upsert by name in both the runtime list and the configuration.
    ///
    /// An account previously imported from another file is saved inline from now on.
    pub fn add_or_update_account(&mut self, account: Account) {
        self.config.inline_account(&account.name);
        self.config.accounts.add_or_update(account.to_config());
        match self.accounts.iter_mut().find(|a| a.name == account.name) {
            Some(existing) => *existing = account,
            None => self.accounts.push(account),
        }
    }

    pub fn remove_account(&mut self, name: &str) -> Result<()> {
        if !self.config.accounts.remove(name) {
            return Err(NotFoundError::AccountName(name.to_string()).into());
        }
        self.config.inline_account(name);
        self.accounts.retain(|a| a.name != name);
        Ok(())
    }

    pub fn add_or_update_contract(&mut self, contract: config::Contract) {
        self.config.contracts.add_or_update(contract);
    }

    pub fn add_or_update_network(&mut self, network: Network) {
        self.config.networks.add_or_update(network);
    }

    pub fn add_or_update_deployment(&mut self, deployment: Deployment) {
        self.config.deployments.add_or_update(deployment);
    }

    pub fn network(&self, name: &str) -> Result<&Network> {
        self.config
            .networks
            .by_name(name)
            .ok_or_else(|| NotFoundError::Network(name.to_string()).into())
    }

    pub fn host(&self, network: &str) -> Result<&str> {
        Ok(&self.network(network)?.host)
    }

    /// The default emulator's service account.
    pub fn service_account(&self) -> Result<&Account> {
        let name = self
            .config
            .emulators
            .default_emulator()
            .map(|e| e.service_account.as_str())
            .unwrap_or(Emulator::DEFAULT_SERVICE_ACCOUNT);
        self.account_by_name(name)
    }

    /// A signer for the default key of the account named `name`.
    pub fn signer(&self, name: &str) -> Result<Arc<dyn Signer>> {
        Ok(self.account_by_name(name)?.signer(&self.key_context)?)
    }

    /// Import keys for contracts aliased on `network`, by location and by name.
    pub fn aliases_for_network(&self, network: &str) -> Aliases {
        let loader = self.source_loader();
        let mut aliases = Aliases::new();
        for contract in self.config.contracts.aliases_for_network(network) {
            let Some(address) = contract.alias else {
                continue;
            };
            if !contract.source.is_empty() && config::source_address(&contract.source).is_none() {
                aliases.insert(loader.location(&contract.source), address);
            }
            aliases.insert(contract.name.clone(), address);
        }
        aliases
    }

    /// Names contracts deployed to more than one account on `network`.
    pub fn check_duplicate_deployments(&self, network: &str) -> Result<()> {
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for deployment in self.config.deployments.by_network(network) {
            for contract in &deployment.contracts {
                match owners.insert(&contract.name, &deployment.account) {
                    Some(previous) if previous != deployment.account => {
                        return Err(Error::DuplicateContractConflict {
                            contract: contract.name.clone(),
                            network: network.to_string(),
                        });
                    }
                    Some(_) => {
                        return Err(ConfigError::semantics(format!(
                            "contract {} is deployed to account {} more than once on {network}",
                            contract.name, deployment.account
                        ))
                        .into());
                    }
                    None => {}
                }
            }
        }
        Ok(())
    }

    /// Contracts to deploy on `network`, in deployment-record order.
    pub fn contract_deployments(&self, network: &str) -> Result<Vec<ContractTarget>> {
        self.network(network)?;

        let mut targets = Vec::new();
        for deployment in self.config.deployments.by_network(network) {
            let account = self.account_by_name(&deployment.account)?;
            for entry in &deployment.contracts {
                let contract = self
                    .config
                    .contracts
                    .by_name_and_network(&entry.name, network)
                    .ok_or_else(|| NotFoundError::Contract {
                        name: entry.name.clone(),
                        network: Some(network.to_string()),
                    })?;
                if contract.is_alias() {
                    return Err(ConfigError::semantics(format!(
                        "contract {} is an alias on {network} and cannot be deployed",
                        contract.name
                    ))
                    .into());
                }

                targets.push(ContractTarget {
                    name: contract.name.clone(),
                    source: contract.source.clone(),
                    account: account.name.clone(),
                    address: account.address,
                    args: entry.args.clone(),
                });
            }
        }
        Ok(targets)
    }
}

/// Build runtime keys for a configured account.
pub(crate) fn runtime_keys(account: &config::Account) -> Result<Vec<AccountKey>, ConfigError> {
    account.keys.iter().map(keys::new_account_key).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{ContractDeployment, tests::{SERVICE_KEY, sample_config}},
        crypto::SignatureAlgorithm,
        fs::MemoryFs,
    };

    fn project(config: Config) -> Project {
        let loader = Loader::new(Arc::new(MemoryFs::new()));
        Project::new(loader, config, vec![PathBuf::from("flow.json")]).unwrap()
    }

    #[test]
    fn test_accounts_materialized() {
        let project = project(sample_config());
        let service = project.service_account().unwrap();
        assert_eq!(service.address, Address::service(ChainId::Emulator));
        assert_eq!(service.default_key().unwrap().index(), 0);
        assert!(project.account_by_name("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_init_then_save_and_reload() {
        let fs = Arc::new(MemoryFs::new());
        let loader = Loader::new(fs.clone());
        let key = PrivateKey::from_hex(SignatureAlgorithm::EcdsaP256, SERVICE_KEY).unwrap();

        let project = Project::init(loader.clone(), "flow.json", key, HashAlgorithm::Sha3_256).unwrap();
        project.save().unwrap();

        let reloaded = Project::load(loader, &[PathBuf::from("flow.json")]).unwrap();
        assert_eq!(reloaded.config(), project.config());
        assert_eq!(reloaded.accounts(), project.accounts());
    }

    #[test]
    fn test_add_or_update_account_updates_config() {
        let mut project = project(sample_config());
        let key = PrivateKey::from_hex(SignatureAlgorithm::EcdsaP256, SERVICE_KEY).unwrap();
        project.add_or_update_account(Account {
            name: "alice".to_string(),
            address: Address::from_hex("01cf0e2f2f715450").unwrap(),
            chain: ChainId::Emulator,
            keys: vec![AccountKey::hex(0, key, HashAlgorithm::Sha3_256)],
        });

        assert!(project.config().accounts.by_name("alice").is_some());
        assert_eq!(project.accounts().len(), 2);

        project.remove_account("alice").unwrap();
        assert!(project.account_by_name("alice").is_err());
        assert!(project.remove_account("alice").is_err());
    }

    #[test]
    fn test_aliases_for_network() {
        let project = project(sample_config());
        let aliases = project.aliases_for_network("emulator");
        let ft = Address::from_hex("ee82856bf20e2aa6").unwrap();

        assert_eq!(aliases.get("FungibleToken.cdc"), Some(&ft));
        assert_eq!(aliases.get("FungibleToken"), Some(&ft));
        assert!(project.aliases_for_network("testnet").is_empty());
    }

    #[test]
    fn test_contract_deployments() {
        let project = project(sample_config());
        let targets = project.contract_deployments("emulator").unwrap();
        let names: Vec<_> = targets.iter().map(|t| t.name.as_str()).collect();

        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(targets[0].address, Address::service(ChainId::Emulator));
        assert!(project.contract_deployments("testnet").unwrap().is_empty());
        assert!(project.contract_deployments("nowhere").is_err());
    }

    #[test]
    fn test_aliased_contract_is_not_staged() {
        let mut config = sample_config();
        config.deployments[0]
            .contracts
            .push(ContractDeployment::new("FungibleToken"));
        let project = project(config);

        assert!(matches!(
            project.contract_deployments("emulator"),
            Err(Error::Config(ConfigError::InvalidSemantics(msg))) if msg.contains("FungibleToken")
        ));
    }

    #[test]
    fn test_address_source_alias_resolves_by_name() {
        let mut config = sample_config();
        config.contracts.add_or_update(config::Contract::new("FT", "0xee82856bf20e2aa6"));
        let project = project(config);

        let aliases = project.aliases_for_network("testnet");
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases.get("FT"), Some(&Address::from_hex("ee82856bf20e2aa6").unwrap()));
    }

    #[test]
    fn test_duplicate_deployment_conflict() {
        let mut config = sample_config();
        config.accounts.add_or_update(config::Account {
            name: "other".to_string(),
            address: Address::from_hex("01cf0e2f2f715450").unwrap(),
            chain: ChainId::Emulator,
            keys: vec![config::AccountKey::hex(SERVICE_KEY)],
        });
        config.deployments.add_or_update(Deployment {
            network: "emulator".to_string(),
            account: "other".to_string(),
            contracts: vec![ContractDeployment::new("A")],
        });
        let project = project(config);

        match project.check_duplicate_deployments("emulator") {
            Err(Error::DuplicateContractConflict { contract, network }) => {
                assert_eq!(contract, "A");
                assert_eq!(network, "emulator");
            }
            other => panic!("expected a conflict, got {other:?}"),
        }
        assert!(project.check_duplicate_deployments("testnet").is_ok());
    }
}
