use std::sync::Arc;

use crate::{
    address::{Address, ChainId},
    config,
    error::{ConfigError, NotFoundError, Result},
    keys::{AccountKey, KeyContext},
    signer::Signer,
};

/// An account with key handles that can produce signers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub address: Address,
    pub chain: ChainId,
    pub keys: Vec<AccountKey>,
}

impl Account {
    pub fn from_config(account: &config::Account) -> Result<Self, ConfigError> {
        Ok(Self {
            name: account.name.clone(),
            address: account.address,
            chain: account.chain,
            keys: super::runtime_keys(account)?,
        })
    }

    pub fn to_config(&self) -> config::Account {
        config::Account {
            name: self.name.clone(),
            address: self.address,
            chain: self.chain,
            keys: self.keys.iter().map(AccountKey::to_config).collect(),
        }
    }

    /// The key transactions are proposed and signed with.
    pub fn default_key(&self) -> Result<&AccountKey> {
        self.keys.first().ok_or_else(|| {
            NotFoundError::AccountKey {
                address: self.address,
                index: 0,
            }
            .into()
        })
    }

    pub fn key(&self, index: u32) -> Result<&AccountKey> {
        self.keys
            .iter()
            .find(|k| k.index() == index)
            .ok_or_else(|| {
                NotFoundError::AccountKey {
                    address: self.address,
                    index,
                }
                .into()
            })
    }

    /// A signer for the default key.
    pub fn signer(&self, ctx: &KeyContext) -> Result<Arc<dyn Signer>> {
        Ok(self.default_key()?.signer(ctx)?)
    }
}
