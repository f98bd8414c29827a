//! Chain entities returned by a gateway.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    address::Address,
    cadence::Value,
    crypto::{HashAlgorithm, SignatureAlgorithm},
    error::{CadenceError, Error, ExecutionError, NotFoundError},
};

/// Fully qualified type of the event emitted when an account is created.
pub const ACCOUNT_CREATED_EVENT: &str = "flow.AccountCreated";

/// A 32-byte block, collection or transaction identifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier([u8; 32]);

impl Identifier {
    pub const EMPTY: Identifier = Identifier([0; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_hex(value: &str) -> Result<Self, CadenceError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(value.trim().trim_start_matches("0x"), &mut bytes)
            .map_err(|e| CadenceError::Invalid(format!("identifier '{value}': {e}")))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.to_hex())
    }
}

impl FromStr for Identifier {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Identifier::from_hex(&value).map_err(serde::de::Error::custom)
    }
}

/// Lifecycle status of a submitted transaction, ordered by progress.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
)]
pub enum TransactionStatus {
    #[default]
    Unknown,
    Pending,
    Finalized,
    Executed,
    Sealed,
    Expired,
}

impl TransactionStatus {
    /// No further status change will be observed.
    pub fn is_final(self) -> bool {
        self >= TransactionStatus::Sealed
    }
}

/// An event emitted during transaction execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub ty: String,
    pub transaction_id: Identifier,
    pub transaction_index: u32,
    pub event_index: u32,
    pub payload: Value,
}

impl Event {
    /// A payload field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.field(name)
    }
}

/// Events of one type emitted within one block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockEvents {
    pub block_id: Identifier,
    pub block_height: u64,
    pub block_timestamp: DateTime<Utc>,
    pub events: Vec<Event>,
}

/// Observed outcome of a transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionResult {
    pub transaction_id: Identifier,
    pub status: TransactionStatus,
    pub status_code: u32,
    /// Empty when execution succeeded.
    pub error_message: String,
    pub events: Vec<Event>,
    pub block_id: Option<Identifier>,
    pub block_height: Option<u64>,
}

impl TransactionResult {
    pub fn is_sealed(&self) -> bool {
        self.status == TransactionStatus::Sealed
    }

    pub fn has_error(&self) -> bool {
        !self.error_message.is_empty()
    }

    /// The execution failure carried by this result, if any.
    pub fn error(&self) -> Option<ExecutionError> {
        self.has_error().then(|| ExecutionError::Transaction {
            tx_id: self.transaction_id.to_hex(),
            reason: self.error_message.clone(),
        })
    }

    /// Turn an errored result into an error.
    pub fn into_execution_result(self) -> Result<Self, ExecutionError> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    /// The first event of type `ty`.
    pub fn event_of_type(&self, ty: &str) -> Result<&Event, ExecutionError> {
        self.events
            .iter()
            .find(|event| event.ty == ty)
            .ok_or_else(|| ExecutionError::MissingExpectedEvent {
                event_type: ty.to_string(),
            })
    }
}

/// Payload of `flow.AccountCreated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountCreated {
    pub address: Address,
}

impl AccountCreated {
    pub fn from_event(event: &Event) -> Result<Self, Error> {
        let address = event
            .field("address")
            .and_then(Value::as_address)
            .ok_or_else(|| {
                CadenceError::Invalid(format!("{} without an address field", event.ty))
            })?;
        Ok(Self { address })
    }

    /// Extract the created account from a successful result.
    pub fn from_result(result: &TransactionResult) -> Result<Self, Error> {
        if let Some(err) = result.error() {
            return Err(err.into());
        }
        Self::from_event(result.event_of_type(ACCOUNT_CREATED_EVENT)?)
    }
}

/// Header fields of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: Identifier,
    pub parent_id: Identifier,
    pub height: u64,
    pub timestamp: DateTime<Utc>,
    pub collection_ids: Vec<Identifier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub id: Identifier,
    pub transaction_ids: Vec<Identifier>,
}

/// A public key registered on an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowAccountKey {
    pub index: u32,
    /// 64-byte uncompressed point, hex without prefix.
    pub public_key: String,
    pub signature_algorithm: SignatureAlgorithm,
    pub hash_algorithm: HashAlgorithm,
    pub weight: u32,
    pub sequence_number: u64,
    pub revoked: bool,
}

/// On-chain state of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowAccount {
    pub address: Address,
    pub balance: u64,
    pub keys: Vec<FlowAccountKey>,
    /// Deployed contract code by name.
    pub contracts: IndexMap<String, Vec<u8>>,
}

impl FlowAccount {
    pub fn has_contract(&self, name: &str) -> bool {
        self.contracts.contains_key(name)
    }

    pub fn contract_names(&self) -> Vec<&str> {
        self.contracts.keys().map(String::as_str).collect()
    }

    pub fn key(&self, index: u32) -> Result<&FlowAccountKey, NotFoundError> {
        self.keys
            .iter()
            .find(|key| key.index == index)
            .ok_or(NotFoundError::AccountKey {
                address: self.address,
                index,
            })
    }
}
