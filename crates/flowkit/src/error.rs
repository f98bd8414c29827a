//! Error taxonomy shared by every flowkit component.
//!
//! Each concern owns a tagged enum (configuration, preprocessing, gateway
//! lookups, validation, execution, transport, signing) and [`Error`] wraps
//! them so callers can match on the kind while `?` keeps working across
//! module boundaries.

use std::{fmt, path::PathBuf};

use thiserror::Error;

use crate::address::{Address, ChainId};

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error returned by flowkit operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Cadence(#[from] CadenceError),

    #[error("transaction rejected by {endpoint}: {reason}")]
    Rejected { endpoint: String, reason: String },

    #[error("storage error: {reason}")]
    Storage { reason: String },

    #[error("contract {contract} is deployed to more than one account on network {network}")]
    DuplicateContractConflict { contract: String, network: String },

    #[error(transparent)]
    Deployment(#[from] DeploymentError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl Error {
    /// Whether the error was produced by a cancellation or an expired deadline.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }

    /// Whether the error is a lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Failures while loading, parsing, validating or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("no configuration parser registered for format '{format}'")]
    ParserNotFound { format: String },

    #[error("invalid configuration syntax in {}: {message}", .path.display())]
    InvalidSyntax { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    InvalidSemantics(String),

    #[error("invalid key type '{0}'")]
    InvalidKeyType(String),

    #[error("missing key context field '{field}'")]
    MissingContextField { field: String },

    #[error("invalid account key: {reason}")]
    InvalidKey { reason: String },

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Attach the offending path to a syntax error produced by a parser.
    pub fn at_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            ConfigError::InvalidSyntax { message, .. } => ConfigError::InvalidSyntax {
                path: path.into(),
                message,
            },
            other => other,
        }
    }

    pub(crate) fn syntax(message: impl fmt::Display) -> Self {
        ConfigError::InvalidSyntax {
            path: PathBuf::new(),
            message: message.to_string(),
        }
    }

    pub(crate) fn semantics(message: impl fmt::Display) -> Self {
        ConfigError::InvalidSemantics(message.to_string())
    }
}

/// Failures while decoding an address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid address hex '{0}'")]
    InvalidHex(String),

    #[error("address '{value}' is longer than {max} bytes")]
    TooLong { value: String, max: usize },

    #[error("the service address needs a chain")]
    MissingChain,
}

/// Failures produced by a signer.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid private key for {algorithm}")]
    InvalidPrivateKey { algorithm: String },

    #[error("invalid public key: {reason}")]
    InvalidPublicKey { reason: String },

    #[error("signing failed: {reason}")]
    Signing { reason: String },

    #[error("invalid KMS resource id '{0}'")]
    InvalidKmsResource(String),

    #[error("KMS request for {resource} failed: {reason}")]
    Kms { resource: String, reason: String },

    #[error("no KMS credentials available: {0}")]
    MissingCredentials(String),
}

/// Failures while preprocessing contract sources.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("failed to load contract source {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("import from {from} could not be resolved: {missing}")]
    UnresolvedImport { from: String, missing: String },

    #[error("import cycle detected: {}", format_cycles(.cycles))]
    CyclicImport { cycles: Vec<Vec<String>> },

    #[error("contract {contract} expects {expected} init arguments but {got} were provided")]
    InitArguments {
        contract: String,
        expected: usize,
        got: usize,
    },
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| format!("[{}]", cycle.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// How a block lookup was keyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRef {
    Id(String),
    Height(u64),
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRef::Id(id) => write!(f, "id {id}"),
            BlockRef::Height(height) => write!(f, "height {height}"),
        }
    }
}

/// Lookup misses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFoundError {
    #[error("block with {0} not found")]
    Block(BlockRef),

    #[error("transaction {0} not found")]
    Transaction(String),

    #[error("collection {0} not found")]
    Collection(String),

    #[error("account {0} not found")]
    Account(Address),

    #[error("key {index} not found on account {address}")]
    AccountKey { address: Address, index: u32 },

    #[error("contract {name} not found{}", .network.as_ref().map(|n| format!(" on network {n}")).unwrap_or_default())]
    Contract { name: String, network: Option<String> },

    #[error("network {0} not found")]
    Network(String),

    #[error("account named {0} not found")]
    AccountName(String),
}

/// Transaction and address validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("duplicate transaction {0}")]
    DuplicateTransaction(String),

    #[error("incomplete transaction, missing fields: {}", .missing_fields.join(", "))]
    IncompleteTransaction { missing_fields: Vec<String> },

    #[error("transaction expired: reference block height {reference_height}, final height {final_height}")]
    ExpiredTransaction {
        reference_height: u64,
        final_height: u64,
    },

    #[error("invalid script: {0}")]
    InvalidScript(String),

    #[error("invalid gas limit {limit}, must be between 1 and {max}")]
    InvalidGasLimit { limit: u64, max: u64 },

    #[error("invalid signature from {address} key {key_index}: {reason}")]
    InvalidSignature {
        address: Address,
        key_index: u32,
        reason: String,
    },

    #[error("missing signature from {address}")]
    MissingSignature { address: Address },

    #[error("address {address} is not valid on chain {chain}")]
    InvalidAddressForChain { address: Address, chain: ChainId },
}

/// Failures reported by on-chain execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("transaction {tx_id} failed: {reason}")]
    Transaction { tx_id: String, reason: String },

    #[error("script execution failed: {reason}")]
    Script { reason: String },

    #[error("expected event {event_type} was not emitted")]
    MissingExpectedEvent { event_type: String },
}

/// Network-level failures talking to a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("unexpected response from {endpoint} (status {status}): {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("failed to decode response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
}

impl TransportError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Request { .. } => true,
            TransportError::Status { status, .. } => *status >= 500 || *status == 429,
            TransportError::Decode { .. } => false,
        }
    }
}

/// Failures encoding or decoding JSON-Cadence values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CadenceError {
    #[error("invalid JSON-Cadence value: {0}")]
    Invalid(String),

    #[error("unsupported JSON-Cadence type '{0}'")]
    UnsupportedType(String),
}

/// Where a contract stopped in the per-contract deployment state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum FailureStage {
    /// The target account or the latest block could not be fetched.
    #[strum(serialize = "network unreachable")]
    NetworkUnreachable,
    /// Signing or submission failed.
    #[strum(serialize = "submission failed")]
    SubmissionFailed,
    /// The transaction was sealed with an error.
    #[strum(serialize = "execution failed")]
    Execution,
}

/// A single contract that failed to deploy.
#[derive(Debug)]
pub struct ContractFailure {
    pub contract: String,
    pub stage: FailureStage,
    pub error: Box<Error>,
}

impl fmt::Display for ContractFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.contract, self.stage, self.error)
    }
}

/// Aggregate of every per-contract failure of a deployment run.
#[derive(Debug, Error)]
#[error("failed to deploy {} contract(s): {}", .failures.len(), .failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct DeploymentError {
    pub failures: Vec<ContractFailure>,
}

impl DeploymentError {
    /// Names of the contracts that failed, in deployment order.
    pub fn contracts(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.contract.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_import_message_lists_cycles() {
        let err = PreprocessError::CyclicImport {
            cycles: vec![
                vec!["E".to_string(), "F".to_string()],
                vec!["X".to_string(), "Y".to_string(), "Z".to_string()],
            ],
        };
        assert_eq!(err.to_string(), "import cycle detected: [E, F]; [X, Y, Z]");
    }

    #[test]
    fn test_syntax_error_carries_path() {
        let err = ConfigError::syntax("expected value at line 1").at_path("flow.json");
        assert_eq!(
            err.to_string(),
            "invalid configuration syntax in flow.json: expected value at line 1"
        );
    }

    #[test]
    fn test_deployment_error_lists_failures() {
        let err = DeploymentError {
            failures: vec![ContractFailure {
                contract: "Token".to_string(),
                stage: FailureStage::Execution,
                error: Box::new(Error::Execution(ExecutionError::Transaction {
                    tx_id: "ab".to_string(),
                    reason: "panic".to_string(),
                })),
            }],
        };
        assert_eq!(err.contracts(), vec!["Token"]);
        assert!(err.to_string().contains("Token (execution failed)"));
    }

    #[test]
    fn test_transient_transport_errors() {
        let request = TransportError::Request {
            endpoint: "http://localhost".to_string(),
            reason: "connection refused".to_string(),
        };
        let client = TransportError::Status {
            endpoint: "http://localhost".to_string(),
            status: 400,
            message: "bad request".to_string(),
        };
        assert!(request.is_transient());
        assert!(!client.is_transient());
    }
}
