//! Shared fixtures: an in-memory project and a scripted gateway.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use flowkit::{
    Address, ChainId, Context, Gateway, Project,
    cadence::{CompositeKind, Value},
    config::Loader,
    crypto::{HashAlgorithm, PrivateKey, PublicKey, SignatureAlgorithm},
    error::{BlockRef, ExecutionError, NotFoundError, Result, ValidationError},
    flow::{
        ACCOUNT_CREATED_EVENT, Block, BlockEvents, Collection, Event, FlowAccount, FlowAccountKey,
        Identifier, Transaction, TransactionResult, TransactionStatus,
    },
    fs::MemoryFs,
    transactions::{SenderConfig, templates},
};

pub const SERVICE_KEY: &str = "2272967fd2bd75234ae9037dd4694c1f00baad63a10c35172bf65fbb8ad74b47";

pub const CONFIG_PATH: &str = "/project/flow.json";

/// Install a debug-level subscriber writing to the test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn service_address() -> Address {
    Address::service(ChainId::Emulator)
}

pub fn service_key() -> PrivateKey {
    PrivateKey::from_hex(SignatureAlgorithm::EcdsaP256, SERVICE_KEY).unwrap()
}

/// A fast-polling sender configuration.
pub fn fast_sender() -> SenderConfig {
    SenderConfig {
        poll_interval: Duration::from_millis(1),
        ..SenderConfig::default()
    }
}

/// A project whose files live in memory under `/project`.
pub struct TestProject {
    pub fs: Arc<MemoryFs>,
}

impl TestProject {
    pub fn new(config: serde_json::Value) -> Self {
        let fs = Arc::new(MemoryFs::new());
        fs.insert(CONFIG_PATH, config.to_string());
        Self { fs }
    }

    pub fn with_source(self, path: &str, code: &str) -> Self {
        self.fs.insert(PathBuf::from("/project").join(path), code);
        self
    }

    pub fn loader(&self) -> Loader {
        Loader::new(self.fs.clone()).with_env(|_| None)
    }

    pub fn load(&self) -> Project {
        Project::load(self.loader(), &[PathBuf::from(CONFIG_PATH)]).unwrap()
    }
}

/// The emulator account plus `deployments` on the emulator network.
pub fn deployment_config(
    contracts: serde_json::Value,
    deployments: serde_json::Value,
) -> serde_json::Value {
    serde_json::json!({
        "networks": {"emulator": "127.0.0.1:3569"},
        "accounts": {
            "emulator-account": {"address": "f8d6e0586b0a20c7", "keys": SERVICE_KEY},
        },
        "contracts": contracts,
        "deployments": {"emulator": deployments},
    })
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<Address, FlowAccount>,
    blocks: Vec<Block>,
    results: HashMap<Identifier, TransactionResult>,
    submitted: Vec<Transaction>,
    /// Pending answers left before a transaction reports sealed.
    pending: HashMap<Identifier, u32>,
    polls: u32,
    pending_polls: u32,
    failing_contracts: HashSet<String>,
    unreachable: HashSet<Address>,
    drop_account_created: bool,
    script_result: Option<Value>,
    scripts: Vec<(Vec<u8>, Vec<Value>)>,
    next_account: u64,
}

/// A scripted in-memory access node.
///
/// Submitted transactions have their envelope signature and sequence number
/// checked, then are interpreted against the built-in templates: contract
/// additions and updates change the authorizer's contracts, account creation
/// allocates a fresh address and emits `flow.AccountCreated`. Every
/// submission produces a new block.
#[derive(Debug)]
pub struct FakeGateway {
    state: Mutex<State>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        let genesis = block(0, Identifier::EMPTY);
        Self {
            state: Mutex::new(State {
                blocks: vec![genesis],
                next_account: 0x01cf_0e2f_2f71_5450,
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Register an account holding `key` at index 0.
    pub fn with_account(self, address: Address, key: &PrivateKey, hash: HashAlgorithm) -> Self {
        let account = FlowAccount {
            address,
            balance: 100_000_000,
            keys: vec![FlowAccountKey {
                index: 0,
                public_key: key.public_key().to_hex(),
                signature_algorithm: key.algorithm(),
                hash_algorithm: hash,
                weight: templates::FULL_KEY_WEIGHT,
                sequence_number: 0,
                revoked: false,
            }],
            ..FlowAccount::default()
        };
        self.lock().accounts.insert(address, account);
        self
    }

    /// The service account with the shared test key.
    pub fn with_service_account(self) -> Self {
        self.with_account(service_address(), &service_key(), HashAlgorithm::Sha3_256)
    }

    pub fn with_contract(self, address: Address, name: &str, code: &str) -> Self {
        if let Some(account) = self.lock().accounts.get_mut(&address) {
            account.contracts.insert(name.to_string(), code.as_bytes().to_vec());
        }
        self
    }

    /// Deploying `name` seals with an execution error.
    pub fn failing_contract(self, name: &str) -> Self {
        self.lock().failing_contracts.insert(name.to_string());
        self
    }

    /// Account lookups of `address` fail as if the node were unreachable.
    pub fn unreachable(self, address: Address) -> Self {
        self.lock().unreachable.insert(address);
        self
    }

    /// Every transaction reports pending this many times before sealing.
    pub fn pending_polls(self, polls: u32) -> Self {
        self.lock().pending_polls = polls;
        self
    }

    /// Account creations seal without their event.
    pub fn without_account_created_event(self) -> Self {
        self.lock().drop_account_created = true;
        self
    }

    pub fn with_script_result(self, value: Value) -> Self {
        self.lock().script_result = Some(value);
        self
    }

    pub fn submitted(&self) -> Vec<Transaction> {
        self.lock().submitted.clone()
    }

    pub fn scripts(&self) -> Vec<(Vec<u8>, Vec<Value>)> {
        self.lock().scripts.clone()
    }

    pub fn polls(&self) -> u32 {
        self.lock().polls
    }

    pub fn account(&self, address: Address) -> Option<FlowAccount> {
        self.lock().accounts.get(&address).cloned()
    }

    pub fn contract_code(&self, address: Address, name: &str) -> Option<String> {
        self.account(address)?
            .contracts
            .get(name)
            .map(|code| String::from_utf8_lossy(code).into_owned())
    }

    pub fn latest_block(&self) -> Block {
        self.lock().blocks.last().cloned().unwrap()
    }

    pub fn block_at(&self, height: u64) -> Block {
        self.lock().blocks[height as usize].clone()
    }
}

fn block(height: u64, parent_id: Identifier) -> Block {
    let mut id = [0u8; 32];
    id[..8].copy_from_slice(&(height + 1).to_be_bytes());
    Block {
        id: Identifier::from_bytes(id),
        parent_id,
        height,
        timestamp: Utc::now(),
        collection_ids: Vec::new(),
    }
}

fn hex_string(value: &Value) -> Vec<u8> {
    value
        .as_str()
        .and_then(|s| hex::decode(s).ok())
        .unwrap_or_default()
}

impl State {
    fn verify(&self, tx: &Transaction) -> Result<()> {
        for signature in &tx.envelope_signatures {
            let account = self
                .accounts
                .get(&signature.address)
                .ok_or(NotFoundError::Account(signature.address))?;
            let key = account.key(signature.key_index)?;
            let public_key = PublicKey::from_hex(key.signature_algorithm, &key.public_key)?;
            tx.verify_envelope_signature(signature, &public_key, key.hash_algorithm)?;
        }

        let proposer = self
            .accounts
            .get(&tx.proposal_key.address)
            .ok_or(NotFoundError::Account(tx.proposal_key.address))?;
        let expected = proposer.key(tx.proposal_key.key_index)?.sequence_number;
        if expected != tx.proposal_key.sequence_number {
            return Err(ValidationError::InvalidSignature {
                address: tx.proposal_key.address,
                key_index: tx.proposal_key.key_index,
                reason: format!(
                    "sequence number {} does not match {expected}",
                    tx.proposal_key.sequence_number
                ),
            }
            .into());
        }

        if !self.blocks.iter().any(|b| b.id == tx.reference_block_id) {
            return Err(NotFoundError::Block(BlockRef::Id(tx.reference_block_id.to_hex())).into());
        }
        Ok(())
    }

    /// Apply the effects of a template transaction, returning its error message and events.
    fn execute(&mut self, tx: &Transaction, id: Identifier) -> (String, Vec<Event>) {
        let script = String::from_utf8_lossy(&tx.script).into_owned();
        let args = tx.decoded_arguments();
        let authorizer = tx.authorizers.first().copied().unwrap_or(tx.payer);

        if script.contains("signer.contracts.add(") || script == templates::UPDATE_CONTRACT {
            let name = args[0].as_str().unwrap_or_default().to_string();
            if self.failing_contracts.contains(&name) {
                return (format!("error: cannot deploy contract {name}"), Vec::new());
            }
            let code = hex_string(&args[1]);
            if let Some(account) = self.accounts.get_mut(&authorizer) {
                account.contracts.insert(name, code);
            }
            return (String::new(), Vec::new());
        }

        if script == templates::CREATE_ACCOUNT {
            let address = Address::from_u64(self.next_account);
            self.next_account += 1;

            let Value::Array(public_keys) = &args[0] else {
                return ("error: malformed keys".to_string(), Vec::new());
            };
            let keys = public_keys
                .iter()
                .enumerate()
                .map(|(i, key)| FlowAccountKey {
                    index: i as u32,
                    public_key: key.as_str().unwrap_or_default().to_string(),
                    signature_algorithm: SignatureAlgorithm::EcdsaP256,
                    hash_algorithm: HashAlgorithm::Sha3_256,
                    weight: templates::FULL_KEY_WEIGHT,
                    sequence_number: 0,
                    revoked: false,
                })
                .collect();
            self.accounts.insert(
                address,
                FlowAccount {
                    address,
                    keys,
                    ..FlowAccount::default()
                },
            );

            if self.drop_account_created {
                return (String::new(), Vec::new());
            }
            let event = Event {
                ty: ACCOUNT_CREATED_EVENT.to_string(),
                transaction_id: id,
                transaction_index: 0,
                event_index: 0,
                payload: Value::Composite {
                    kind: CompositeKind::Event,
                    id: ACCOUNT_CREATED_EVENT.to_string(),
                    fields: vec![("address".to_string(), Value::Address(address))],
                },
            };
            return (String::new(), vec![event]);
        }

        (String::new(), Vec::new())
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn get_account(&self, ctx: &Context, address: Address) -> Result<FlowAccount> {
        ctx.check()?;
        let state = self.lock();
        if state.unreachable.contains(&address) {
            return Err(flowkit::error::TransportError::Request {
                endpoint: "fake".to_string(),
                reason: "connection refused".to_string(),
            }
            .into());
        }
        state
            .accounts
            .get(&address)
            .cloned()
            .ok_or_else(|| NotFoundError::Account(address).into())
    }

    async fn send_signed_transaction(&self, ctx: &Context, tx: &Transaction) -> Result<Identifier> {
        ctx.check()?;
        let mut state = self.lock();
        state.verify(tx)?;

        let id = tx.id();
        let proposer = state
            .accounts
            .get_mut(&tx.proposal_key.address)
            .ok_or(NotFoundError::Account(tx.proposal_key.address))?;
        if let Some(key) = proposer
            .keys
            .iter_mut()
            .find(|k| k.index == tx.proposal_key.key_index)
        {
            key.sequence_number += 1;
        }

        let (error_message, events) = state.execute(tx, id);

        let parent = state.blocks.last().map(|b| b.id).unwrap_or_default();
        let sealed_in = block(state.blocks.len() as u64, parent);
        let result = TransactionResult {
            transaction_id: id,
            status: TransactionStatus::Sealed,
            status_code: u32::from(!error_message.is_empty()),
            error_message,
            events,
            block_id: Some(sealed_in.id),
            block_height: Some(sealed_in.height),
        };
        state.blocks.push(sealed_in);
        state.results.insert(id, result);
        let pending = state.pending_polls;
        state.pending.insert(id, pending);
        state.submitted.push(tx.clone());
        Ok(id)
    }

    async fn get_transaction_result(
        &self,
        ctx: &Context,
        id: &Identifier,
        _wait_sealed: bool,
    ) -> Result<TransactionResult> {
        ctx.check()?;
        let mut state = self.lock();
        state.polls += 1;
        if let Some(left) = state.pending.get_mut(id).filter(|left| **left > 0) {
            *left -= 1;
            return Ok(TransactionResult {
                transaction_id: *id,
                status: TransactionStatus::Pending,
                ..TransactionResult::default()
            });
        }
        state
            .results
            .get(id)
            .cloned()
            .ok_or_else(|| NotFoundError::Transaction(id.to_hex()).into())
    }

    async fn execute_script(&self, ctx: &Context, script: &[u8], args: &[Value]) -> Result<Value> {
        ctx.check()?;
        let mut state = self.lock();
        state.scripts.push((script.to_vec(), args.to_vec()));
        state.script_result.clone().ok_or_else(|| {
            ExecutionError::Script {
                reason: "no result scripted".to_string(),
            }
            .into()
        })
    }

    async fn get_latest_block(&self, ctx: &Context) -> Result<Block> {
        ctx.check()?;
        Ok(self.latest_block())
    }

    async fn get_block_by_id(&self, ctx: &Context, id: &Identifier) -> Result<Block> {
        ctx.check()?;
        self.lock()
            .blocks
            .iter()
            .find(|b| b.id == *id)
            .cloned()
            .ok_or_else(|| NotFoundError::Block(BlockRef::Id(id.to_hex())).into())
    }

    async fn get_block_by_height(&self, ctx: &Context, height: u64) -> Result<Block> {
        ctx.check()?;
        self.lock()
            .blocks
            .get(height as usize)
            .cloned()
            .ok_or_else(|| NotFoundError::Block(BlockRef::Height(height)).into())
    }

    async fn get_events(
        &self,
        ctx: &Context,
        ty: &str,
        start_height: u64,
        end_height: u64,
    ) -> Result<Vec<BlockEvents>> {
        ctx.check()?;
        let state = self.lock();
        let events = state
            .blocks
            .iter()
            .filter(|b| (start_height..=end_height).contains(&b.height))
            .map(|b| BlockEvents {
                block_id: b.id,
                block_height: b.height,
                block_timestamp: b.timestamp,
                events: state
                    .results
                    .values()
                    .filter(|r| r.block_id == Some(b.id))
                    .flat_map(|r| r.events.iter().filter(|e| e.ty == ty).cloned())
                    .collect(),
            })
            .collect();
        Ok(events)
    }

    async fn get_collection(&self, ctx: &Context, id: &Identifier) -> Result<Collection> {
        ctx.check()?;
        Err(NotFoundError::Collection(id.to_hex()).into())
    }
}
