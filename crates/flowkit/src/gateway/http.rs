//! Gateway over the Flow Access REST API.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use url::Url;

use crate::{
    address::Address,
    cadence::Value,
    context::Context,
    crypto::{HashAlgorithm, SignatureAlgorithm},
    error::{
        BlockRef, ConfigError, Error, ExecutionError, NotFoundError, Result, TransportError,
    },
    flow::{
        Block, BlockEvents, Collection, Event, FlowAccount, FlowAccountKey, Identifier,
        Transaction, TransactionResult, TransactionSignature, TransactionStatus,
    },
};

use super::Gateway;

/// Default timeout for REST requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between result polls when waiting for a seal.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const EMULATOR_GRPC_PORT: &str = "3569";
const EMULATOR_REST_PORT: u16 = 8888;

/// Map a network host from configuration to the REST endpoint serving it.
///
/// Full URLs pass through unchanged. Emulator gRPC hosts map to the emulator
/// REST port, public access nodes to their REST gateways.
pub fn rest_endpoint(host: &str) -> Result<Url, ConfigError> {
    let invalid = |e: url::ParseError| {
        ConfigError::InvalidSemantics(format!("invalid network host '{host}': {e}"))
    };

    if host.starts_with("http://") || host.starts_with("https://") {
        return Url::parse(host).map_err(invalid);
    }

    let url = match host {
        "access.mainnet.nodes.onflow.org:9000" => "https://rest-mainnet.onflow.org".to_string(),
        "access.devnet.nodes.onflow.org:9000" | "access.testnet.nodes.onflow.org:9000" => {
            "https://rest-testnet.onflow.org".to_string()
        }
        _ => match host.rsplit_once(':') {
            Some(("localhost", EMULATOR_GRPC_PORT)) => {
                format!("http://127.0.0.1:{EMULATOR_REST_PORT}")
            }
            Some((name, EMULATOR_GRPC_PORT)) => format!("http://{name}:{EMULATOR_REST_PORT}"),
            _ => format!("http://{host}"),
        },
    };
    Url::parse(&url).map_err(invalid)
}

fn backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(200))
        .with_max_times(3)
}

fn string_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        Raw::Number(n) => Ok(n),
    }
}

fn string_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = string_u64(deserializer)?;
    u32::try_from(value).map_err(serde::de::Error::custom)
}

fn base64_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let text = String::deserialize(deserializer)?;
    STANDARD.decode(text).map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize)]
struct AccountKeyWire {
    #[serde(deserialize_with = "string_u32")]
    index: u32,
    public_key: String,
    signing_algorithm: SignatureAlgorithm,
    hashing_algorithm: HashAlgorithm,
    #[serde(deserialize_with = "string_u64")]
    sequence_number: u64,
    #[serde(deserialize_with = "string_u32")]
    weight: u32,
    #[serde(default)]
    revoked: bool,
}

#[derive(Debug, Deserialize)]
struct AccountWire {
    address: Address,
    #[serde(deserialize_with = "string_u64")]
    balance: u64,
    #[serde(default)]
    keys: Vec<AccountKeyWire>,
    #[serde(default)]
    contracts: IndexMap<String, String>,
}

impl AccountWire {
    fn into_account(self) -> Result<FlowAccount, String> {
        let contracts = self
            .contracts
            .into_iter()
            .map(|(name, code)| {
                STANDARD
                    .decode(code)
                    .map(|code| (name.clone(), code))
                    .map_err(|e| format!("contract {name}: {e}"))
            })
            .collect::<Result<_, _>>()?;

        Ok(FlowAccount {
            address: self.address,
            balance: self.balance,
            keys: self
                .keys
                .into_iter()
                .map(|key| FlowAccountKey {
                    index: key.index,
                    public_key: key.public_key.trim_start_matches("0x").to_string(),
                    signature_algorithm: key.signing_algorithm,
                    hash_algorithm: key.hashing_algorithm,
                    weight: key.weight,
                    sequence_number: key.sequence_number,
                    revoked: key.revoked,
                })
                .collect(),
            contracts,
        })
    }
}

#[derive(Debug, Deserialize)]
struct BlockHeaderWire {
    id: Identifier,
    parent_id: Identifier,
    #[serde(deserialize_with = "string_u64")]
    height: u64,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GuaranteeWire {
    collection_id: Identifier,
}

#[derive(Debug, Default, Deserialize)]
struct BlockPayloadWire {
    #[serde(default)]
    collection_guarantees: Vec<GuaranteeWire>,
}

#[derive(Debug, Deserialize)]
struct BlockWire {
    header: BlockHeaderWire,
    #[serde(default)]
    payload: Option<BlockPayloadWire>,
}

impl From<BlockWire> for Block {
    fn from(wire: BlockWire) -> Self {
        Block {
            id: wire.header.id,
            parent_id: wire.header.parent_id,
            height: wire.header.height,
            timestamp: wire.header.timestamp,
            collection_ids: wire
                .payload
                .unwrap_or_default()
                .collection_guarantees
                .into_iter()
                .map(|g| g.collection_id)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EventWire {
    #[serde(rename = "type")]
    ty: String,
    transaction_id: Identifier,
    #[serde(deserialize_with = "string_u32")]
    transaction_index: u32,
    #[serde(deserialize_with = "string_u32")]
    event_index: u32,
    #[serde(deserialize_with = "base64_bytes")]
    payload: Vec<u8>,
}

impl EventWire {
    fn into_event(self) -> Result<Event, String> {
        let payload = Value::decode(&self.payload).map_err(|e| e.to_string())?;
        Ok(Event {
            ty: self.ty,
            transaction_id: self.transaction_id,
            transaction_index: self.transaction_index,
            event_index: self.event_index,
            payload,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TransactionResultWire {
    #[serde(default)]
    block_id: Option<String>,
    status: String,
    #[serde(default)]
    status_code: u32,
    #[serde(default)]
    error_message: String,
    #[serde(default)]
    events: Vec<EventWire>,
}

impl TransactionResultWire {
    fn into_result(self, id: Identifier) -> Result<TransactionResult, String> {
        let status = self
            .status
            .parse::<TransactionStatus>()
            .unwrap_or(TransactionStatus::Unknown);
        let events = self
            .events
            .into_iter()
            .map(EventWire::into_event)
            .collect::<Result<_, _>>()?;
        let block_id = self
            .block_id
            .filter(|id| !id.is_empty())
            .map(|id| id.parse::<Identifier>())
            .transpose()
            .map_err(|e| e.to_string())?
            .filter(|id| *id != Identifier::EMPTY);

        Ok(TransactionResult {
            transaction_id: id,
            status,
            status_code: self.status_code,
            error_message: self.error_message,
            events,
            block_id,
            block_height: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct BlockEventsWire {
    block_id: Identifier,
    #[serde(deserialize_with = "string_u64")]
    block_height: u64,
    block_timestamp: DateTime<Utc>,
    #[serde(default)]
    events: Vec<EventWire>,
}

#[derive(Debug, Deserialize)]
struct CollectionTransactionWire {
    id: Identifier,
}

#[derive(Debug, Deserialize)]
struct CollectionWire {
    id: Identifier,
    #[serde(default)]
    transactions: Vec<CollectionTransactionWire>,
}

#[derive(Debug, Deserialize)]
struct SubmittedWire {
    id: Identifier,
}

#[derive(Debug, Serialize)]
struct ProposalKeyWire {
    address: String,
    key_index: String,
    sequence_number: String,
}

#[derive(Debug, Serialize)]
struct SignatureWire {
    address: String,
    key_index: String,
    signature: String,
}

impl From<&TransactionSignature> for SignatureWire {
    fn from(sig: &TransactionSignature) -> Self {
        Self {
            address: sig.address.to_hex(),
            key_index: sig.key_index.to_string(),
            signature: STANDARD.encode(&sig.signature),
        }
    }
}

#[derive(Debug, Serialize)]
struct TransactionWire {
    script: String,
    arguments: Vec<String>,
    reference_block_id: String,
    gas_limit: String,
    payer: String,
    proposal_key: ProposalKeyWire,
    authorizers: Vec<String>,
    payload_signatures: Vec<SignatureWire>,
    envelope_signatures: Vec<SignatureWire>,
}

impl From<&Transaction> for TransactionWire {
    fn from(tx: &Transaction) -> Self {
        Self {
            script: STANDARD.encode(&tx.script),
            arguments: tx.arguments.iter().map(|a| STANDARD.encode(a)).collect(),
            reference_block_id: tx.reference_block_id.to_hex(),
            gas_limit: tx.gas_limit.to_string(),
            payer: tx.payer.to_hex(),
            proposal_key: ProposalKeyWire {
                address: tx.proposal_key.address.to_hex(),
                key_index: tx.proposal_key.key_index.to_string(),
                sequence_number: tx.proposal_key.sequence_number.to_string(),
            },
            authorizers: tx.authorizers.iter().map(Address::to_hex).collect(),
            payload_signatures: tx.payload_signatures.iter().map(Into::into).collect(),
            envelope_signatures: tx.envelope_signatures.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ScriptWire {
    script: String,
    arguments: Vec<String>,
}

/// Replace a 404 with the lookup miss it stands for.
fn or_not_found(err: Error, missing: NotFoundError) -> Error {
    match err {
        Error::Transport(TransportError::Status { status: 404, .. }) => missing.into(),
        other => other,
    }
}

/// A [`Gateway`] talking to an access node's REST API.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    endpoint: Url,
    poll_interval: Duration,
}

impl HttpGateway {
    /// Connect to the REST API serving the network `host`.
    pub fn new(host: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Request {
                endpoint: host.to_string(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint: rest_endpoint(host)?,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.endpoint.as_str().trim_end_matches('/'))
    }

    fn decode_error(&self, reason: impl std::fmt::Display) -> Error {
        TransportError::Decode {
            endpoint: self.endpoint.to_string(),
            reason: reason.to_string(),
        }
        .into()
    }

    /// Send a request and decode a JSON body, surfacing non-2xx statuses.
    async fn send<T: DeserializeOwned + Send>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TransportError> {
        let endpoint = self.endpoint.to_string();
        let response = request.send().await.map_err(|e| TransportError::Request {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let message = body
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
                .to_string();
            return Err(TransportError::Status {
                endpoint,
                status: status.as_u16(),
                message,
            });
        }

        response.json().await.map_err(|e| TransportError::Decode {
            endpoint,
            reason: e.to_string(),
        })
    }

    /// GET with retries on transient failures.
    async fn get<T: DeserializeOwned + Send>(
        &self,
        ctx: &Context,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(path);
        let fetch = || self.send::<T>(self.client.get(&url).query(query));

        ctx.run(async {
            let value = fetch
                .retry(backoff())
                .when(TransportError::is_transient)
                .notify(|err, delay| {
                    tracing::debug!(error = %err, delay = ?delay, url = %url, "Retrying request");
                })
                .await?;
            Ok(value)
        })
        .await
    }

    async fn first_block(
        &self,
        ctx: &Context,
        path: &str,
        query: &[(&str, String)],
        missing: BlockRef,
    ) -> Result<Block> {
        let blocks: Vec<BlockWire> = self
            .get(ctx, path, query)
            .await
            .map_err(|e| or_not_found(e, NotFoundError::Block(missing.clone())))?;
        blocks
            .into_iter()
            .next()
            .map(Block::from)
            .ok_or_else(|| NotFoundError::Block(missing).into())
    }

    async fn fetch_result(&self, ctx: &Context, id: &Identifier) -> Result<TransactionResult> {
        let wire: TransactionResultWire = self
            .get(ctx, &format!("transaction_results/{id}"), &[])
            .await
            .map_err(|e| or_not_found(e, NotFoundError::Transaction(id.to_hex())))?;
        wire.into_result(*id).map_err(|e| self.decode_error(e))
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn get_account(&self, ctx: &Context, address: Address) -> Result<FlowAccount> {
        let wire: AccountWire = self
            .get(
                ctx,
                &format!("accounts/{}", address.to_hex()),
                &[("expand", "contracts,keys".to_string())],
            )
            .await
            .map_err(|e| or_not_found(e, NotFoundError::Account(address)))?;
        wire.into_account().map_err(|e| self.decode_error(e))
    }

    async fn send_signed_transaction(&self, ctx: &Context, tx: &Transaction) -> Result<Identifier> {
        let request = self
            .client
            .post(self.url("transactions"))
            .json(&TransactionWire::from(tx));

        let submitted: SubmittedWire = ctx
            .run(async {
                self.send(request).await.map_err(|e| match e {
                    TransportError::Status {
                        endpoint,
                        status: 400,
                        message,
                    } => Error::Rejected {
                        endpoint,
                        reason: message,
                    },
                    other => Error::from(other),
                })
            })
            .await?;

        tracing::debug!(tx_id = %submitted.id, endpoint = %self.endpoint, "Transaction submitted");
        Ok(submitted.id)
    }

    async fn get_transaction_result(
        &self,
        ctx: &Context,
        id: &Identifier,
        wait_sealed: bool,
    ) -> Result<TransactionResult> {
        loop {
            let result = self.fetch_result(ctx, id).await?;
            if !wait_sealed || result.status.is_final() {
                return Ok(result);
            }
            tracing::trace!(tx_id = %id, status = %result.status, "Waiting for seal");
            ctx.sleep(self.poll_interval).await?;
        }
    }

    async fn execute_script(&self, ctx: &Context, script: &[u8], args: &[Value]) -> Result<Value> {
        let body = ScriptWire {
            script: STANDARD.encode(script),
            arguments: args.iter().map(|a| STANDARD.encode(a.encode())).collect(),
        };
        let request = self
            .client
            .post(self.url("scripts"))
            .query(&[("block_height", "sealed")])
            .json(&body);

        let encoded: String = ctx
            .run(async {
                self.send(request).await.map_err(|e| match e {
                    TransportError::Status {
                        status: 400,
                        message,
                        ..
                    } => Error::from(ExecutionError::Script { reason: message }),
                    other => Error::from(other),
                })
            })
            .await?;

        let bytes = STANDARD.decode(encoded).map_err(|e| self.decode_error(e))?;
        Ok(Value::decode(&bytes)?)
    }

    async fn get_latest_block(&self, ctx: &Context) -> Result<Block> {
        self.first_block(
            ctx,
            "blocks",
            &[
                ("height", "sealed".to_string()),
                ("expand", "payload".to_string()),
            ],
            BlockRef::Id("sealed".to_string()),
        )
        .await
    }

    async fn get_block_by_id(&self, ctx: &Context, id: &Identifier) -> Result<Block> {
        self.first_block(
            ctx,
            &format!("blocks/{id}"),
            &[("expand", "payload".to_string())],
            BlockRef::Id(id.to_hex()),
        )
        .await
    }

    async fn get_block_by_height(&self, ctx: &Context, height: u64) -> Result<Block> {
        self.first_block(
            ctx,
            "blocks",
            &[
                ("height", height.to_string()),
                ("expand", "payload".to_string()),
            ],
            BlockRef::Height(height),
        )
        .await
    }

    async fn get_events(
        &self,
        ctx: &Context,
        ty: &str,
        start_height: u64,
        end_height: u64,
    ) -> Result<Vec<BlockEvents>> {
        let wire: Vec<BlockEventsWire> = self
            .get(
                ctx,
                "events",
                &[
                    ("type", ty.to_string()),
                    ("start_height", start_height.to_string()),
                    ("end_height", end_height.to_string()),
                ],
            )
            .await?;

        wire.into_iter()
            .map(|block| {
                Ok(BlockEvents {
                    block_id: block.block_id,
                    block_height: block.block_height,
                    block_timestamp: block.block_timestamp,
                    events: block
                        .events
                        .into_iter()
                        .map(EventWire::into_event)
                        .collect::<Result<_, _>>()
                        .map_err(|e| self.decode_error(e))?,
                })
            })
            .collect()
    }

    async fn get_collection(&self, ctx: &Context, id: &Identifier) -> Result<Collection> {
        let wire: CollectionWire = self
            .get(
                ctx,
                &format!("collections/{id}"),
                &[("expand", "transactions".to_string())],
            )
            .await
            .map_err(|e| or_not_found(e, NotFoundError::Collection(id.to_hex())))?;
        Ok(Collection {
            id: wire.id,
            transaction_ids: wire.transactions.into_iter().map(|t| t.id).collect(),
        })
    }
}
