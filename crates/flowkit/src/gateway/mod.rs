//! The boundary between flowkit and a Flow access node.

use async_trait::async_trait;

use crate::{
    address::Address,
    cadence::Value,
    context::Context,
    error::Result,
    flow::{Block, BlockEvents, Collection, FlowAccount, Identifier, Transaction, TransactionResult},
};

mod http;
pub use http::{DEFAULT_POLL_INTERVAL, HttpGateway, rest_endpoint};

/// Operations flowkit needs from the chain.
///
/// Every call takes the caller's [`Context`] and must return promptly once it
/// is cancelled.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn get_account(&self, ctx: &Context, address: Address) -> Result<FlowAccount>;

    /// Submit a fully signed transaction, returning its id.
    async fn send_signed_transaction(&self, ctx: &Context, tx: &Transaction) -> Result<Identifier>;

    /// The current result of a transaction, or its final result when `wait_sealed` is set.
    async fn get_transaction_result(
        &self,
        ctx: &Context,
        id: &Identifier,
        wait_sealed: bool,
    ) -> Result<TransactionResult>;

    async fn execute_script(&self, ctx: &Context, script: &[u8], args: &[Value]) -> Result<Value>;

    /// The latest sealed block.
    async fn get_latest_block(&self, ctx: &Context) -> Result<Block>;

    async fn get_block_by_id(&self, ctx: &Context, id: &Identifier) -> Result<Block>;

    async fn get_block_by_height(&self, ctx: &Context, height: u64) -> Result<Block>;

    /// Events of type `ty` in the inclusive height range.
    async fn get_events(
        &self,
        ctx: &Context,
        ty: &str,
        start_height: u64,
        end_height: u64,
    ) -> Result<Vec<BlockEvents>>;

    async fn get_collection(&self, ctx: &Context, id: &Identifier) -> Result<Collection>;
}
