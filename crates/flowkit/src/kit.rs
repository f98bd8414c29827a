//! Services bundling a project with a gateway.

use std::sync::Arc;

use crate::{
    address::Address,
    cadence::Value,
    context::Context,
    contracts::Preprocessor,
    deployer::{DeployedContract, Deployer},
    error::Result,
    flow::{
        AccountCreated, Block, BlockEvents, Collection, FlowAccount, Identifier, Transaction,
        TransactionResult,
    },
    gateway::{Gateway, HttpGateway},
    project::Project,
    transactions::{
        SenderConfig, TransactionSender,
        templates::{self, NewAccountKey},
    },
};

/// Entry point for the operations a command line maps onto.
pub struct Flowkit {
    project: Project,
    gateway: Arc<dyn Gateway>,
    sender_config: SenderConfig,
}

impl Flowkit {
    pub fn new(project: Project, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            project,
            gateway,
            sender_config: SenderConfig::default(),
        }
    }

    /// Connect to `network` over its REST API.
    pub fn for_network(project: Project, network: &str) -> Result<Self> {
        let gateway = HttpGateway::new(project.host(network)?)?;
        tracing::debug!(network = %network, endpoint = %gateway.endpoint(), "Using HTTP gateway");
        Ok(Self::new(project, Arc::new(gateway)))
    }

    pub fn with_sender_config(mut self, config: SenderConfig) -> Self {
        self.sender_config = config;
        self
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn project_mut(&mut self) -> &mut Project {
        &mut self.project
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    pub fn sender(&self) -> TransactionSender {
        TransactionSender::new(self.gateway.clone(), self.project.key_context().clone())
            .with_config(self.sender_config)
    }

    pub async fn get_account(&self, ctx: &Context, address: Address) -> Result<FlowAccount> {
        self.gateway.get_account(ctx, address).await
    }

    pub async fn execute_script(&self, ctx: &Context, script: &[u8], args: &[Value]) -> Result<Value> {
        self.gateway.execute_script(ctx, script, args).await
    }

    /// Prepare, sign and send `tx` with the account named `signer`.
    ///
    /// A sealed result carrying an execution error is returned as is.
    pub async fn send_transaction(
        &self,
        ctx: &Context,
        signer: &str,
        tx: Transaction,
    ) -> Result<TransactionResult> {
        let account = self.project.account_by_name(signer)?;
        self.sender().send_transaction(ctx, account, tx).await
    }

    /// Create an account paid for by `payer`, returning its address.
    pub async fn create_account(
        &self,
        ctx: &Context,
        payer: &str,
        keys: &[NewAccountKey],
        contracts: &[(String, String)],
    ) -> Result<Address> {
        let result = self
            .send_transaction(ctx, payer, templates::create_account(keys, contracts))
            .await?;
        let created = AccountCreated::from_result(&result)?;
        tracing::info!(address = %created.address, payer = %payer, "Account created");
        Ok(created.address)
    }

    pub async fn get_transaction_result(
        &self,
        ctx: &Context,
        id: &Identifier,
        wait_sealed: bool,
    ) -> Result<TransactionResult> {
        self.gateway.get_transaction_result(ctx, id, wait_sealed).await
    }

    pub async fn get_latest_block(&self, ctx: &Context) -> Result<Block> {
        self.gateway.get_latest_block(ctx).await
    }

    pub async fn get_block_by_id(&self, ctx: &Context, id: &Identifier) -> Result<Block> {
        self.gateway.get_block_by_id(ctx, id).await
    }

    pub async fn get_block_by_height(&self, ctx: &Context, height: u64) -> Result<Block> {
        self.gateway.get_block_by_height(ctx, height).await
    }

    pub async fn get_events(
        &self,
        ctx: &Context,
        ty: &str,
        start_height: u64,
        end_height: u64,
    ) -> Result<Vec<BlockEvents>> {
        self.gateway.get_events(ctx, ty, start_height, end_height).await
    }

    pub async fn get_collection(&self, ctx: &Context, id: &Identifier) -> Result<Collection> {
        self.gateway.get_collection(ctx, id).await
    }

    fn deployer(&self) -> Deployer<'_> {
        Deployer::new(&self.project, self.gateway.clone()).with_sender_config(self.sender_config)
    }

    /// Stage and resolve the contracts deployed on `network` without sending anything.
    pub fn resolve_imports(&self, network: &str) -> Result<Preprocessor> {
        self.deployer().preprocess(network)
    }

    pub async fn deploy(
        &self,
        ctx: &Context,
        network: &str,
        update: bool,
    ) -> Result<Vec<DeployedContract>> {
        self.deployer().deploy(ctx, network, update).await
    }
}

impl std::fmt::Debug for Flowkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flowkit")
            .field("project", &self.project)
            .field("sender_config", &self.sender_config)
            .finish_non_exhaustive()
    }
}
