//! Assembling, signing, submitting and awaiting transactions.

use std::{sync::Arc, time::Duration};

use crate::{
    context::Context,
    contracts::Contract,
    error::{Result, ValidationError},
    flow::{Identifier, MAX_GAS_LIMIT, Transaction, TransactionResult, TransactionStatus},
    gateway::{DEFAULT_POLL_INTERVAL, Gateway},
    keys::KeyContext,
    project::Account,
};

pub mod templates;

/// Tunables of the send-and-poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderConfig {
    pub gas_limit: u64,
    pub poll_interval: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            gas_limit: MAX_GAS_LIMIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Sends transactions on behalf of project accounts.
#[derive(Clone)]
pub struct TransactionSender {
    gateway: Arc<dyn Gateway>,
    key_context: KeyContext,
    config: SenderConfig,
}

impl TransactionSender {
    pub fn new(gateway: Arc<dyn Gateway>, key_context: KeyContext) -> Self {
        Self {
            gateway,
            key_context,
            config: SenderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SenderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Fill in the reference block, proposal key, payer and authorizer.
    ///
    /// The sequence number is read from the chain at call time.
    pub async fn prepare(&self, ctx: &Context, signer: &Account, tx: Transaction) -> Result<Transaction> {
        let block = self.gateway.get_latest_block(ctx).await?;
        let key_index = signer.default_key()?.index();
        let on_chain = self.gateway.get_account(ctx, signer.address).await?;
        let sequence_number = on_chain.key(key_index)?.sequence_number;

        let gas_limit = if tx.gas_limit == 0 {
            self.config.gas_limit
        } else {
            tx.gas_limit
        };

        tracing::debug!(
            signer = %signer.address,
            key_index,
            sequence_number,
            reference_block = %block.id,
            "Prepared transaction"
        );

        Ok(tx
            .with_reference_block_id(block.id)
            .with_gas_limit(gas_limit)
            .with_proposal_key(signer.address, key_index, sequence_number)
            .with_payer(signer.address)
            .with_authorizer(signer.address))
    }

    /// Sign the envelope with the signer's default key.
    pub async fn sign(&self, signer: &Account, mut tx: Transaction) -> Result<Transaction> {
        let key = signer.default_key()?;
        let signature = key
            .signer(&self.key_context)?
            .sign(&tx.envelope_message())
            .await?;
        tx.add_envelope_signature(signer.address, key.index(), signature)?;
        Ok(tx)
    }

    /// Submit a signed transaction and wait for its seal.
    pub async fn send(&self, ctx: &Context, tx: &Transaction) -> Result<TransactionResult> {
        tx.validate()?;
        let id = self.gateway.send_signed_transaction(ctx, tx).await?;
        tracing::debug!(tx_id = %id, "Transaction submitted");

        let result = self.wait_sealed(ctx, &id).await?;
        if result.status == TransactionStatus::Expired {
            return Err(self.expired(ctx, tx).await.into());
        }
        Ok(result)
    }

    /// Poll until the transaction reaches a final status.
    pub async fn wait_sealed(&self, ctx: &Context, id: &Identifier) -> Result<TransactionResult> {
        loop {
            ctx.check()?;
            let result = self.gateway.get_transaction_result(ctx, id, false).await?;
            if result.status.is_final() {
                tracing::debug!(tx_id = %id, status = %result.status, "Transaction finalized");
                return Ok(result);
            }
            tracing::trace!(tx_id = %id, status = %result.status, "Transaction not sealed yet");
            ctx.sleep(self.config.poll_interval).await?;
        }
    }

    async fn expired(&self, ctx: &Context, tx: &Transaction) -> ValidationError {
        let reference_height = self
            .gateway
            .get_block_by_id(ctx, &tx.reference_block_id)
            .await
            .map(|b| b.height)
            .unwrap_or_default();
        let final_height = self
            .gateway
            .get_latest_block(ctx)
            .await
            .map(|b| b.height)
            .unwrap_or_default();
        ValidationError::ExpiredTransaction {
            reference_height,
            final_height,
        }
    }

    /// Prepare, sign and send `tx` as `signer`.
    pub async fn send_transaction(
        &self,
        ctx: &Context,
        signer: &Account,
        tx: Transaction,
    ) -> Result<TransactionResult> {
        let tx = self.prepare(ctx, signer, tx).await?;
        let tx = self.sign(signer, tx).await?;
        self.send(ctx, &tx).await
    }

    /// The unsigned transaction deploying or updating `contract`.
    pub fn contract_transaction(&self, contract: &Contract, update: bool) -> Transaction {
        let code = contract.transpiled_code();
        let tx = if update {
            templates::update_contract(contract.name(), &code)
        } else {
            templates::add_contract(
                contract.name(),
                &code,
                &contract.program().init_parameters,
                contract.args(),
            )
        };
        tx.with_gas_limit(self.config.gas_limit)
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
