//! Deploying a project's contracts to a network.

use std::sync::Arc;

use crate::{
    address::Address,
    context::Context,
    contracts::{Contract, Preprocessor},
    error::{ContractFailure, DeploymentError, Error, FailureStage, Result},
    flow::Identifier,
    gateway::Gateway,
    project::{Account, Project},
    transactions::{SenderConfig, TransactionSender},
};

/// What happened to a contract during a deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum DeployOutcome {
    #[strum(serialize = "added")]
    Added,
    #[strum(serialize = "updated")]
    Updated,
    /// Already present and updates were not requested.
    #[strum(serialize = "skipped")]
    Skipped,
}

/// A contract that reached a successful terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContract {
    pub name: String,
    pub account: String,
    pub address: Address,
    pub outcome: DeployOutcome,
    /// Absent for skipped contracts.
    pub transaction_id: Option<Identifier>,
}

/// Deploys every contract of a network's deployment records, one at a time.
pub struct Deployer<'a> {
    project: &'a Project,
    gateway: Arc<dyn Gateway>,
    sender: TransactionSender,
}

impl<'a> Deployer<'a> {
    pub fn new(project: &'a Project, gateway: Arc<dyn Gateway>) -> Self {
        let sender = TransactionSender::new(gateway.clone(), project.key_context().clone());
        Self {
            project,
            gateway,
            sender,
        }
    }

    pub fn with_sender_config(mut self, config: SenderConfig) -> Self {
        self.sender = self.sender.with_config(config);
        self
    }

    /// Stage every contract deployed on `network` and resolve its imports.
    ///
    /// Contracts are staged in deployment-record order, so a contract's index
    /// matches its position in [`Project::contract_deployments`].
    pub fn preprocess(&self, network: &str) -> Result<Preprocessor> {
        self.project.check_duplicate_deployments(network)?;

        let mut preprocessor = Preprocessor::new(
            self.project.source_loader(),
            self.project.aliases_for_network(network),
        );
        for target in self.project.contract_deployments(network)? {
            preprocessor.add_contract_source_with_args(
                &target.name,
                &target.source,
                target.address,
                target.args,
            )?;
        }
        preprocessor.resolve_imports()?;
        Ok(preprocessor)
    }

    /// Deploy to `network`, updating already-present contracts when `update` is set.
    ///
    /// Per-contract failures do not stop the run; they are returned together
    /// as a [`DeploymentError`] after the last contract. Cancellation aborts.
    pub async fn deploy(
        &self,
        ctx: &Context,
        network: &str,
        update: bool,
    ) -> Result<Vec<DeployedContract>> {
        let preprocessor = self.preprocess(network)?;
        let order = preprocessor.deployment_order()?;
        let targets = self.project.contract_deployments(network)?;

        tracing::info!(network = %network, contracts = order.len(), update, "Deploying contracts");

        let mut deployed = Vec::with_capacity(order.len());
        let mut failures = Vec::new();

        for contract in order {
            ctx.check()?;
            let account = self.project.account_by_name(&targets[contract.index()].account)?;

            match self.deploy_contract(ctx, account, contract, update).await {
                Ok(result) => deployed.push(result),
                Err((_, err)) if err.is_cancellation() => return Err(err),
                Err((stage, err)) => {
                    tracing::warn!(
                        contract = %contract.name(),
                        account = %account.name,
                        stage = %stage,
                        error = %err,
                        "Contract deployment failed"
                    );
                    failures.push(ContractFailure {
                        contract: contract.name().to_string(),
                        stage,
                        error: Box::new(err),
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(DeploymentError { failures }.into());
        }
        tracing::info!(network = %network, contracts = deployed.len(), "Deployment complete");
        Ok(deployed)
    }

    async fn deploy_contract(
        &self,
        ctx: &Context,
        account: &Account,
        contract: &Contract,
        update: bool,
    ) -> Result<DeployedContract, (FailureStage, Error)> {
        let on_chain = self
            .gateway
            .get_account(ctx, account.address)
            .await
            .map_err(|e| (FailureStage::NetworkUnreachable, e))?;

        let exists = on_chain.has_contract(contract.name());
        let mut result = DeployedContract {
            name: contract.name().to_string(),
            account: account.name.clone(),
            address: account.address,
            outcome: DeployOutcome::Skipped,
            transaction_id: None,
        };

        if exists && !update {
            tracing::warn!(
                contract = %contract.name(),
                account = %account.name,
                "Contract already deployed, use --update to update it"
            );
            return Ok(result);
        }

        let tx = self.sender.contract_transaction(contract, exists);
        let sealed = async {
            let tx = self.sender.prepare(ctx, account, tx).await?;
            let tx = self.sender.sign(account, tx).await?;
            self.sender.send(ctx, &tx).await
        }
        .await
        .map_err(|e| (FailureStage::SubmissionFailed, e))?;

        if let Some(err) = sealed.error() {
            return Err((FailureStage::Execution, err.into()));
        }

        result.outcome = if exists {
            DeployOutcome::Updated
        } else {
            DeployOutcome::Added
        };
        result.transaction_id = Some(sealed.transaction_id);

        tracing::info!(
            contract = %contract.name(),
            account = %account.name,
            address = %account.address,
            outcome = %result.outcome,
            tx_id = %sealed.transaction_id,
            "Contract deployed"
        );
        Ok(result)
    }
}
