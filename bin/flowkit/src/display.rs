//! Table rendering of command results.

use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use flowkit::{
    Config, DeployedContract,
    contracts::Contract,
    error::DeploymentError,
    flow::FlowAccount,
};

/// Balances are stored in units of 10^-8 FLOW.
const FLOW_DECIMALS: u64 = 100_000_000;

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

pub fn format_balance(balance: u64) -> String {
    format!("{}.{:08}", balance / FLOW_DECIMALS, balance % FLOW_DECIMALS)
}

pub fn deployed(contracts: &[DeployedContract]) -> Table {
    let mut table = table(&["Contract", "Account", "Address", "Outcome", "Transaction"]);
    for c in contracts {
        table.add_row(vec![
            c.name.clone(),
            c.account.clone(),
            c.address.to_string(),
            c.outcome.to_string(),
            c.transaction_id.as_ref().map(ToString::to_string).unwrap_or_default(),
        ]);
    }
    table
}

pub fn failures(err: &DeploymentError) -> Table {
    let mut table = table(&["Contract", "Stage", "Error"]);
    for f in &err.failures {
        table.add_row(vec![f.contract.clone(), f.stage.to_string(), f.error.to_string()]);
    }
    table
}

pub fn deployment_order(contracts: &[&Contract]) -> Table {
    let mut table = table(&["#", "Contract", "Target", "Location", "Imports"]);
    for (i, c) in contracts.iter().enumerate() {
        let imports: Vec<&str> = c
            .dependencies()
            .keys()
            .chain(c.aliases().keys())
            .map(String::as_str)
            .collect();
        table.add_row(vec![
            (i + 1).to_string(),
            c.name().to_string(),
            c.target().to_string(),
            c.location().to_string(),
            imports.join(", "),
        ]);
    }
    table
}

pub fn account(account: &FlowAccount) -> Table {
    let mut table = table(&["Field", "Value"]);
    table.add_row(vec!["Address".to_string(), account.address.to_string()]);
    table.add_row(vec!["Balance".to_string(), format_balance(account.balance)]);
    table.add_row(vec![
        "Contracts".to_string(),
        account.contract_names().join(", "),
    ]);
    table
}

pub fn account_keys(account: &FlowAccount) -> Table {
    let mut table = table(&[
        "Index",
        "Public key",
        "Signature",
        "Hash",
        "Weight",
        "Sequence",
        "Revoked",
    ]);
    for key in &account.keys {
        table.add_row(vec![
            key.index.to_string(),
            key.public_key.clone(),
            key.signature_algorithm.to_string(),
            key.hash_algorithm.to_string(),
            key.weight.to_string(),
            key.sequence_number.to_string(),
            key.revoked.to_string(),
        ]);
    }
    table
}

/// Configuration overview. Key material is never printed.
pub fn config(config: &Config) -> Vec<Table> {
    let mut networks = table(&["Network", "Host", "Chain"]);
    for n in config.networks.iter() {
        networks.add_row(vec![
            n.name.clone(),
            n.host.clone(),
            n.chain().map(|c| c.to_string()).unwrap_or_default(),
        ]);
    }

    let mut accounts = table(&["Account", "Address", "Chain", "Keys"]);
    for a in config.accounts.iter() {
        let keys: Vec<String> = a
            .keys
            .iter()
            .map(|k| format!("{}#{} {}/{}", k.key_type, k.index, k.signature_algorithm, k.hash_algorithm))
            .collect();
        accounts.add_row(vec![
            a.name.clone(),
            a.address.to_string(),
            a.chain.to_string(),
            keys.join(", "),
        ]);
    }

    let mut contracts = table(&["Contract", "Source", "Network", "Alias"]);
    for c in config.contracts.iter() {
        contracts.add_row(vec![
            c.name.clone(),
            c.source.clone(),
            c.network.clone().unwrap_or_default(),
            c.alias.map(|a| a.to_string()).unwrap_or_default(),
        ]);
    }

    let mut deployments = table(&["Network", "Account", "Contracts"]);
    for d in config.deployments.iter() {
        let names: Vec<&str> = d.contracts.iter().map(|c| c.name.as_str()).collect();
        deployments.add_row(vec![d.network.clone(), d.account.clone(), names.join(", ")]);
    }

    vec![networks, accounts, contracts, deployments]
}
