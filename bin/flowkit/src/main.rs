//! flowkit is a CLI to configure Flow projects and deploy their contracts.

mod cli;
mod display;
mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result};
use clap::Parser;

use cli::{AccountCommand, Cli, Command, ConfigCommand};
use flowkit::{
    Address, Error, Flowkit, Project,
    cadence::Value,
    config::{self, Loader, Network},
    crypto::{PrivateKey, PublicKey},
    fs::OsFs,
    transactions::templates::NewAccountKey,
};
use settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let settings = Settings::load()?;
    let ctx = settings.context();

    // Cancel in-flight work on Ctrl-C.
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    let loader = Loader::new(Arc::new(OsFs));

    match cli.command {
        Command::Init {
            service_private_key,
            service_sig_algo,
            service_hash_algo,
            path,
            reset,
        } => {
            if loader.exists(&path) && !reset {
                anyhow::bail!(
                    "Configuration already exists at {}, pass --reset to overwrite it",
                    path.display()
                );
            }
            let key = PrivateKey::from_hex(service_sig_algo, &service_private_key)
                .context("Invalid service private key")?;
            let project = Project::init(loader, path.clone(), key, service_hash_algo)?;
            project.save()?;
            println!("Configuration initialized at {}", path.display());
        }

        Command::Config { command } => {
            let mut project = load_project(loader, &cli.config_paths)?;
            match command {
                ConfigCommand::Show => {
                    for table in display::config(project.config()) {
                        println!("{table}");
                    }
                }
                ConfigCommand::AddNetwork { name, host } => {
                    project.add_or_update_network(Network::new(&name, host));
                    save(&project)?;
                    println!("Network {name} saved");
                }
                ConfigCommand::AddContract {
                    name,
                    source,
                    for_network,
                    alias,
                } => {
                    let alias = alias
                        .map(|a| Address::from_hex(&a))
                        .transpose()
                        .context("Invalid alias address")?;
                    let contract = config::Contract::new(&name, source);
                    project.add_or_update_contract(config::Contract {
                        network: for_network,
                        alias: alias.or(contract.alias),
                        ..contract
                    });
                    save(&project)?;
                    println!("Contract {name} saved");
                }
                ConfigCommand::RemoveAccount { name } => {
                    project.remove_account(&name)?;
                    save(&project)?;
                    println!("Account {name} removed");
                }
            }
        }

        Command::Deploy { update, dry_run } => {
            let project = load_project(loader, &cli.config_paths)?;
            let kit = Flowkit::for_network(project, &cli.network)?
                .with_sender_config(settings.sender_config());

            if dry_run {
                let preprocessor = kit.resolve_imports(&cli.network)?;
                println!("{}", display::deployment_order(&preprocessor.deployment_order()?));
                return Ok(());
            }

            match kit.deploy(&ctx, &cli.network, update).await {
                Ok(deployed) => println!("{}", display::deployed(&deployed)),
                Err(Error::Deployment(err)) => {
                    println!("{}", display::failures(&err));
                    anyhow::bail!("{} contract(s) failed to deploy", err.failures.len());
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("Failed to deploy to {}", cli.network));
                }
            }
        }

        Command::Account { command } => {
            let project = load_project(loader, &cli.config_paths)?;
            let kit = Flowkit::for_network(project, &cli.network)?
                .with_sender_config(settings.sender_config());

            match command {
                AccountCommand::Get { account, contracts } => {
                    let address = resolve_address(kit.project(), &account)?;
                    let on_chain = kit.get_account(&ctx, address).await?;
                    println!("{}", display::account(&on_chain));
                    println!("{}", display::account_keys(&on_chain));
                    if contracts {
                        for (name, code) in &on_chain.contracts {
                            println!("// {name}\n{}", String::from_utf8_lossy(code));
                        }
                    }
                }
                AccountCommand::Create {
                    keys,
                    sig_algo,
                    hash_algo,
                    signer,
                } => {
                    let keys = keys
                        .iter()
                        .map(|k| {
                            PublicKey::from_hex(sig_algo, k)
                                .map(|pk| NewAccountKey::new(pk, hash_algo))
                                .with_context(|| format!("Invalid public key {k}"))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    let address = kit.create_account(&ctx, &signer, &keys, &[]).await?;
                    println!("Account created at {address}");
                }
            }
        }

        Command::Script { path, args } => {
            let project = load_project(loader, &cli.config_paths)?;
            let kit = Flowkit::for_network(project, &cli.network)?;

            let code = std::fs::read(&path)
                .with_context(|| format!("Failed to read script {}", path.display()))?;
            let args = args
                .iter()
                .map(|raw| {
                    let json: serde_json::Value = serde_json::from_str(raw)
                        .with_context(|| format!("Argument is not JSON: {raw}"))?;
                    Value::from_json(&json).with_context(|| format!("Invalid argument {raw}"))
                })
                .collect::<Result<Vec<_>>>()?;

            let value = kit.execute_script(&ctx, &code, &args).await?;
            println!("{}", serde_json::to_string_pretty(&value.to_json())?);
        }
    }

    Ok(())
}

fn load_project(loader: Loader, paths: &[PathBuf]) -> Result<Project> {
    let paths = if paths.is_empty() {
        let cwd = std::env::current_dir().context("Failed to read the working directory")?;
        config::default_paths(loader.fs().as_ref(), &cwd)
    } else {
        paths.to_vec()
    };
    Project::load(loader, &paths).context("Failed to load the project configuration")
}

fn save(project: &Project) -> Result<()> {
    project
        .save()
        .context("Failed to save the project configuration")
}

/// An address literal, or the address of a configured account.
fn resolve_address(project: &Project, account: &str) -> Result<Address> {
    if let Ok(address) = Address::from_hex(account) {
        return Ok(address);
    }
    Ok(project.account_by_name(account)?.address)
}
