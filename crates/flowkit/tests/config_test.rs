//! Configuration loading, composition and saving against the host filesystem.

mod common;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use flowkit::{
    Address, ChainId, Project,
    config::{self, ContractDeployment, Deployment, Loader},
    crypto::HashAlgorithm,
    fs::OsFs,
};
use serde_json::json;
use tempdir::TempDir;

use common::{SERVICE_KEY, service_address, service_key};

const OTHER_KEY: &str = "21c5dfdeb0ff03a7a73ef39788563b62c89adea67bbb21ab95e5f710bd1d40b7";

fn loader() -> Loader {
    Loader::new(Arc::new(OsFs)).with_env(|_| None)
}

fn write_json(dir: &Path, name: &str, value: &serde_json::Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, value.to_string()).unwrap();
    path
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn admin(key: &str) -> serde_json::Value {
    json!({"accounts": {"admin": {"address": "service", "chain": "flow-emulator", "keys": key}}})
}

#[test]
fn test_simple_form_survives_load_and_save() -> Result<()> {
    let dir = TempDir::new("flowkit")?;
    let input = write_json(
        dir.path(),
        "flow.json",
        &json!({"accounts": {"a": {"address": "service", "chain": "flow-emulator", "keys": SERVICE_KEY}}}),
    );
    let output = dir.path().join("saved.json");

    let loader = loader();
    let config = loader.load(&[input])?;
    loader.save(&config, &output)?;

    assert_eq!(
        read_json(&output),
        json!({"accounts": {"a": {"address": "f8d6e0586b0a20c7", "chain": "flow-emulator", "keys": SERVICE_KEY}}})
    );
    Ok(())
}

#[test]
fn test_non_default_index_written_in_advanced_form() -> Result<()> {
    let dir = TempDir::new("flowkit")?;
    let input = write_json(
        dir.path(),
        "flow.json",
        &json!({"accounts": {"a": {
            "address": "f8d6e0586b0a20c7",
            "keys": [{"type": "hex", "index": 1, "context": {"privateKey": SERVICE_KEY}}],
        }}}),
    );
    let output = dir.path().join("saved.json");

    let loader = loader();
    loader.save(&loader.load(&[input])?, &output)?;

    let keys = &read_json(&output)["accounts"]["a"]["keys"];
    assert!(keys.is_array());
    assert_eq!(keys[0]["index"], json!(1));
    assert_eq!(keys[0]["context"]["privateKey"], json!(SERVICE_KEY));
    Ok(())
}

#[test]
fn test_later_files_override_earlier_ones() -> Result<()> {
    let dir = TempDir::new("flowkit")?;
    let first = write_json(dir.path(), "1.json", &admin(SERVICE_KEY));
    let second = write_json(dir.path(), "2.json", &admin(OTHER_KEY));

    let project = Project::load(loader(), &[first, second.clone()])?;

    let admin = project.config().accounts.by_name("admin").unwrap();
    assert_eq!(admin.keys[0].private_key(), Some(OTHER_KEY));
    assert_eq!(project.accounts().len(), 1);
    assert_eq!(project.save_path()?, second.as_path());
    Ok(())
}

#[test]
fn test_env_reference_substituted() -> Result<()> {
    let dir = TempDir::new("flowkit")?;
    let path = write_json(dir.path(), "flow.json", &admin("${env:EMULATOR_KEY}"));

    let loader = Loader::new(Arc::new(OsFs))
        .with_env(|name| (name == "EMULATOR_KEY").then(|| OTHER_KEY.to_string()));
    let config = loader.load(&[path])?;

    assert_eq!(
        config.accounts.by_name("admin").unwrap().keys[0].private_key(),
        Some(OTHER_KEY)
    );
    Ok(())
}

#[test]
fn test_account_imported_from_sibling_file() -> Result<()> {
    let dir = TempDir::new("flowkit")?;
    fs::create_dir_all(dir.path().join("keys"))?;
    write_json(
        dir.path(),
        "keys/private.json",
        &json!({"accounts": {"deployer": {"address": "01cf0e2f2f715450", "keys": OTHER_KEY}}}),
    );
    let main = write_json(
        dir.path(),
        "flow.json",
        &json!({"accounts": {
            "admin": {"address": "service", "chain": "flow-emulator", "keys": SERVICE_KEY},
            "deployer": {"fromFile": "./keys/private.json"},
        }}),
    );

    let project = Project::load(loader(), &[main])?;

    let deployer = project.account_by_name("deployer")?;
    assert_eq!(deployer.address, Address::from_hex("01cf0e2f2f715450")?);
    assert_eq!(deployer.chain, ChainId::Emulator);
    Ok(())
}

#[test]
fn test_imported_account_saved_as_reference() -> Result<()> {
    let dir = TempDir::new("flowkit")?;
    write_json(
        dir.path(),
        "private.json",
        &json!({"accounts": {"deployer": {"address": "01cf0e2f2f715450", "keys": OTHER_KEY}}}),
    );
    let main = write_json(
        dir.path(),
        "flow.json",
        &json!({"accounts": {
            "emulator-account": {"address": "service", "chain": "flow-emulator", "keys": SERVICE_KEY},
            "deployer": {"fromFile": "./private.json"},
        }}),
    );

    let mut project = Project::load(loader(), &[main.clone()])?;
    project.add_or_update_contract(config::Contract::new("A", "./A.cdc"));
    project.save()?;

    let saved = fs::read_to_string(&main)?;
    assert!(!saved.contains(OTHER_KEY));
    assert_eq!(
        read_json(&main)["accounts"]["deployer"],
        json!({"fromFile": "./private.json"})
    );

    let reloaded = Project::load(loader(), &[main])?;
    assert_eq!(
        reloaded.account_by_name("deployer")?.address,
        Address::from_hex("01cf0e2f2f715450")?
    );
    Ok(())
}

#[test]
fn test_env_key_saved_as_reference() -> Result<()> {
    let dir = TempDir::new("flowkit")?;
    let path = write_json(dir.path(), "flow.json", &admin("${env:EMULATOR_KEY}"));
    let loader = || {
        Loader::new(Arc::new(OsFs))
            .with_env(|name| (name == "EMULATOR_KEY").then(|| OTHER_KEY.to_string()))
    };

    let project = Project::load(loader(), &[path.clone()])?;
    project.save()?;

    assert!(!fs::read_to_string(&path)?.contains(OTHER_KEY));
    assert_eq!(
        read_json(&path)["accounts"]["admin"]["keys"],
        json!("${env:EMULATOR_KEY}")
    );
    let reloaded = Project::load(loader(), &[path])?;
    assert_eq!(reloaded.config(), project.config());
    Ok(())
}

#[test]
fn test_init_save_and_reload() -> Result<()> {
    let dir = TempDir::new("flowkit")?;
    let path = dir.path().join("flow.json");

    let project = Project::init(loader(), path.clone(), service_key(), HashAlgorithm::Sha3_256)?;
    project.save()?;

    let reloaded = Project::load(loader(), &[path.clone()])?;
    assert_eq!(reloaded.config(), project.config());
    assert_eq!(reloaded.service_account()?.address, service_address());
    assert_eq!(
        read_json(&path)["accounts"]["emulator-account"]["keys"],
        json!(SERVICE_KEY)
    );

    // The same project round-trips through TOML.
    let toml_path = dir.path().join("flow.toml");
    project.save_to(&toml_path)?;
    let from_toml = Project::load(loader(), &[toml_path])?;
    assert_eq!(from_toml.config(), project.config());
    Ok(())
}

#[test]
fn test_contract_and_deployment_persisted() -> Result<()> {
    let dir = TempDir::new("flowkit")?;
    let path = dir.path().join("flow.json");

    let mut project = Project::init(loader(), path.clone(), service_key(), HashAlgorithm::Sha3_256)?;
    project.add_or_update_contract(config::Contract::new("A", "./A.cdc"));
    project.add_or_update_deployment(Deployment {
        network: "emulator".to_string(),
        account: "emulator-account".to_string(),
        contracts: vec![ContractDeployment::new("A")],
    });
    project.save()?;

    let reloaded = Project::load(loader(), &[path])?;
    let targets = reloaded.contract_deployments("emulator")?;
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].name, "A");
    assert_eq!(targets[0].source, "./A.cdc");
    assert_eq!(targets[0].address, service_address());
    Ok(())
}

#[test]
fn test_default_paths_end_with_local_file() {
    let dir = TempDir::new("flowkit").unwrap();
    let paths = config::default_paths(&OsFs, dir.path());
    assert_eq!(paths.last(), Some(&dir.path().join(config::DEFAULT_CONFIG_FILE)));
}

#[test]
fn test_missing_file_is_reported() {
    let dir = TempDir::new("flowkit").unwrap();
    let err = Project::load(loader(), &[dir.path().join("flow.json")]).unwrap_err();
    assert!(matches!(
        err,
        flowkit::Error::Config(flowkit::error::ConfigError::NotFound { .. })
    ));
}
