//! flowkit - Configuration, contract preprocessing and deployment for Flow.
//!
//! A [`Project`] is loaded from one or more configuration files, its
//! contracts are staged by the [`Preprocessor`] into dependency order, and the
//! [`Deployer`] sends them through a [`Gateway`] one transaction at a time.

pub mod address;
pub use address::{Address, ChainId};

pub mod cadence;

pub mod config;
pub use config::{Config, Loader};

pub mod context;
pub use context::Context;

pub mod contracts;
pub use contracts::Preprocessor;

pub mod crypto;

mod deployer;
pub use deployer::{DeployOutcome, DeployedContract, Deployer};

pub mod error;
pub use error::{Error, Result};

pub mod flow;

pub mod fs;

pub mod gateway;
pub use gateway::{Gateway, HttpGateway};

pub mod keys;

mod kit;
pub use kit::Flowkit;

pub mod project;
pub use project::Project;

pub mod signer;

pub mod transactions;
