//! Loading and saving configuration files through a virtual filesystem.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::IndexMap;

use crate::{
    config::{Config, Parsers, preprocess},
    error::ConfigError,
    fs::{ReaderWriter, join_relative},
};

/// Conventional configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "flow.json";

/// Environment lookup used for `$NAME` substitution.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// The global configuration file in the user's home directory.
pub fn global_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE))
}

/// Default load order: the global file when present, then the one in `dir`.
pub fn default_paths(fs: &dyn ReaderWriter, dir: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(global) = global_path().filter(|p| fs.exists(p)) {
        paths.push(global);
    }
    paths.push(dir.join(DEFAULT_CONFIG_FILE));
    paths
}

/// Reads, preprocesses, parses and composes configuration files.
#[derive(Clone)]
pub struct Loader {
    fs: Arc<dyn ReaderWriter>,
    parsers: Parsers,
    env: EnvLookup,
}

impl Loader {
    /// A loader over `fs` with the default parsers and the process environment.
    pub fn new(fs: Arc<dyn ReaderWriter>) -> Self {
        Self {
            fs,
            parsers: Parsers::default(),
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    pub fn with_parsers(mut self, parsers: Parsers) -> Self {
        self.parsers = parsers;
        self
    }

    /// Override environment lookup, e.g. with a fixed map in tests.
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }

    pub fn fs(&self) -> &Arc<dyn ReaderWriter> {
        &self.fs
    }

    pub fn parsers(&self) -> &Parsers {
        &self.parsers
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.fs.exists(path)
    }

    /// Load and compose `paths`, later files overriding earlier ones.
    ///
    /// Accounts referenced with `fromFile` are loaded last and remembered in
    /// [`Config::imports`]; an inline definition in a later file replaces the
    /// reference.
    pub fn load(&self, paths: &[PathBuf]) -> Result<Config, ConfigError> {
        let mut config = Config::default();
        let mut deferred: IndexMap<String, (String, PathBuf)> = IndexMap::new();

        for path in paths {
            let (partial, imports) = self.load_file(path)?;
            for account in partial.accounts.iter() {
                deferred.shift_remove(&account.name);
            }
            for (account, relative) in imports {
                let resolved = join_relative(path, &relative);
                deferred.insert(account, (relative, resolved));
            }
            config.merge(partial);
        }

        for (account, (relative, path)) in deferred {
            let (partial, _) = self.load_file(&path)?;
            let imported = partial.accounts.by_name(&account).cloned().ok_or_else(|| {
                ConfigError::semantics(format!(
                    "account {account} not found in {}",
                    path.display()
                ))
            })?;
            tracing::debug!(account = %account, path = %path.display(), "Merged account from external file");
            config.accounts.add_or_update(imported);
            config.imports.insert(account, relative);
        }

        config.validate()?;
        tracing::info!(
            files = paths.len(),
            accounts = config.accounts.len(),
            networks = config.networks.len(),
            contracts = config.contracts.len(),
            deployments = config.deployments.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Read one file, returning its partial configuration and its `fromFile`
    /// imports as written.
    fn load_file(&self, path: &Path) -> Result<(Config, IndexMap<String, String>), ConfigError> {
        let raw = self.fs.read_file(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ConfigError::NotFound {
                path: path.to_path_buf(),
            },
            _ => ConfigError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
        let raw = String::from_utf8(raw).map_err(|e| ConfigError::syntax(e).at_path(path))?;

        let parser = self.parsers.for_path(path)?;
        let processed = preprocess(&raw, self.env.as_ref());
        let mut config = parser
            .deserialize(processed.text.as_bytes())
            .map_err(|e| e.at_path(path))?;

        let mut imports = std::mem::take(&mut config.imports);
        imports.extend(processed.from_file);

        // Only key material is written back as a reference.
        let key_values: Vec<&String> = config
            .accounts
            .iter()
            .flat_map(|account| account.keys.iter())
            .flat_map(|key| key.context.values())
            .collect();
        let env_references: IndexMap<String, String> = processed
            .env_references
            .into_iter()
            .filter(|(value, _)| key_values.contains(&value))
            .collect();
        config.env_references = env_references;

        tracing::debug!(path = %path.display(), "Parsed configuration file");
        Ok((config, imports))
    }

    /// Serialize `config` with the parser for `path` and write it in one call.
    pub fn save(&self, config: &Config, path: &Path) -> Result<(), ConfigError> {
        let parser = self.parsers.for_path(path)?;
        let bytes = parser.serialize(config)?;
        self.fs
            .write_file(path, &bytes)
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader").field("parsers", &self.parsers).finish()
    }
}
