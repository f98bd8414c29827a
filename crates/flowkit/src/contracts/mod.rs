//! Contract preprocessing: import resolution, ordering and transpilation.
//!
//! Contracts live in an arena indexed by insertion order. Import edges are
//! stored as indices, never as references between contracts.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::{address::Address, cadence::Value, error::PreprocessError};

mod graph;
mod loader;
mod parser;

pub use graph::DependencyGraph;
pub use loader::{FsSourceLoader, SourceLoader};
pub use parser::{Import, ImportKind, ImportScanner, Parameter, Program, ProgramParser};

/// Import keys mapped to on-chain addresses, for contracts not deployed from source.
///
/// Keys are canonical source locations, or contract names for bare-name imports.
pub type Aliases = IndexMap<String, Address>;

#[derive(Debug, Clone)]
struct Resolution {
    import: Import,
    address: Address,
}

/// A contract staged for deployment.
#[derive(Debug, Clone)]
pub struct Contract {
    index: usize,
    name: String,
    location: String,
    target: Address,
    code: String,
    program: Program,
    args: Vec<Value>,
    dependencies: IndexMap<String, usize>,
    aliases: IndexMap<String, Address>,
    resolutions: Vec<Resolution>,
}

impl Contract {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical source location.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn target(&self) -> Address {
        self.target
    }

    /// The untouched source code.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Peer imports: import literal to peer index.
    pub fn dependencies(&self) -> &IndexMap<String, usize> {
        &self.dependencies
    }

    /// Alias imports: import literal to alias address.
    pub fn aliases(&self) -> &IndexMap<String, Address> {
        &self.aliases
    }

    /// The code with every resolved import rewritten to its address.
    pub fn transpiled_code(&self) -> String {
        let mut code = self.code.clone();
        let mut resolutions: Vec<&Resolution> = self.resolutions.iter().collect();
        resolutions.sort_by_key(|r| std::cmp::Reverse(r.import.statement.start));

        for resolution in resolutions {
            let import = &resolution.import;
            let address = resolution.address.to_hex_with_prefix();
            match import.kind {
                ImportKind::Path => {
                    code.replace_range(import.literal_span.clone(), &address);
                }
                ImportKind::Name => {
                    code.replace_range(
                        import.statement.clone(),
                        &format!("import {} from {address}", import.literal),
                    );
                }
            }
        }
        code
    }
}

/// Builds the ordered set of contracts for one deployment run.
pub struct Preprocessor {
    loader: Arc<dyn SourceLoader>,
    parser: Arc<dyn ProgramParser>,
    aliases: Aliases,
    contracts: Vec<Contract>,
}

impl Preprocessor {
    pub fn new(loader: Arc<dyn SourceLoader>, aliases: Aliases) -> Self {
        Self {
            loader,
            parser: Arc::new(ImportScanner),
            aliases,
            contracts: Vec::new(),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn ProgramParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn contracts(&self) -> &[Contract] {
        &self.contracts
    }

    pub fn contract(&self, index: usize) -> Option<&Contract> {
        self.contracts.get(index)
    }

    pub fn add_contract_source(
        &mut self,
        name: &str,
        source: &str,
        target: Address,
    ) -> Result<(), PreprocessError> {
        self.add_contract_source_with_args(name, source, target, Vec::new())
    }

    /// Load and parse a contract, checking `args` against its initializer.
    pub fn add_contract_source_with_args(
        &mut self,
        name: &str,
        source: &str,
        target: Address,
        args: Vec<Value>,
    ) -> Result<(), PreprocessError> {
        let location = self.loader.location(source);
        let code = self.loader.load(source)?;
        let program = self.parser.parse(&code, &location)?;

        if program.init_parameters.len() != args.len() {
            return Err(PreprocessError::InitArguments {
                contract: name.to_string(),
                expected: program.init_parameters.len(),
                got: args.len(),
            });
        }

        tracing::debug!(
            contract = %name,
            location = %location,
            target = %target,
            imports = program.imports.len(),
            "Added contract source"
        );

        self.contracts.push(Contract {
            index: self.contracts.len(),
            name: name.to_string(),
            location,
            target,
            code,
            program,
            args,
            dependencies: IndexMap::new(),
            aliases: IndexMap::new(),
            resolutions: Vec::new(),
        });
        Ok(())
    }

    /// Resolve every import against peers first, then aliases.
    pub fn resolve_imports(&mut self) -> Result<(), PreprocessError> {
        for i in 0..self.contracts.len() {
            let mut dependencies = IndexMap::new();
            let mut aliases = IndexMap::new();
            let mut resolutions = Vec::new();

            let contract = &self.contracts[i];
            for import in &contract.program.imports {
                let (peer, key) = match import.kind {
                    ImportKind::Name => (
                        self.contracts.iter().find(|c| c.name == import.literal),
                        import.literal.clone(),
                    ),
                    ImportKind::Path => {
                        let key = self.loader.normalize(&contract.location, &import.literal);
                        (self.contracts.iter().find(|c| c.location == key), key)
                    }
                };

                let address = match peer {
                    Some(peer) => {
                        dependencies.insert(import.literal.clone(), peer.index);
                        peer.target
                    }
                    None => match self.aliases.get(&key) {
                        Some(&alias) => {
                            aliases.insert(import.literal.clone(), alias);
                            alias
                        }
                        None => {
                            return Err(PreprocessError::UnresolvedImport {
                                from: contract.name.clone(),
                                missing: key,
                            });
                        }
                    },
                };

                tracing::debug!(
                    contract = %contract.name,
                    import = %import.literal,
                    address = %address,
                    "Resolved import"
                );
                resolutions.push(Resolution {
                    import: import.clone(),
                    address,
                });
            }

            let contract = &mut self.contracts[i];
            contract.dependencies = dependencies;
            contract.aliases = aliases;
            contract.resolutions = resolutions;
        }
        Ok(())
    }

    /// The import graph over the staged contracts.
    pub fn graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new(self.contracts.len());
        for contract in &self.contracts {
            for &dependency in contract.dependencies.values() {
                graph.add_edge(dependency, contract.index);
            }
        }
        graph
    }

    /// Contracts with every dependency ahead of its dependents.
    pub fn deployment_order(&self) -> Result<Vec<&Contract>, PreprocessError> {
        match self.graph().topological_order() {
            Ok(order) => Ok(order.into_iter().map(|i| &self.contracts[i]).collect()),
            Err(cycles) => Err(PreprocessError::CyclicImport {
                cycles: cycles
                    .into_iter()
                    .map(|cycle| {
                        cycle
                            .into_iter()
                            .map(|i| self.contracts[i].name.clone())
                            .collect()
                    })
                    .collect(),
            }),
        }
    }
}

impl std::fmt::Debug for Preprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preprocessor")
            .field("aliases", &self.aliases)
            .field("contracts", &self.contracts)
            .finish_non_exhaustive()
    }
}
