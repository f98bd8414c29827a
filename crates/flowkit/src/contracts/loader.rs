//! Loading contract sources and canonicalizing import locations.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    error::PreprocessError,
    fs::{ReaderWriter, join_relative, normalize_path},
};

/// Loads contract code and maps import literals to canonical locations.
pub trait SourceLoader: Send + Sync {
    fn load(&self, source: &str) -> Result<String, PreprocessError>;

    /// Canonical location of `relative` as imported from the contract at `base`.
    fn normalize(&self, base: &str, relative: &str) -> String;

    /// Canonical location of a contract's own source.
    fn location(&self, source: &str) -> String {
        path_to_location(&normalize_path(Path::new(source)))
    }
}

fn path_to_location(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Loads sources from a filesystem relative to the project root.
#[derive(Clone)]
pub struct FsSourceLoader {
    fs: Arc<dyn ReaderWriter>,
    root: PathBuf,
}

impl FsSourceLoader {
    pub fn new(fs: Arc<dyn ReaderWriter>, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }
}

impl SourceLoader for FsSourceLoader {
    fn load(&self, source: &str) -> Result<String, PreprocessError> {
        let path = self.root.join(source);
        let bytes = self.fs.read_file(&path).map_err(|e| PreprocessError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        String::from_utf8(bytes).map_err(|e| PreprocessError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn normalize(&self, base: &str, relative: &str) -> String {
        path_to_location(&join_relative(Path::new(base), relative))
    }
}

impl std::fmt::Debug for FsSourceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsSourceLoader")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;

    #[test]
    fn test_load_relative_to_root() {
        let fs = MemoryFs::new().with_file("project/contracts/A.cdc", "access(all) contract A {}");
        let loader = FsSourceLoader::new(Arc::new(fs), "project");

        assert_eq!(
            loader.load("./contracts/A.cdc").unwrap(),
            "access(all) contract A {}"
        );
        assert!(matches!(
            loader.load("./contracts/B.cdc"),
            Err(PreprocessError::Load { .. })
        ));
    }

    #[test]
    fn test_normalize() {
        let loader = FsSourceLoader::new(Arc::new(MemoryFs::new()), ".");
        assert_eq!(loader.normalize("contracts/B.cdc", "./A.cdc"), "contracts/A.cdc");
        assert_eq!(loader.normalize("contracts/B.cdc", "../A.cdc"), "A.cdc");
        assert_eq!(loader.location("./contracts/../A.cdc"), "A.cdc");
    }
}
