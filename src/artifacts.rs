use std::path::{Path, PathBuf};

use crate::config::HarnessConfig;

/// Locations of the two build products every pipeline run depends on.
///
/// Resolved once per session; the harness never inspects the files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    compiler: PathBuf,
    runtime_archive: PathBuf,
}

impl ArtifactPaths {
    pub fn new(compiler: impl Into<PathBuf>, runtime_archive: impl Into<PathBuf>) -> Self {
        Self {
            compiler: compiler.into(),
            runtime_archive: runtime_archive.into(),
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(&config.compiler, &config.runtime_archive)
    }

    pub fn compiler(&self) -> &Path {
        &self.compiler
    }

    pub fn runtime_archive(&self) -> &Path {
        &self.runtime_archive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_from_config() {
        let mut config = HarnessConfig::default();
        config.compiler = PathBuf::from("target/release/compilisp");
        let paths = ArtifactPaths::from_config(&config);
        assert_eq!(paths.compiler(), Path::new("target/release/compilisp"));
        assert_eq!(paths.runtime_archive(), Path::new("target/debug/libruntime.a"));
    }
}
