use crate::session::{ResolveError, ResolveResult, SourceResolver};
use crate::types::SourceLocation;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Resolves a target to `<root>/<target>.<extension>`.
#[derive(Debug, Clone)]
pub struct PathSourceResolver {
    root: PathBuf,
    extension: String,
}

impl PathSourceResolver {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn candidate(&self, target: &str) -> PathBuf {
        self.root.join(format!("{}.{}", target, self.extension))
    }
}

#[async_trait]
impl SourceResolver for PathSourceResolver {
    async fn module_source(&self, target: &str) -> ResolveResult<SourceLocation> {
        let candidate = self.candidate(target);
        match tokio::fs::canonicalize(&candidate).await {
            Ok(path) => Ok(SourceLocation::from_path(&path)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ResolveError::NotFound {
                target: target.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}
