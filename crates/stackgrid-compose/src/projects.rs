//! On-disk layout of compose projects: one directory per pipeline id.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{ComposeError, ComposeResult};

#[derive(Debug, Clone)]
pub struct Projects {
    root: PathBuf,
}

impl Projects {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the project for pipeline `id`.
    ///
    /// Ids become path components, so anything that could escape the root
    /// is rejected.
    pub fn dir(&self, id: &str) -> ComposeResult<PathBuf> {
        let valid = !id.is_empty()
            && id != "."
            && id != ".."
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(ComposeError::InvalidProject(id.to_string()));
        }
        Ok(self.root.join(id))
    }

    pub async fn exists(&self, id: &str) -> ComposeResult<bool> {
        Ok(tokio::fs::try_exists(self.dir(id)?).await?)
    }

    /// Delete the project directory. Returns `false` when it was already gone.
    pub async fn remove(&self, id: &str) -> ComposeResult<bool> {
        let dir = self.dir(id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(project = %id, dir = %dir.display(), "removed project directory");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
