//! File-backed tag baseline.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use model::{BaselineStore, ForkGuardError, TagSnapshot};
use tracing::{debug, info};

/// Stores the last tag snapshot as pretty-printed JSON.
///
/// Writes go to a sibling temporary file that is then renamed over the
/// target, so an interrupted run never leaves a truncated baseline.
#[derive(Debug, Clone)]
pub struct FileBaselineStore {
    path: PathBuf,
}

impl FileBaselineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, action: &str, cause: impl std::fmt::Display) -> ForkGuardError {
        ForkGuardError::Baseline {
            message: format!("could not {action} '{}': {cause}", self.path.display()),
        }
    }
}

#[async_trait]
impl BaselineStore for FileBaselineStore {
    async fn load(&self) -> Result<Option<TagSnapshot>, ForkGuardError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No tag baseline recorded yet");
                return Ok(None);
            }
            Err(e) => return Err(self.error("read", e)),
        };
        let snapshot: TagSnapshot = serde_json::from_str(&text).map_err(|e| self.error("parse", e))?;
        debug!(path = %self.path.display(), tags = snapshot.len(), "Loaded tag baseline");
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &TagSnapshot) -> Result<(), ForkGuardError> {
        let json = serde_json::to_string_pretty(snapshot).map_err(|e| self.error("serialize", e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error("create the directory for", e))?;
        }

        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);
        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| self.error("write", e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.error("replace", e))?;

        info!(path = %self.path.display(), tags = snapshot.len(), "Saved tag baseline");
        Ok(())
    }
}
