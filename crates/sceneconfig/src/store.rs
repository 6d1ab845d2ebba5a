use std::sync::Arc;

use crate::codec::{decode, LineIssue};
use crate::patch::{apply_patch, FieldPath, FieldValue, PatchError};
use crate::{DecodeError, SceneConfig};

/// Holds the live configuration as an immutable snapshot.
///
/// Every change builds a new [`SceneConfig`] and swaps the `Arc`, so a reader
/// holding a previous snapshot never observes a half-applied edit.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    current: Arc<SceneConfig>,
    revision: u64,
}

impl ConfigStore {
    pub fn new(config: SceneConfig) -> Self {
        Self {
            current: Arc::new(config),
            revision: 0,
        }
    }

    pub fn current(&self) -> Arc<SceneConfig> {
        Arc::clone(&self.current)
    }

    /// Increments on every accepted change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replaces the config wholesale with the decoded text.
    ///
    /// On error the previous snapshot stays current.
    pub fn apply_text(&mut self, text: &str) -> Result<Vec<LineIssue>, DecodeError> {
        let decoded = decode(text)?;
        self.replace(decoded.config);
        Ok(decoded.issues)
    }

    pub fn patch(&mut self, path: FieldPath, value: FieldValue) -> Result<(), PatchError> {
        let mut next = SceneConfig::clone(&self.current);
        apply_patch(&mut next, path, value)?;
        self.replace(next);
        Ok(())
    }

    /// Parses `path` and applies the update.
    pub fn patch_path(&mut self, path: &str, value: FieldValue) -> Result<(), PatchError> {
        self.patch(path.parse()?, value)
    }

    fn replace(&mut self, config: SceneConfig) {
        self.current = Arc::new(config);
        self.revision += 1;
        tracing::debug!(revision = self.revision, "scene configuration replaced");
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(SceneConfig::default())
    }
}
