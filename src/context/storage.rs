//! One JSON record per conversation on local disk.

use crate::context::types::{Context, ConversationId};
use crate::error::{Result, TricksterError};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result of scanning the record directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Records that parsed and matched their file name.
    pub contexts: Vec<Context>,
    /// Records that were skipped, one error each.
    pub skipped: Vec<TricksterError>,
}

/// Directory-backed record store. Holds no in-memory state.
#[derive(Debug, Clone)]
pub struct ContextStorage {
    dir: PathBuf,
}

impl ContextStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: ConversationId) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Read every `<id>.json` record in the directory.
    ///
    /// Unreadable records and records whose `conversation_id` does not match
    /// the file name are logged and skipped; a missing directory is empty.
    ///
    /// # Errors
    ///
    /// Only fails when the directory exists but cannot be listed.
    pub fn load_all(&self) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("record directory {} does not exist yet", self.dir.display());
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!("cannot read record directory entry: {e}");
                    continue;
                }
            };
            let Some(key) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(key_from_file_name)
            else {
                continue;
            };

            match read_record(&path, key) {
                Ok(context) => report.contexts.push(context),
                Err(e) => {
                    warn!("unable to load context: {e}");
                    report.skipped.push(e);
                }
            }
        }

        report.contexts.sort_by_key(|c| c.conversation_id);
        Ok(report)
    }

    /// Atomically replace the record for `context.conversation_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TricksterError::Storage`] if the record cannot be written.
    pub async fn save(&self, context: &Context) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            TricksterError::Storage(format!("cannot create {}: {e}", self.dir.display()))
        })?;

        let json = serde_json::to_vec_pretty(context)
            .map_err(|e| TricksterError::Storage(format!("cannot serialize context: {e}")))?;

        let path = self.record_path(context.conversation_id);
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await.map_err(|e| {
            TricksterError::Storage(format!("cannot write {}: {e}", tmp_path.display()))
        })?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
            TricksterError::Storage(format!("cannot replace {}: {e}", path.display()))
        })?;
        Ok(())
    }

    /// Remove the record for `key`. Missing records are fine.
    ///
    /// # Errors
    ///
    /// Returns [`TricksterError::Storage`] for any other filesystem failure.
    pub async fn delete(&self, key: ConversationId) -> Result<()> {
        let path = self.record_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TricksterError::Storage(format!(
                "cannot delete {}: {e}",
                path.display()
            ))),
        }
    }
}

/// `-123.json` -> `Some(-123)`; anything else -> `None`.
fn key_from_file_name(name: &str) -> Option<ConversationId> {
    let stem = name.strip_suffix(".json")?;
    let digits = stem.strip_prefix('-').unwrap_or(stem);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

fn read_record(path: &Path, key: ConversationId) -> Result<Context> {
    let corrupt = |reason: String| TricksterError::StorageCorruption {
        path: path.to_path_buf(),
        reason,
    };
    let bytes = std::fs::read(path).map_err(|e| corrupt(format!("cannot read: {e}")))?;
    let context: Context =
        serde_json::from_slice(&bytes).map_err(|e| corrupt(format!("cannot parse: {e}")))?;
    if context.conversation_id != key {
        return Err(corrupt(format!(
            "stored conversation_id {} does not match file name",
            context.conversation_id
        )));
    }
    Ok(context)
}
