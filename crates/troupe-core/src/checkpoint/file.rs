//! File-backed checkpoint store.
//!
//! Layout: one JSON document per checkpoint at
//! `<base>/<agent_id>/checkpoints/<id>.json`. Ids are sanitised for the
//! filesystem (`:` becomes `_`), and fork ids use `_` outright. Corrupt
//! files are skipped during list.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{Checkpoint, CheckpointListItem, Checkpointer, ListQuery, apply_query};
use crate::error::{AgentError, AgentResult};

/// One JSON file per checkpoint under a base directory.
#[derive(Debug)]
pub struct FileCheckpointer {
    base: PathBuf,
}

impl FileCheckpointer {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn file_name(id: &str) -> String {
        format!("{}.json", id.replace(':', "_"))
    }

    fn checkpoints_dir(&self, agent_id: &str) -> PathBuf {
        self.base.join(agent_id).join("checkpoints")
    }

    fn io_err(context: &str, err: std::io::Error) -> AgentError {
        AgentError::checkpoint(format!("{context}: {err}"))
    }

    async fn read_checkpoint(path: &Path) -> Option<Checkpoint> {
        let raw = tokio::fs::read_to_string(path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(cp) => Some(cp),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping corrupt checkpoint file");
                None
            }
        }
    }

    /// Find a checkpoint file by id across all agent directories.
    async fn locate(&self, id: &str) -> AgentResult<Option<PathBuf>> {
        let file_name = Self::file_name(id);
        let mut agents = match tokio::fs::read_dir(&self.base).await {
            Ok(dir) => dir,
            Err(_) => return Ok(None),
        };
        while let Some(entry) = agents
            .next_entry()
            .await
            .map_err(|e| Self::io_err("reading base directory", e))?
        {
            let candidate = entry.path().join("checkpoints").join(&file_name);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> AgentResult<String> {
        let dir = self.checkpoints_dir(&checkpoint.agent_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Self::io_err("creating checkpoint directory", e))?;

        let body = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| AgentError::checkpoint(format!("encoding checkpoint: {e}")))?;

        // Write-then-rename keeps a crashed save from leaving a torn file.
        let path = dir.join(Self::file_name(&checkpoint.id));
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| Self::io_err("writing checkpoint", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Self::io_err("committing checkpoint", e))?;

        Ok(checkpoint.id.clone())
    }

    async fn load(&self, id: &str) -> AgentResult<Option<Checkpoint>> {
        match self.locate(id).await? {
            Some(path) => Ok(Self::read_checkpoint(&path).await),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        agent_id: &str,
        query: &ListQuery,
    ) -> AgentResult<Vec<CheckpointListItem>> {
        let dir = self.checkpoints_dir(agent_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(dir) => dir,
            Err(_) => return Ok(Vec::new()),
        };

        let mut items = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::io_err("reading checkpoint directory", e))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            if let Some(cp) = Self::read_checkpoint(&path).await {
                items.push(cp.list_item());
            }
        }
        Ok(apply_query(items, query))
    }

    async fn delete(&self, id: &str) -> AgentResult<()> {
        if let Some(path) = self.locate(id).await? {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| Self::io_err("deleting checkpoint", e))?;
        }
        Ok(())
    }

    fn fork_id_separator(&self) -> char {
        '_'
    }
}
