//! Sandbox contract consumed by tool implementations.
//!
//! The core never touches the filesystem or spawns processes on behalf of a
//! tool; concrete sandboxes (host filesystem, containers) are external
//! collaborators implementing this interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::AgentResult;

/// Result of a sandboxed command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// A process visible inside the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: u32,
    pub command: String,
    pub running: bool,
}

/// Execution environment handed to tools. All operations are async and
/// cancellable.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn read_file(&self, path: &str, cancel: &CancelToken) -> AgentResult<String>;

    async fn file_exists(&self, path: &str, cancel: &CancelToken) -> AgentResult<bool>;

    async fn directory_exists(&self, path: &str, cancel: &CancelToken) -> AgentResult<bool>;

    async fn list_directory(&self, path: &str, cancel: &CancelToken) -> AgentResult<Vec<String>>;

    async fn execute_command(
        &self,
        command: &str,
        cancel: &CancelToken,
    ) -> AgentResult<CommandOutput>;

    async fn get_process(&self, pid: u32, cancel: &CancelToken)
    -> AgentResult<Option<ProcessInfo>>;

    async fn kill_process(&self, pid: u32, cancel: &CancelToken) -> AgentResult<()>;
}
