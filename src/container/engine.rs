use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{ResourceLimits, RuntimeResult};

/// Live state of one container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub id: String,
    pub status: String,
    pub running: bool,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

/// Operations the driver needs from a container runtime.
///
/// Containers are addressed by name or id. Compose deployments are
/// addressed by project name plus the directory holding the descriptor
/// and its `.env`.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Bring a deployment up in the background.
    async fn compose_up(&self, project: &str, workdir: &Path) -> RuntimeResult<()>;

    /// Tear a deployment down, optionally with its named volumes.
    async fn compose_down(&self, project: &str, workdir: &Path, remove_volumes: bool) -> RuntimeResult<()>;

    /// `Ok(None)` when no such container exists.
    async fn inspect(&self, container: &str) -> RuntimeResult<Option<ContainerState>>;

    async fn start(&self, container: &str) -> RuntimeResult<()>;

    async fn stop(&self, container: &str) -> RuntimeResult<()>;

    async fn restart(&self, container: &str) -> RuntimeResult<()>;

    /// Force-remove a container and its anonymous volumes.
    async fn remove(&self, container: &str) -> RuntimeResult<()>;

    /// Last `tail` lines of combined stdout/stderr.
    async fn logs(&self, container: &str, tail: usize) -> RuntimeResult<String>;

    async fn apply_limits(&self, container: &str, limits: &ResourceLimits) -> RuntimeResult<()>;
}
