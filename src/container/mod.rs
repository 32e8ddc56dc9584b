//! Runtime driver: per-instance compose deployments on the local Docker host.

pub mod backup;
pub mod docker;
pub mod driver;
pub mod engine;
pub mod resource_limits;

pub use backup::BackupInfo;
pub use docker::DockerEngine;
pub use driver::{ContainerStatus, ProvisionRequest, RuntimeDriver, RuntimeHandle};
pub use engine::{ContainerEngine, ContainerState};
pub use resource_limits::{CpuLimits, MemoryLimits, ResourceLimits, ResourceRequest};

use std::time::Duration;

/// Runtime boundary failures
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Container not found: {0}")]
    NotFound(String),

    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("Working directory already exists: {0}")]
    WorkdirExists(String),

    #[error("Backup failed: {0}")]
    Backup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
