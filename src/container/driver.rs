use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::backup::{self, BackupInfo};
use super::engine::{ContainerEngine, ContainerState};
use super::{ResourceLimits, RuntimeError, RuntimeResult};
use crate::config::RuntimeConfig;
use crate::template::{render_env, RenderContext, ServiceTemplate};

pub use crate::template::models::DESCRIPTOR_FILE;

/// Rendered environment file inside an instance's working directory.
pub const ENV_FILE: &str = ".env";
pub const DATA_DIR: &str = "data";

/// Everything the driver needs to materialize one instance.
#[derive(Debug, Clone)]
pub struct ProvisionRequest<'a> {
    pub instance_name: &'a str,
    pub identifier: &'a str,
    pub subdomain: &'a str,
    pub port: u16,
    pub template: &'a ServiceTemplate,
    pub limits: ResourceLimits,
}

/// A provisioned deployment
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeHandle {
    pub container_id: String,
    pub status: String,
    pub running: bool,
    pub workdir: PathBuf,
    pub data_path: PathBuf,
    /// Env placeholders the template referenced but nothing supplied.
    pub unresolved_placeholders: Vec<String>,
}

/// Soft status report; never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerStatus {
    pub status: String,
    pub running: bool,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

impl ContainerStatus {
    pub fn not_found() -> Self {
        Self {
            status: "not_found".to_string(),
            running: false,
            started_at: None,
            finished_at: None,
        }
    }
}

impl From<ContainerState> for ContainerStatus {
    fn from(state: ContainerState) -> Self {
        Self {
            status: state.status,
            running: state.running,
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }
}

/// Wraps a [`ContainerEngine`] with the on-disk layout of instances:
/// `<instances_root>/<identifier>/{docker-compose.yml,.env,data/}`.
/// The compose project and the main container are both named after the
/// identifier.
pub struct RuntimeDriver {
    engine: Arc<dyn ContainerEngine>,
    config: RuntimeConfig,
    base_domain: String,
}

impl RuntimeDriver {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: RuntimeConfig, base_domain: impl Into<String>) -> Self {
        Self {
            engine,
            config,
            base_domain: base_domain.into(),
        }
    }

    pub fn workdir(&self, identifier: &str) -> PathBuf {
        self.config.instances_root.join(identifier)
    }

    pub fn data_path(&self, identifier: &str) -> PathBuf {
        self.workdir(identifier).join(DATA_DIR)
    }

    /// Materialize the working directory and bring the deployment up.
    ///
    /// Any failure removes what this call created (deployment first, then
    /// the working directory) and returns the original error.
    pub async fn provision(&self, request: ProvisionRequest<'_>) -> RuntimeResult<RuntimeHandle> {
        let workdir = self.workdir(request.identifier);
        tokio::fs::create_dir_all(&self.config.instances_root).await?;
        // Creating the directory claims the identifier on this host.
        match tokio::fs::create_dir(&workdir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(RuntimeError::WorkdirExists(workdir.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            "Provisioning {} from template {} on port {}",
            request.identifier,
            request.template.name(),
            request.port
        );

        let mut deployed = false;
        match self.materialize(&request, &workdir, &mut deployed).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                error!("Provisioning {} failed: {}", request.identifier, e);
                self.cleanup_failed_provision(request.identifier, &workdir, deployed).await;
                Err(e)
            }
        }
    }

    async fn materialize(
        &self,
        request: &ProvisionRequest<'_>,
        workdir: &Path,
        deployed: &mut bool,
    ) -> RuntimeResult<RuntimeHandle> {
        let data_path = workdir.join(DATA_DIR);
        tokio::fs::create_dir_all(&data_path).await?;

        let env_template = tokio::fs::read_to_string(request.template.env_template_path()).await?;
        let rendered = render_env(
            &env_template,
            &RenderContext {
                instance_name: request.instance_name.to_string(),
                container_name: request.identifier.to_string(),
                subdomain: request.subdomain.to_string(),
                port: request.port,
                base_domain: self.base_domain.clone(),
            },
        );
        tokio::fs::write(workdir.join(ENV_FILE), &rendered.content).await?;
        tokio::fs::copy(request.template.descriptor_path(), workdir.join(DESCRIPTOR_FILE)).await?;

        // From here on the runtime may hold resources for this project.
        *deployed = true;
        self.engine.compose_up(request.identifier, workdir).await?;

        let state = self
            .engine
            .inspect(request.identifier)
            .await?
            .ok_or_else(|| RuntimeError::NotFound(request.identifier.to_string()))?;

        self.engine.apply_limits(request.identifier, &request.limits).await?;

        info!("Provisioned {} as container {} ({})", request.identifier, state.id, state.status);
        Ok(RuntimeHandle {
            container_id: state.id,
            status: state.status,
            running: state.running,
            workdir: workdir.to_path_buf(),
            data_path,
            unresolved_placeholders: rendered.unresolved,
        })
    }

    async fn cleanup_failed_provision(&self, identifier: &str, workdir: &Path, deployed: bool) {
        if deployed {
            if let Err(e) = self.engine.compose_down(identifier, workdir, true).await {
                error!("Cleanup of deployment {} failed: {}", identifier, e);
                if let Err(e) = self.engine.remove(identifier).await {
                    if !matches!(e, RuntimeError::NotFound(_)) {
                        error!("Cleanup of container {} failed: {}", identifier, e);
                    }
                }
            }
        }
        if let Err(e) = tokio::fs::remove_dir_all(workdir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                error!("Cleanup of {} failed: {}", workdir.display(), e);
            }
        }
    }

    async fn current_state(&self, identifier: &str) -> RuntimeResult<ContainerState> {
        self.engine
            .inspect(identifier)
            .await?
            .ok_or_else(|| RuntimeError::NotFound(identifier.to_string()))
    }

    pub async fn start(&self, identifier: &str) -> RuntimeResult<ContainerState> {
        self.engine.start(identifier).await?;
        info!("Started {}", identifier);
        self.current_state(identifier).await
    }

    pub async fn stop(&self, identifier: &str) -> RuntimeResult<ContainerState> {
        self.engine.stop(identifier).await?;
        info!("Stopped {}", identifier);
        self.current_state(identifier).await
    }

    pub async fn restart(&self, identifier: &str) -> RuntimeResult<ContainerState> {
        self.engine.restart(identifier).await?;
        info!("Restarted {}", identifier);
        self.current_state(identifier).await
    }

    /// Down then up from the same working directory. A failure after the
    /// teardown leaves the deployment down.
    pub async fn redeploy(&self, identifier: &str) -> RuntimeResult<ContainerState> {
        let workdir = self.workdir(identifier);
        if !tokio::fs::try_exists(&workdir).await? {
            return Err(RuntimeError::NotFound(identifier.to_string()));
        }

        self.engine.compose_down(identifier, &workdir, false).await?;
        if let Err(e) = self.engine.compose_up(identifier, &workdir).await {
            warn!("Redeploy of {} failed after teardown; deployment is down", identifier);
            return Err(e);
        }

        info!("Redeployed {}", identifier);
        self.current_state(identifier).await
    }

    /// Tear down with volumes and remove the working directory. A deployment
    /// that is already gone is not an error.
    pub async fn delete(&self, identifier: &str) -> RuntimeResult<()> {
        let workdir = self.workdir(identifier);

        if tokio::fs::try_exists(workdir.join(DESCRIPTOR_FILE)).await? {
            if let Err(e) = self.engine.compose_down(identifier, &workdir, true).await {
                if self.engine.inspect(identifier).await?.is_some() {
                    return Err(e);
                }
                warn!("Teardown of {} failed but no container remains: {}", identifier, e);
            }
        } else {
            match self.engine.remove(identifier).await {
                Ok(()) => {}
                Err(RuntimeError::NotFound(_)) => {
                    warn!("Deployment {} already gone", identifier);
                }
                Err(e) => return Err(e),
            }
        }

        match tokio::fs::remove_dir_all(&workdir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!("Deleted runtime resources of {}", identifier);
        Ok(())
    }

    pub async fn status(&self, identifier: &str) -> ContainerStatus {
        match self.engine.inspect(identifier).await {
            Ok(Some(state)) => state.into(),
            Ok(None) => ContainerStatus::not_found(),
            Err(e) => {
                warn!("Status of {} unavailable: {}", identifier, e);
                ContainerStatus {
                    status: "unknown".to_string(),
                    ..ContainerStatus::not_found()
                }
            }
        }
    }

    pub async fn backup(&self, identifier: &str) -> RuntimeResult<BackupInfo> {
        backup::create_backup(&self.data_path(identifier), &self.config.backups_root, identifier).await
    }

    /// Tail of the main container's logs; `None` uses the configured default.
    pub async fn logs(&self, identifier: &str, lines: Option<usize>) -> RuntimeResult<String> {
        let lines = lines.unwrap_or(self.config.default_log_lines);
        self.engine.logs(identifier, lines).await
    }
}
