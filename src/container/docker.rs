use async_trait::async_trait;
use bollard::container::{
    InspectContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions, RestartContainerOptions,
    StartContainerOptions, StopContainerOptions, UpdateContainerOptions,
};
use bollard::models::ContainerStateStatusEnum;
use bollard::Docker;
use futures_util::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use super::engine::{ContainerEngine, ContainerState};
use super::{ResourceLimits, RuntimeError, RuntimeResult};
use crate::config::RuntimeConfig;

const STOP_GRACE_SECS: i64 = 10;

/// Docker host: single containers via the Engine API, deployments via
/// the `docker compose` CLI.
pub struct DockerEngine {
    docker: Docker,
    docker_binary: String,
    timeout: Duration,
}

impl DockerEngine {
    pub async fn connect(config: &RuntimeConfig) -> RuntimeResult<Self> {
        let docker = Docker::connect_with_socket_defaults().or_else(|_| Docker::connect_with_local_defaults())?;

        let version = docker.version().await?;
        info!(
            "Connected to Docker Engine version: {} (API {})",
            version.version.unwrap_or_default(),
            version.api_version.unwrap_or_default()
        );

        Ok(Self::with_client(docker, config))
    }

    pub fn with_client(docker: Docker, config: &RuntimeConfig) -> Self {
        Self {
            docker,
            docker_binary: config.docker_binary.clone(),
            timeout: config.command_timeout(),
        }
    }

    async fn compose(&self, project: &str, workdir: &Path, args: &[&str]) -> RuntimeResult<()> {
        let mut command = Command::new(&self.docker_binary);
        command
            .arg("compose")
            .arg("--project-name")
            .arg(project)
            .arg("--file")
            .arg(super::driver::DESCRIPTOR_FILE)
            .arg("--env-file")
            .arg(super::driver::ENV_FILE)
            .args(args)
            .current_dir(workdir)
            .kill_on_drop(true);

        let rendered = format!("{} compose -p {} {}", self.docker_binary, project, args.join(" "));
        debug!("Running {}", rendered);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| RuntimeError::Timeout {
                operation: rendered.clone(),
                timeout: self.timeout,
            })??;

        if !output.status.success() {
            return Err(RuntimeError::Command {
                command: rendered,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Bound an Engine API call by the configured timeout.
    async fn bounded<T, F>(&self, operation: &str, container: &str, fut: F) -> RuntimeResult<T>
    where
        F: std::future::Future<Output = Result<T, bollard::errors::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| map_docker_error(container, e)),
            Err(_) => Err(RuntimeError::Timeout {
                operation: format!("{} {}", operation, container),
                timeout: self.timeout,
            }),
        }
    }
}

fn map_docker_error(container: &str, err: bollard::errors::Error) -> RuntimeError {
    match err {
        bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
            RuntimeError::NotFound(container.to_string())
        }
        other => RuntimeError::Docker(other),
    }
}

fn status_label(status: Option<ContainerStateStatusEnum>) -> &'static str {
    match status {
        Some(ContainerStateStatusEnum::CREATED) => "created",
        Some(ContainerStateStatusEnum::RUNNING) => "running",
        Some(ContainerStateStatusEnum::PAUSED) => "paused",
        Some(ContainerStateStatusEnum::RESTARTING) => "restarting",
        Some(ContainerStateStatusEnum::REMOVING) => "removing",
        Some(ContainerStateStatusEnum::EXITED) => "exited",
        Some(ContainerStateStatusEnum::DEAD) => "dead",
        Some(ContainerStateStatusEnum::EMPTY) | None => "unknown",
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn compose_up(&self, project: &str, workdir: &Path) -> RuntimeResult<()> {
        self.compose(project, workdir, &["up", "--detach", "--remove-orphans"]).await?;
        info!("Deployment {} is up", project);
        Ok(())
    }

    async fn compose_down(&self, project: &str, workdir: &Path, remove_volumes: bool) -> RuntimeResult<()> {
        if remove_volumes {
            self.compose(project, workdir, &["down", "--volumes", "--remove-orphans"]).await?;
        } else {
            self.compose(project, workdir, &["down", "--remove-orphans"]).await?;
        }
        info!("Deployment {} is down", project);
        Ok(())
    }

    async fn inspect(&self, container: &str) -> RuntimeResult<Option<ContainerState>> {
        let result = self
            .bounded(
                "inspect",
                container,
                self.docker
                    .inspect_container(container, None::<InspectContainerOptions>),
            )
            .await;

        let details = match result {
            Ok(details) => details,
            Err(RuntimeError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let state = details.state.unwrap_or_default();
        Ok(Some(ContainerState {
            id: details.id.unwrap_or_else(|| container.to_string()),
            status: status_label(state.status).to_string(),
            running: state.running.unwrap_or(false),
            started_at: state.started_at,
            finished_at: state.finished_at,
        }))
    }

    async fn start(&self, container: &str) -> RuntimeResult<()> {
        self.bounded(
            "start",
            container,
            self.docker
                .start_container(container, None::<StartContainerOptions<String>>),
        )
        .await
    }

    async fn stop(&self, container: &str) -> RuntimeResult<()> {
        self.bounded(
            "stop",
            container,
            self.docker
                .stop_container(container, Some(StopContainerOptions { t: STOP_GRACE_SECS })),
        )
        .await
    }

    async fn restart(&self, container: &str) -> RuntimeResult<()> {
        self.bounded(
            "restart",
            container,
            self.docker
                .restart_container(container, None::<RestartContainerOptions>),
        )
        .await
    }

    async fn remove(&self, container: &str) -> RuntimeResult<()> {
        self.bounded(
            "remove",
            container,
            self.docker.remove_container(
                container,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            ),
        )
        .await
    }

    async fn logs(&self, container: &str, tail: usize) -> RuntimeResult<String> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };

        let collect = async {
            let mut stream = Box::pin(self.docker.logs(container, Some(options)));
            let mut output = String::new();
            while let Some(chunk) = stream.next().await {
                match chunk? {
                    LogOutput::StdOut { message } | LogOutput::StdErr { message } | LogOutput::Console { message } => {
                        output.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdIn { .. } => {}
                }
            }
            Ok::<_, bollard::errors::Error>(output)
        };

        self.bounded("logs", container, collect).await
    }

    async fn apply_limits(&self, container: &str, limits: &ResourceLimits) -> RuntimeResult<()> {
        let options = UpdateContainerOptions::<String> {
            nano_cpus: Some(limits.nano_cpus()),
            memory: Some(limits.memory_bytes()),
            // memory + swap equal to memory: no swap beyond the bound.
            memory_swap: Some(limits.memory_bytes()),
            ..Default::default()
        };

        self.bounded("update", container, self.docker.update_container(container, options))
            .await?;
        info!(
            "Applied limits to {}: cpu={} memory={}",
            container,
            limits.cpu.label(),
            limits.memory.label()
        );
        Ok(())
    }
}
