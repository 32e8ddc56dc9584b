use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::container::{ContainerStatus, ResourceRequest};
use crate::database::models::InstanceStatus;
use crate::proxy::{DeleteSiteStatus, ProxySite};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInstanceRequest {
    pub instance_name: String,
    pub template_name: String,
    #[serde(default)]
    pub resources: ResourceRequest,
}

/// Outcome of a successful `create_instance`
#[derive(Debug, Clone, Serialize)]
pub struct CreatedInstance {
    pub identifier: String,
    pub name: String,
    pub template: String,
    pub subdomain: String,
    pub port: u16,
    pub url: String,
    pub data_path: PathBuf,
    pub container_id: String,
    pub status: InstanceStatus,
    pub cpu_limit: String,
    pub memory_limit: String,
    pub proxy_site: ProxySite,
}

/// Result of a lifecycle transition
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleResult {
    pub identifier: String,
    pub status: InstanceStatus,
    pub container: ContainerStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatusReport {
    pub identifier: String,
    pub status: InstanceStatus,
    pub container: ContainerStatus,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyCleanup {
    Deleted,
    NotFound,
    /// The control plane call failed; the site may still exist.
    Failed,
}

impl From<DeleteSiteStatus> for ProxyCleanup {
    fn from(status: DeleteSiteStatus) -> Self {
        match status {
            DeleteSiteStatus::Deleted => ProxyCleanup::Deleted,
            DeleteSiteStatus::NotFound => ProxyCleanup::NotFound,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedInstance {
    pub identifier: String,
    pub released_port: u16,
    pub proxy_site: ProxyCleanup,
}
