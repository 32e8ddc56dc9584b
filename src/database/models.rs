use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DatabaseError;

/// Catalog row for a service template
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DbService {
    pub name: String,
    pub description: Option<String>,
    pub version: String,
    pub default_port: i32,
    pub default_cpu: String,
    pub default_memory: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle status persisted for an instance. Provisioning is implicit:
/// a row only exists once the runtime container is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Running,
    Stopped,
    Deleted,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Running => "running",
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(InstanceStatus::Running),
            "stopped" => Ok(InstanceStatus::Stopped),
            "deleted" => Ok(InstanceStatus::Deleted),
            other => Err(DatabaseError::Decode(format!("unknown instance status '{}'", other))),
        }
    }
}

/// Catalog row for an instance
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DbInstance {
    #[serde(skip)]
    pub id: i64,
    pub identifier: String,
    pub name: String,
    pub template: String,
    pub subdomain: String,
    pub port: i32,
    pub status: String,
    pub cpu_limit: String,
    pub memory_limit: String,
    pub data_path: String,
    pub container_id: Option<String>,
    pub proxy_site_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbInstance {
    pub fn status(&self) -> Result<InstanceStatus, DatabaseError> {
        self.status.parse()
    }

    pub fn host_port(&self) -> Result<u16, DatabaseError> {
        u16::try_from(self.port)
            .map_err(|_| DatabaseError::Decode(format!("port {} out of range for {}", self.port, self.identifier)))
    }
}

/// Fields needed to insert a new instance row
#[derive(Debug, Clone)]
pub struct NewInstance {
    pub identifier: String,
    pub name: String,
    pub template: String,
    pub subdomain: String,
    pub port: u16,
    pub status: InstanceStatus,
    pub cpu_limit: String,
    pub memory_limit: String,
    pub data_path: String,
    pub container_id: Option<String>,
    pub proxy_site_id: Option<String>,
}

/// Catalog row for one port of the pool
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DbPortEntry {
    pub port: i32,
    pub available: bool,
    pub instance_id: Option<String>,
}

/// Optional predicates for listing live instances
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceFilter {
    pub instance_name: Option<String>,
    pub template_name: Option<String>,
    pub status: Option<InstanceStatus>,
}
