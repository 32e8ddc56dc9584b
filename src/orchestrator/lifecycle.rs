use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::models::*;
use super::saga::{Compensation, Saga};
use crate::config::ProxyConfig;
use crate::container::{BackupInfo, ContainerState, ProvisionRequest, ResourceLimits, RuntimeDriver};
use crate::database::models::{DbInstance, DbService, InstanceFilter, InstanceStatus, NewInstance};
use crate::database::{Database, InstanceRepository, PortRepository, ServiceRepository};
use crate::error::{Result, TenantBoxError};
use crate::network::{PortAllocator, PortPoolStats};
use crate::proxy::{ProxyControl, ProxyError, SiteRecord};
use crate::template::TemplateRegistry;
use crate::validation;

/// Sequences the port pool, the runtime driver, the proxy control plane and
/// the catalog into instance lifecycle operations.
///
/// The catalog is the only state; nothing about instances is cached here.
pub struct Orchestrator {
    db: Database,
    allocator: PortAllocator,
    driver: RuntimeDriver,
    proxy: Arc<dyn ProxyControl>,
    templates: TemplateRegistry,
    base_domain: String,
    site_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        allocator: PortAllocator,
        driver: RuntimeDriver,
        proxy: Arc<dyn ProxyControl>,
        templates: TemplateRegistry,
        proxy_config: &ProxyConfig,
    ) -> Self {
        Self {
            db,
            allocator,
            driver,
            proxy,
            templates,
            base_domain: proxy_config.base_domain.clone(),
            site_timeout: proxy_config.site_creation_timeout(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn domain_of(&self, subdomain: &str) -> String {
        format!("{}.{}", subdomain, self.base_domain)
    }

    fn release_port_later(&self, port: u16) -> Compensation<'_> {
        Box::pin(async move { self.allocator.release(&self.db, port).await })
    }

    fn remove_runtime_later(&self, identifier: String) -> Compensation<'_> {
        Box::pin(async move { self.driver.delete(&identifier).await.map_err(TenantBoxError::from) })
    }

    fn remove_site_later(&self, domain: String) -> Compensation<'_> {
        Box::pin(async move {
            let status = self.proxy.delete_site(&domain).await?;
            info!("Proxy site cleanup for {}: {:?}", domain, status);
            Ok(())
        })
    }

    /// Provision a new instance end to end.
    ///
    /// Validation and uniqueness checks happen before any side effect. The
    /// port, runtime and proxy steps run as a saga; the catalog write comes
    /// last and is not compensated.
    pub async fn create_instance(&self, request: CreateInstanceRequest) -> Result<CreatedInstance> {
        let CreateInstanceRequest {
            instance_name,
            template_name,
            resources,
        } = request;

        validation::validate_instance_name(&instance_name)?;
        validation::validate_template_name(&template_name)?;

        let service = ServiceRepository::new(&self.db)
            .find_by_name(&template_name)
            .await?
            .ok_or_else(|| TenantBoxError::template_not_found(&template_name))?;
        let limits = ResourceLimits::resolve(&resources, &service.default_cpu, &service.default_memory)?;
        let template = self.templates.load(&template_name).await?;

        let identifier = validation::instance_identifier(&instance_name, &template_name);
        let subdomain = identifier.clone();
        if InstanceRepository::new(&self.db).find_live(&identifier).await?.is_some() {
            return Err(TenantBoxError::instance_exists(&identifier));
        }

        info!("Creating instance {} from template {}", identifier, template_name);
        let mut saga = Saga::new(format!("create {}", identifier));

        let port = saga
            .step(
                "allocate_port",
                self.allocator.allocate(&self.db, &identifier),
                |&port| self.release_port_later(port),
            )
            .await?;

        let handle = saga
            .step(
                "provision_runtime",
                async {
                    self.driver
                        .provision(ProvisionRequest {
                            instance_name: &instance_name,
                            identifier: &identifier,
                            subdomain: &subdomain,
                            port,
                            template: &template,
                            limits,
                        })
                        .await
                        .map_err(TenantBoxError::from)
                },
                |_| self.remove_runtime_later(identifier.clone()),
            )
            .await?;

        // A failed or timed-out create may still have registered the site.
        let site = saga
            .last_step_with_cleanup(
                "create_proxy_site",
                async {
                    match tokio::time::timeout(self.site_timeout, self.proxy.create_site(&subdomain, port)).await {
                        Ok(result) => result.map_err(TenantBoxError::from),
                        Err(_) => Err(TenantBoxError::Proxy(ProxyError::Timeout(format!(
                            "create_site for {} exceeded {:?}",
                            subdomain, self.site_timeout
                        )))),
                    }
                },
                self.remove_site_later(self.domain_of(&subdomain)),
            )
            .await?;

        let status = if handle.running {
            InstanceStatus::Running
        } else {
            InstanceStatus::Stopped
        };
        let record = NewInstance {
            identifier: identifier.clone(),
            name: instance_name.clone(),
            template: template_name.clone(),
            subdomain: subdomain.clone(),
            port,
            status,
            cpu_limit: limits.cpu.label(),
            memory_limit: limits.memory.label(),
            data_path: handle.data_path.display().to_string(),
            container_id: Some(handle.container_id.clone()),
            proxy_site_id: Some(site.site_id.clone()),
        };

        if let Err(e) = self.persist_new_instance(&record).await {
            // Runtime and proxy both succeeded; nothing is rolled back here.
            error!(
                target: "tenantbox::reconcile",
                reconciliation = true,
                identifier = %identifier,
                port = port,
                container_id = %handle.container_id,
                proxy_site_id = %site.site_id,
                "Instance is live without a catalog record: {}",
                e
            );
            return Err(e);
        }

        let scheme = if site.ssl.is_some() { "https" } else { "http" };
        info!("Instance {} is live at {}://{}", identifier, scheme, site.domain);

        Ok(CreatedInstance {
            url: format!("{}://{}", scheme, site.domain),
            identifier,
            name: instance_name,
            template: template_name,
            subdomain,
            port,
            data_path: handle.data_path,
            container_id: handle.container_id,
            status,
            cpu_limit: record.cpu_limit,
            memory_limit: record.memory_limit,
            proxy_site: site,
        })
    }

    /// Insert the instance row and bind its port in one transaction.
    async fn persist_new_instance(&self, record: &NewInstance) -> Result<()> {
        let mut tx = self.db.begin_transaction().await?;
        InstanceRepository::insert_in(&mut tx, record).await?;
        PortRepository::bind_owner_in(&mut tx, record.port, &record.identifier).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn live_instance(&self, identifier: &str) -> Result<DbInstance> {
        validation::validate_identifier(identifier)?;
        InstanceRepository::new(&self.db)
            .find_live(identifier)
            .await?
            .ok_or_else(|| TenantBoxError::instance_not_found(identifier))
    }

    async fn finish_transition(&self, identifier: &str, state: ContainerState) -> Result<LifecycleResult> {
        let status = if state.running {
            InstanceStatus::Running
        } else {
            InstanceStatus::Stopped
        };
        InstanceRepository::new(&self.db)
            .update_status(identifier, status, Some(&state.id))
            .await?;

        Ok(LifecycleResult {
            identifier: identifier.to_string(),
            status,
            container: state.into(),
        })
    }

    pub async fn get_instance(&self, identifier: &str) -> Result<DbInstance> {
        self.live_instance(identifier).await
    }

    pub async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<DbInstance>> {
        Ok(InstanceRepository::new(&self.db).list_live(filter).await?)
    }

    pub async fn list_templates(&self) -> Result<Vec<DbService>> {
        Ok(ServiceRepository::new(&self.db).list().await?)
    }

    pub async fn pool_stats(&self) -> Result<PortPoolStats> {
        self.allocator.stats(&self.db).await
    }

    pub async fn start_instance(&self, identifier: &str) -> Result<LifecycleResult> {
        let instance = self.live_instance(identifier).await?;
        let state = self.driver.start(&instance.identifier).await?;
        self.finish_transition(&instance.identifier, state).await
    }

    pub async fn stop_instance(&self, identifier: &str) -> Result<LifecycleResult> {
        let instance = self.live_instance(identifier).await?;
        let state = self.driver.stop(&instance.identifier).await?;
        self.finish_transition(&instance.identifier, state).await
    }

    pub async fn restart_instance(&self, identifier: &str) -> Result<LifecycleResult> {
        let instance = self.live_instance(identifier).await?;
        let state = self.driver.restart(&instance.identifier).await?;
        self.finish_transition(&instance.identifier, state).await
    }

    /// Tear down and bring back up. On failure the catalog records what the
    /// runtime reports afterwards and the error is returned.
    pub async fn redeploy_instance(&self, identifier: &str) -> Result<LifecycleResult> {
        let instance = self.live_instance(identifier).await?;
        match self.driver.redeploy(&instance.identifier).await {
            Ok(state) => self.finish_transition(&instance.identifier, state).await,
            Err(e) => {
                let observed = self.driver.status(&instance.identifier).await;
                let status = if observed.running {
                    InstanceStatus::Running
                } else {
                    InstanceStatus::Stopped
                };
                warn!("Redeploy of {} failed, instance is {}: {}", instance.identifier, status, e);
                if let Err(db_err) = InstanceRepository::new(&self.db)
                    .update_status(&instance.identifier, status, None)
                    .await
                {
                    error!("Failed to record status of {}: {}", instance.identifier, db_err);
                }
                Err(e.into())
            }
        }
    }

    pub async fn backup_instance(&self, identifier: &str) -> Result<BackupInfo> {
        let instance = self.live_instance(identifier).await?;
        Ok(self.driver.backup(&instance.identifier).await?)
    }

    /// Live runtime status. A found container's state is written back to
    /// the catalog; a missing one leaves the record untouched.
    pub async fn instance_status(&self, identifier: &str) -> Result<InstanceStatusReport> {
        let instance = self.live_instance(identifier).await?;
        let recorded = instance.status()?;
        let container = self.driver.status(&instance.identifier).await;

        let status = match container.status.as_str() {
            "not_found" | "unknown" => recorded,
            _ if container.running => InstanceStatus::Running,
            _ => InstanceStatus::Stopped,
        };
        if status != recorded {
            InstanceRepository::new(&self.db)
                .update_status(&instance.identifier, status, None)
                .await?;
        }

        Ok(InstanceStatusReport {
            identifier: instance.identifier,
            status,
            container,
            checked_at: Utc::now(),
        })
    }

    pub async fn instance_logs(&self, identifier: &str, lines: Option<usize>) -> Result<String> {
        let instance = self.live_instance(identifier).await?;
        Ok(self.driver.logs(&instance.identifier, lines).await?)
    }

    /// Remove runtime resources, then the proxy site (best effort), then
    /// free the port and soft-delete the row in one transaction.
    pub async fn delete_instance(&self, identifier: &str) -> Result<DeletedInstance> {
        let instance = self.live_instance(identifier).await?;
        self.driver.delete(&instance.identifier).await?;

        let domain = self.domain_of(&instance.subdomain);
        let proxy_site = match self.proxy.delete_site(&domain).await {
            Ok(status) => ProxyCleanup::from(status),
            Err(e) => {
                warn!("Proxy site cleanup for {} failed, continuing: {}", domain, e);
                ProxyCleanup::Failed
            }
        };

        let port = instance.host_port()?;
        let mut tx = self.db.begin_transaction().await?;
        PortRepository::release_in(&mut tx, port).await?;
        InstanceRepository::mark_deleted_in(&mut tx, &instance.identifier).await?;
        tx.commit().await?;

        info!("Deleted instance {} and released port {}", instance.identifier, port);
        Ok(DeletedInstance {
            identifier: instance.identifier,
            released_port: port,
            proxy_site,
        })
    }

    /// Point the instance's proxy site back at its catalog port.
    pub async fn repoint_instance(&self, identifier: &str) -> Result<SiteRecord> {
        let instance = self.live_instance(identifier).await?;
        let site = self
            .proxy
            .update_site_proxy(&self.domain_of(&instance.subdomain), instance.host_port()?)
            .await?;
        InstanceRepository::new(&self.db)
            .update_proxy_site(&instance.identifier, &site.id)
            .await?;
        Ok(site)
    }
}
