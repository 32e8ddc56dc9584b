#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use tenantbox::config::{PortRangeConfig, ProxyConfig, RuntimeConfig};
use tenantbox::container::{ContainerEngine, ContainerState, ResourceLimits, RuntimeDriver, RuntimeError};
use tenantbox::database::{Database, DatabaseConfig};
use tenantbox::network::PortAllocator;
use tenantbox::proxy::{
    AddDomainResult, AddDomainStatus, CertificateInfo, DeleteSiteStatus, ProxyControl, ProxyError, ProxyResult,
    ProxySite, SiteRecord,
};
use tenantbox::template::TemplateRegistry;
use tenantbox::Orchestrator;

pub const BASE_DOMAIN: &str = "apps.test";

/// Docker stand-in: `compose_up` starts a container named after the project.
#[derive(Default)]
pub struct FakeEngine {
    pub containers: Mutex<HashMap<String, ContainerState>>,
    pub fail_compose_up: AtomicBool,
    pub fail_compose_down: AtomicBool,
    pub ups: AtomicUsize,
}

impl FakeEngine {
    pub fn has_container(&self, name: &str) -> bool {
        self.containers.lock().unwrap().contains_key(name)
    }

    fn set_running(&self, container: &str, running: bool) -> Result<(), RuntimeError> {
        let mut containers = self.containers.lock().unwrap();
        let state = containers
            .get_mut(container)
            .ok_or_else(|| RuntimeError::NotFound(container.to_string()))?;
        state.running = running;
        state.status = if running { "running" } else { "exited" }.to_string();
        Ok(())
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn compose_up(&self, project: &str, _workdir: &Path) -> Result<(), RuntimeError> {
        if self.fail_compose_up.load(Ordering::SeqCst) {
            return Err(RuntimeError::Command {
                command: "docker compose up".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "pull access denied".to_string(),
            });
        }
        let n = self.ups.fetch_add(1, Ordering::SeqCst);
        self.containers.lock().unwrap().insert(
            project.to_string(),
            ContainerState {
                id: format!("c{}-{}", n, project),
                status: "running".to_string(),
                running: true,
                started_at: Some("2024-05-01T10:00:00Z".to_string()),
                finished_at: None,
            },
        );
        Ok(())
    }

    async fn compose_down(&self, project: &str, _workdir: &Path, _remove_volumes: bool) -> Result<(), RuntimeError> {
        if self.fail_compose_down.load(Ordering::SeqCst) {
            return Err(RuntimeError::Command {
                command: "docker compose down".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "daemon unavailable".to_string(),
            });
        }
        self.containers.lock().unwrap().remove(project);
        Ok(())
    }

    async fn inspect(&self, container: &str) -> Result<Option<ContainerState>, RuntimeError> {
        Ok(self.containers.lock().unwrap().get(container).cloned())
    }

    async fn start(&self, container: &str) -> Result<(), RuntimeError> {
        self.set_running(container, true)
    }

    async fn stop(&self, container: &str) -> Result<(), RuntimeError> {
        self.set_running(container, false)
    }

    async fn restart(&self, container: &str) -> Result<(), RuntimeError> {
        self.set_running(container, true)
    }

    async fn remove(&self, container: &str) -> Result<(), RuntimeError> {
        self.containers
            .lock()
            .unwrap()
            .remove(container)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::NotFound(container.to_string()))
    }

    async fn logs(&self, container: &str, tail: usize) -> Result<String, RuntimeError> {
        Ok(format!("{}: last {} lines", container, tail))
    }

    async fn apply_limits(&self, _container: &str, _limits: &ResourceLimits) -> Result<(), RuntimeError> {
        Ok(())
    }
}

/// Control-plane stand-in keyed by domain.
#[derive(Default)]
pub struct FakeProxy {
    pub sites: Mutex<HashMap<String, SiteRecord>>,
    pub domains: Mutex<Vec<String>>,
    pub fail_create_site: AtomicBool,
    pub fail_delete_site: AtomicBool,
    pub fail_certificate: AtomicBool,
    /// Delay after the site is registered, like waiting out DNS propagation.
    pub create_site_delay_ms: AtomicU64,
    next_id: AtomicUsize,
}

impl FakeProxy {
    pub fn has_site(&self, domain: &str) -> bool {
        self.sites.lock().unwrap().contains_key(domain)
    }
}

#[async_trait]
impl ProxyControl for FakeProxy {
    async fn add_domain(&self, domain: &str) -> ProxyResult<AddDomainResult> {
        let mut domains = self.domains.lock().unwrap();
        let status = if domains.iter().any(|d| d == domain) {
            AddDomainStatus::Exists
        } else {
            domains.push(domain.to_string());
            AddDomainStatus::Created
        };
        Ok(AddDomainResult {
            domain: domain.to_string(),
            status,
        })
    }

    async fn create_site(&self, subdomain: &str, port: u16) -> ProxyResult<ProxySite> {
        if self.fail_create_site.load(Ordering::SeqCst) {
            return Err(ProxyError::Api {
                status: 502,
                message: "upstream control plane error".to_string(),
            });
        }
        let domain = format!("{}.{}", subdomain, BASE_DOMAIN);
        self.add_domain(&domain).await?;

        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        let upstream = tenantbox::proxy::upstream_for(port);
        self.sites.lock().unwrap().insert(
            domain.clone(),
            SiteRecord {
                id: id.clone(),
                domain: domain.clone(),
                upstreams: vec![upstream.clone()],
            },
        );

        let delay = self.create_site_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let ssl = if self.fail_certificate.load(Ordering::SeqCst) {
            None
        } else {
            Some(CertificateInfo {
                id: format!("cert-{}", id),
                domain: domain.clone(),
                status: Some("issued".to_string()),
                expires_at: None,
            })
        };
        Ok(ProxySite {
            site_id: id,
            domain,
            upstream,
            ssl,
        })
    }

    async fn delete_site(&self, domain: &str) -> ProxyResult<DeleteSiteStatus> {
        if self.fail_delete_site.load(Ordering::SeqCst) {
            return Err(ProxyError::Transport("connection refused".to_string()));
        }
        Ok(match self.sites.lock().unwrap().remove(domain) {
            Some(_) => DeleteSiteStatus::Deleted,
            None => DeleteSiteStatus::NotFound,
        })
    }

    async fn update_site_proxy(&self, domain: &str, port: u16) -> ProxyResult<SiteRecord> {
        let mut sites = self.sites.lock().unwrap();
        let site = sites
            .get_mut(domain)
            .ok_or_else(|| ProxyError::SiteNotFound(domain.to_string()))?;
        site.upstreams = vec![tenantbox::proxy::upstream_for(port)];
        Ok(site.clone())
    }
}

pub fn proxy_config(api_url: &str) -> ProxyConfig {
    ProxyConfig {
        api_url: api_url.to_string(),
        username: "admin".to_string(),
        password: "secret".to_string(),
        server_ip: "203.0.113.10".to_string(),
        base_domain: BASE_DOMAIN.to_string(),
        propagation_delay_secs: 0,
        request_timeout_secs: 5,
        token_refresh_margin_secs: 300,
    }
}

pub fn write_template(root: &Path, name: &str) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("template.toml"),
        format!(
            "name = \"{}\"\ndescription = \"Demo service\"\ndefault_port = 8080\ndefault_cpu = \"1\"\ndefault_memory = \"512M\"\n",
            name
        ),
    )
    .unwrap();
    std::fs::write(
        dir.join("docker-compose.yml"),
        "services:\n  app:\n    image: nginx:alpine\n    container_name: ${CONTAINER_NAME}\n    ports:\n      - \"127.0.0.1:${PORT}:80\"\n",
    )
    .unwrap();
    std::fs::write(
        dir.join(".env.template"),
        "INSTANCE_NAME=${INSTANCE_NAME}\nCONTAINER_NAME=${CONTAINER_NAME}\nPORT=${PORT}\nPUBLIC_URL=https://${SUBDOMAIN}.${BASE_DOMAIN}\n",
    )
    .unwrap();
}

/// An orchestrator over an in-memory catalog, fake engine and fake proxy.
pub struct Harness {
    pub root: TempDir,
    pub db: Database,
    pub engine: Arc<FakeEngine>,
    pub proxy: Arc<FakeProxy>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub async fn new(start: u16, end: u16) -> Self {
        Self::with_proxy_config(start, end, proxy_config("http://127.0.0.1:1")).await
    }

    pub async fn with_proxy_config(start: u16, end: u16, proxy_config: ProxyConfig) -> Self {
        let root = TempDir::new().unwrap();
        let templates_root = root.path().join("templates");
        write_template(&templates_root, "demo");

        let db = Database::new(DatabaseConfig::in_memory()).await.unwrap();
        let templates = TemplateRegistry::new(&templates_root);
        templates.sync(&db).await.unwrap();

        let allocator = PortAllocator::new(PortRangeConfig { start, end });
        allocator.seed(&db).await.unwrap();

        let runtime = RuntimeConfig {
            instances_root: root.path().join("instances"),
            backups_root: root.path().join("backups"),
            templates_root,
            docker_binary: "docker".to_string(),
            command_timeout_secs: 5,
            default_log_lines: 50,
        };
        let engine = Arc::new(FakeEngine::default());
        let proxy = Arc::new(FakeProxy::default());
        let driver = RuntimeDriver::new(engine.clone(), runtime, BASE_DOMAIN);

        let orchestrator = Arc::new(Orchestrator::new(
            db.clone(),
            allocator,
            driver,
            proxy.clone(),
            templates,
            &proxy_config,
        ));

        Self {
            root,
            db,
            engine,
            proxy,
            orchestrator,
        }
    }

    pub fn workdir(&self, identifier: &str) -> std::path::PathBuf {
        self.root.path().join("instances").join(identifier)
    }

    pub async fn available_ports(&self) -> Vec<u16> {
        tenantbox::database::PortRepository::new(&self.db)
            .list_available()
            .await
            .unwrap()
    }
}
