use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::database::DatabaseConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub ports: PortRangeConfig,
    pub runtime: RuntimeConfig,
    pub proxy: ProxyConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Inclusive range of host ports handed out to instances.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct PortRangeConfig {
    pub start: u16,
    pub end: u16,
}

impl PortRangeConfig {
    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            usize::from(self.end - self.start) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// One working directory per instance lives under here.
    pub instances_root: PathBuf,
    pub backups_root: PathBuf,
    /// One directory per service template.
    pub templates_root: PathBuf,
    /// Docker CLI used for compose deployments.
    pub docker_binary: String,
    pub command_timeout_secs: u64,
    pub default_log_lines: usize,
}

impl RuntimeConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    pub api_url: String,
    pub username: String,
    pub password: String,
    /// Address DNS records point at.
    pub server_ip: String,
    pub base_domain: String,
    pub propagation_delay_secs: u64,
    pub request_timeout_secs: u64,
    pub token_refresh_margin_secs: i64,
}

impl ProxyConfig {
    pub fn propagation_delay(&self) -> Duration {
        Duration::from_secs(self.propagation_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Bound for the whole create-site sequence: login, DNS record, site,
    /// propagation wait and certificate request.
    pub fn site_creation_timeout(&self) -> Duration {
        self.propagation_delay() + self.request_timeout() * 6
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig::default(),
            ports: PortRangeConfig {
                start: 14000,
                end: 14999,
            },
            runtime: RuntimeConfig {
                instances_root: PathBuf::from("./data/instances"),
                backups_root: PathBuf::from("./data/backups"),
                templates_root: PathBuf::from("./templates"),
                docker_binary: "docker".to_string(),
                command_timeout_secs: 120,
                default_log_lines: 100,
            },
            proxy: ProxyConfig {
                api_url: "http://127.0.0.1:8000".to_string(),
                username: "admin".to_string(),
                password: "changeme".to_string(),
                server_ip: "127.0.0.1".to_string(),
                base_domain: "example.com".to_string(),
                propagation_delay_secs: 5,
                request_timeout_secs: 30,
                token_refresh_margin_secs: 300,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        config.database = DatabaseConfig::from_env()?;

        if let Ok(host) = std::env::var("TENANTBOX_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("TENANTBOX_PORT") {
            config.server.port = port.parse()?;
        }
        if let Ok(range) = std::env::var("TENANTBOX_PORT_RANGE") {
            config.ports = parse_port_range(&range)?;
        }

        if let Ok(path) = std::env::var("TENANTBOX_INSTANCES_ROOT") {
            config.runtime.instances_root = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("TENANTBOX_BACKUPS_ROOT") {
            config.runtime.backups_root = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("TENANTBOX_TEMPLATES_ROOT") {
            config.runtime.templates_root = PathBuf::from(path);
        }

        if let Ok(domain) = std::env::var("TENANTBOX_BASE_DOMAIN") {
            config.proxy.base_domain = domain;
        }
        if let Ok(url) = std::env::var("PROXY_API_URL") {
            config.proxy.api_url = url;
        }
        if let Ok(username) = std::env::var("PROXY_USERNAME") {
            config.proxy.username = username;
        }
        if let Ok(password) = std::env::var("PROXY_PASSWORD") {
            config.proxy.password = password;
        }
        if let Ok(ip) = std::env::var("PROXY_SERVER_IP") {
            config.proxy.server_ip = ip;
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file (tenantbox.toml)
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.ports.is_empty() {
            anyhow::bail!(
                "Port range {}-{} is empty",
                self.ports.start,
                self.ports.end
            );
        }

        if self.ports.contains(self.server.port) {
            anyhow::bail!("Server port {} overlaps the instance port range", self.server.port);
        }

        if self.proxy.base_domain.trim().is_empty() {
            anyhow::bail!("Proxy base domain must be set");
        }

        if self.proxy.password == "changeme" {
            anyhow::bail!("Proxy password must be changed from default value");
        }

        Ok(())
    }
}

fn parse_port_range(value: &str) -> Result<PortRangeConfig> {
    let (start, end) = value
        .split_once('-')
        .ok_or_else(|| anyhow::anyhow!("Port range must look like START-END, got {}", value))?;
    let range = PortRangeConfig {
        start: start.trim().parse()?,
        end: end.trim().parse()?,
    };
    if range.is_empty() {
        anyhow::bail!("Port range {} is empty", value);
    }
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_range_parsing() {
        let range = parse_port_range("14000-14001").unwrap();
        assert_eq!(range, PortRangeConfig { start: 14000, end: 14001 });
        assert_eq!(range.len(), 2);

        assert!(parse_port_range("14001-14000").is_err());
        assert!(parse_port_range("14000").is_err());
    }

    #[test]
    fn test_default_config_requires_password_change() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.proxy.password = "s3cret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip_keeps_sections() {
        let toml_src = r#"
            [server]
            host = "127.0.0.1"
            port = 9090

            [ports]
            start = 14000
            end = 14001

            [runtime]
            instances_root = "/srv/instances"
            backups_root = "/srv/backups"
            templates_root = "/srv/templates"
            docker_binary = "docker"
            command_timeout_secs = 60
            default_log_lines = 100

            [proxy]
            api_url = "https://panel.example.com"
            username = "ops"
            password = "pw"
            server_ip = "203.0.113.7"
            base_domain = "apps.example.com"
            propagation_delay_secs = 5
            request_timeout_secs = 20
            token_refresh_margin_secs = 300

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.ports.len(), 2);
        assert_eq!(config.proxy.base_domain, "apps.example.com");
        assert_eq!(config.runtime.instances_root, PathBuf::from("/srv/instances"));
        assert!(config.validate().is_ok());
    }
}
