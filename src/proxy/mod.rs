//! Client for the reverse-proxy / DNS / certificate control plane.

pub mod client;
pub mod models;
pub mod session;

pub use client::ProxyClient;
pub use models::{AddDomainResult, AddDomainStatus, CertificateInfo, DeleteSiteStatus, ProxySite, SiteRecord};
pub use session::{Clock, ProxySession, SystemClock};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Control plane returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Control plane unreachable: {0}")]
    Transport(String),

    #[error("Control plane request timed out: {0}")]
    Timeout(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("No proxy site for domain {0}")]
    SiteNotFound(String),

    #[error("Unexpected control plane response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProxyError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProxyError::Decode(err.to_string())
        } else {
            ProxyError::Transport(err.to_string())
        }
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;

/// Control-plane operations the orchestrator depends on.
#[async_trait]
pub trait ProxyControl: Send + Sync {
    /// Register `domain` in DNS. Repeat calls report `Exists`.
    async fn add_domain(&self, domain: &str) -> ProxyResult<AddDomainResult>;

    /// Route `<subdomain>.<base domain>` to `127.0.0.1:<port>` and request a
    /// certificate. Certificate failure leaves `ssl` empty.
    async fn create_site(&self, subdomain: &str, port: u16) -> ProxyResult<ProxySite>;

    /// Remove the site serving `domain`, keeping its DNS record. Repeat
    /// calls report `NotFound`.
    async fn delete_site(&self, domain: &str) -> ProxyResult<DeleteSiteStatus>;

    /// Point the site serving `domain` at a new local port.
    async fn update_site_proxy(&self, domain: &str, port: u16) -> ProxyResult<SiteRecord>;
}

/// Upstream URL for a local instance port.
pub fn upstream_for(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}
