use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::models::*;
use super::session::{Clock, ProxySession, SystemClock};
use super::{upstream_for, ProxyControl, ProxyError, ProxyResult};
use crate::config::ProxyConfig;

/// Authenticated client for one control plane.
///
/// The session is held here and refreshed lazily; every authenticated call
/// obtains its token through [`ProxyClient::get_token`].
pub struct ProxyClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    server_ip: String,
    base_domain: String,
    propagation_delay: Duration,
    refresh_margin: chrono::Duration,
    clock: Arc<dyn Clock>,
    session: Mutex<Option<ProxySession>>,
}

impl ProxyClient {
    pub fn new(config: &ProxyConfig) -> ProxyResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ProxyError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            server_ip: config.server_ip.clone(),
            base_domain: config.base_domain.clone(),
            propagation_delay: config.propagation_delay(),
            refresh_margin: chrono::Duration::seconds(config.token_refresh_margin_secs),
            clock: Arc::new(SystemClock),
            session: Mutex::new(None),
        })
    }

    /// Replace the clock used for expiry checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn domain_for(&self, subdomain: &str) -> String {
        format!("{}.{}", subdomain, self.base_domain)
    }

    /// Exchange credentials for a fresh session and cache it.
    pub async fn login(&self) -> ProxyResult<ProxySession> {
        let session = self.authenticate().await?;
        *self.session.lock().await = Some(session.clone());
        Ok(session)
    }

    async fn authenticate(&self) -> ProxyResult<ProxySession> {
        let url = format!("{}/api/auth/login", self.base_url);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ProxyError::Auth(format!("login rejected with {}", status)));
        }

        let login: LoginResponse = parse_response(response).await?;
        info!("Authenticated with proxy control plane, token valid until {}", login.expires_at);
        Ok(ProxySession {
            token: login.token,
            expires_at: login.expires_at,
        })
    }

    /// Cached token, re-authenticating when it is missing or close to expiry.
    pub async fn get_token(&self) -> ProxyResult<String> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            if !session.needs_refresh(self.clock.now(), self.refresh_margin) {
                return Ok(session.token.clone());
            }
            debug!("Proxy token expires within {}s, refreshing", self.refresh_margin.num_seconds());
        }

        let session = self.authenticate().await?;
        let token = session.token.clone();
        *guard = Some(session);
        Ok(token)
    }

    async fn invalidate(&self) {
        *self.session.lock().await = None;
    }

    /// Authenticated request. A 401 drops the session and retries once.
    async fn send<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: Option<&B>) -> ProxyResult<Response> {
        let url = format!("{}{}", self.base_url, path);
        for attempt in 0..2 {
            let token = self.get_token().await?;
            debug!("{} {}", method, url);

            let mut request = self.client.request(method.clone(), &url).bearer_auth(token);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await?;

            if response.status() == StatusCode::UNAUTHORIZED && attempt == 0 {
                warn!("Proxy token rejected, re-authenticating");
                self.invalidate().await;
                continue;
            }
            return Ok(response);
        }
        Err(ProxyError::Auth("token rejected after re-authentication".to_string()))
    }

    pub async fn list_sites(&self) -> ProxyResult<Vec<SiteRecord>> {
        let response = self.send::<()>(Method::GET, "/api/sites", None).await?;
        parse_response(response).await
    }

    /// Sites have no get-by-domain endpoint; list and filter.
    pub async fn find_site(&self, domain: &str) -> ProxyResult<Option<SiteRecord>> {
        Ok(self.list_sites().await?.into_iter().find(|site| site.domain == domain))
    }

    pub async fn create_certificate(&self, domain: &str, site_id: &str) -> ProxyResult<CertificateInfo> {
        let response = self
            .send(Method::POST, "/api/certificates", Some(&CertificateRequest { domain, site_id }))
            .await?;
        let certificate: CertificateInfo = parse_response(response).await?;
        info!("Issued certificate {} for {}", certificate.id, domain);
        Ok(certificate)
    }
}

#[async_trait]
impl ProxyControl for ProxyClient {
    async fn add_domain(&self, domain: &str) -> ProxyResult<AddDomainResult> {
        let response = self
            .send(
                Method::POST,
                "/api/dns/records",
                Some(&DnsRecordRequest {
                    name: domain,
                    record_type: "A",
                    value: &self.server_ip,
                }),
            )
            .await?;

        let status = response.status();
        if status.is_success() {
            info!("Added DNS record {} -> {}", domain, self.server_ip);
            return Ok(AddDomainResult {
                domain: domain.to_string(),
                status: AddDomainStatus::Created,
            });
        }

        let message = error_message(response).await;
        if status == StatusCode::CONFLICT || message.to_lowercase().contains("already exists") {
            debug!("DNS record {} already exists", domain);
            return Ok(AddDomainResult {
                domain: domain.to_string(),
                status: AddDomainStatus::Exists,
            });
        }

        Err(ProxyError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn create_site(&self, subdomain: &str, port: u16) -> ProxyResult<ProxySite> {
        let domain = self.domain_for(subdomain);
        let upstream = upstream_for(port);

        self.add_domain(&domain).await?;

        let response = self
            .send(
                Method::POST,
                "/api/sites",
                Some(&SiteRequest {
                    domain: &domain,
                    upstreams: vec![upstream.clone()],
                }),
            )
            .await?;
        let site: SiteRecord = parse_response(response).await?;
        info!("Created proxy site {} for {} -> {}", site.id, domain, upstream);

        // DNS must resolve before the ACME challenge can pass.
        tokio::time::sleep(self.propagation_delay).await;

        let ssl = match self.create_certificate(&domain, &site.id).await {
            Ok(certificate) => Some(certificate),
            Err(e) => {
                warn!("Certificate for {} failed, site is served without TLS: {}", domain, e);
                None
            }
        };

        Ok(ProxySite {
            site_id: site.id,
            domain,
            upstream,
            ssl,
        })
    }

    async fn delete_site(&self, domain: &str) -> ProxyResult<DeleteSiteStatus> {
        let Some(site) = self.find_site(domain).await? else {
            info!("No proxy site for {}, nothing to delete", domain);
            return Ok(DeleteSiteStatus::NotFound);
        };

        // cascade removes certificates and upstreams; DNS records are kept
        let path = format!("/api/sites/{}?cascade=true&keep_dns=true", site.id);
        let response = self.send::<()>(Method::DELETE, &path, None).await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(DeleteSiteStatus::NotFound);
        }
        if !status.is_success() {
            return Err(ProxyError::Api {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        info!("Deleted proxy site {} ({})", site.id, domain);
        Ok(DeleteSiteStatus::Deleted)
    }

    async fn update_site_proxy(&self, domain: &str, port: u16) -> ProxyResult<SiteRecord> {
        let site = self
            .find_site(domain)
            .await?
            .ok_or_else(|| ProxyError::SiteNotFound(domain.to_string()))?;

        let path = format!("/api/sites/{}/upstreams", site.id);
        let response = self
            .send(
                Method::PUT,
                &path,
                Some(&UpstreamsRequest {
                    upstreams: vec![upstream_for(port)],
                }),
            )
            .await?;
        let updated: SiteRecord = parse_response(response).await?;
        info!("Proxy site {} now points at port {}", updated.id, port);
        Ok(updated)
    }
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiErrorBody>(&text) {
        Ok(body) => body.message,
        Err(_) if text.is_empty() => status.to_string(),
        Err(_) => text,
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> ProxyResult<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(ProxyError::Api {
            status: status.as_u16(),
            message: error_message(response).await,
        });
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ProxyError::Decode(format!("{}: {}", e, text)))
}
