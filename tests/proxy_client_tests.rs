mod common;

use axum::{
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use tenantbox::proxy::{AddDomainStatus, Clock, DeleteSiteStatus, ProxyClient, ProxyControl, ProxyError};

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// In-process control plane: tokens live one hour from the fixed epoch.
#[derive(Default)]
struct Plane {
    logins: usize,
    valid_tokens: HashSet<String>,
    dns: HashSet<String>,
    sites: BTreeMap<u64, (String, Vec<String>)>,
    next_id: u64,
    fail_certificates: bool,
    delete_queries: Vec<String>,
}

type Shared = Arc<Mutex<Plane>>;

fn authorized(plane: &Plane, headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| plane.valid_tokens.contains(token))
        .unwrap_or(false)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid token"}))).into_response()
}

#[derive(Deserialize)]
struct Login {
    username: String,
    password: String,
}

async fn login(State(plane): State<Shared>, Json(body): Json<Login>) -> Response {
    if body.username != "admin" || body.password != "secret" {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad credentials"}))).into_response();
    }
    let mut plane = plane.lock().unwrap();
    plane.logins += 1;
    let token = format!("tok-{}", plane.logins);
    plane.valid_tokens.insert(token.clone());
    Json(json!({"token": token, "expires": epoch() + Duration::hours(1)})).into_response()
}

#[derive(Deserialize)]
struct DnsRecord {
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    value: String,
}

async fn add_record(State(plane): State<Shared>, headers: HeaderMap, Json(body): Json<DnsRecord>) -> Response {
    let mut plane = plane.lock().unwrap();
    if !authorized(&plane, &headers) {
        return unauthorized();
    }
    assert_eq!(body.record_type, "A");
    assert_eq!(body.value, "203.0.113.10");
    if !plane.dns.insert(body.name) {
        return (StatusCode::CONFLICT, Json(json!({"error": "record already exists"}))).into_response();
    }
    (StatusCode::CREATED, Json(json!({"id": plane.dns.len()}))).into_response()
}

fn site_json(id: u64, domain: &str, upstreams: &[String]) -> serde_json::Value {
    json!({"id": id, "domain": domain, "upstreams": upstreams})
}

async fn list_sites(State(plane): State<Shared>, headers: HeaderMap) -> Response {
    let plane = plane.lock().unwrap();
    if !authorized(&plane, &headers) {
        return unauthorized();
    }
    let sites: Vec<_> = plane
        .sites
        .iter()
        .map(|(id, (domain, upstreams))| site_json(*id, domain, upstreams))
        .collect();
    Json(sites).into_response()
}

#[derive(Deserialize)]
struct NewSite {
    domain: String,
    upstreams: Vec<String>,
}

async fn create_site(State(plane): State<Shared>, headers: HeaderMap, Json(body): Json<NewSite>) -> Response {
    let mut plane = plane.lock().unwrap();
    if !authorized(&plane, &headers) {
        return unauthorized();
    }
    plane.next_id += 1;
    let id = plane.next_id;
    plane.sites.insert(id, (body.domain.clone(), body.upstreams.clone()));
    (StatusCode::CREATED, Json(site_json(id, &body.domain, &body.upstreams))).into_response()
}

async fn delete_site(
    State(plane): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    RawQuery(query): RawQuery,
) -> Response {
    let mut plane = plane.lock().unwrap();
    if !authorized(&plane, &headers) {
        return unauthorized();
    }
    plane.delete_queries.push(query.unwrap_or_default());
    match plane.sites.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"message": "no such site"}))).into_response(),
    }
}

#[derive(Deserialize)]
struct Upstreams {
    upstreams: Vec<String>,
}

async fn update_upstreams(
    State(plane): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(body): Json<Upstreams>,
) -> Response {
    let mut plane = plane.lock().unwrap();
    if !authorized(&plane, &headers) {
        return unauthorized();
    }
    match plane.sites.get_mut(&id) {
        Some((domain, upstreams)) => {
            *upstreams = body.upstreams;
            Json(site_json(id, domain, upstreams)).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Deserialize)]
struct NewCertificate {
    domain: String,
    site_id: String,
}

async fn create_certificate(
    State(plane): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<NewCertificate>,
) -> Response {
    let plane = plane.lock().unwrap();
    if !authorized(&plane, &headers) {
        return unauthorized();
    }
    if plane.fail_certificates {
        return (StatusCode::BAD_GATEWAY, Json(json!({"message": "acme challenge failed"}))).into_response();
    }
    Json(json!({
        "id": format!("cert-{}", body.site_id),
        "domain": body.domain,
        "status": "issued",
    }))
    .into_response()
}

async fn spawn_plane() -> (String, Shared) {
    let plane: Shared = Arc::new(Mutex::new(Plane::default()));
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/dns/records", post(add_record))
        .route("/api/sites", get(list_sites).post(create_site))
        .route("/api/sites/:id", axum::routing::delete(delete_site))
        .route("/api/sites/:id/upstreams", put(update_upstreams))
        .route("/api/certificates", post(create_certificate))
        .with_state(plane.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), plane)
}

async fn client(url: &str) -> (ProxyClient, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock(Mutex::new(epoch())));
    let client = ProxyClient::new(&common::proxy_config(url)).unwrap().with_clock(clock.clone());
    (client, clock)
}

#[tokio::test]
async fn test_token_is_reused_until_refresh_margin() {
    let (url, plane) = spawn_plane().await;
    let (client, clock) = client(&url).await;

    client.list_sites().await.unwrap();
    client.list_sites().await.unwrap();
    assert_eq!(plane.lock().unwrap().logins, 1);

    // 54 minutes in: six minutes left, outside the five minute margin.
    clock.advance(Duration::minutes(54));
    client.list_sites().await.unwrap();
    assert_eq!(plane.lock().unwrap().logins, 1);

    // 56 minutes in: four minutes left.
    clock.advance(Duration::minutes(2));
    client.list_sites().await.unwrap();
    assert_eq!(plane.lock().unwrap().logins, 2);
}

#[tokio::test]
async fn test_rejected_token_triggers_one_relogin() {
    let (url, plane) = spawn_plane().await;
    let (client, _clock) = client(&url).await;

    client.list_sites().await.unwrap();
    plane.lock().unwrap().valid_tokens.clear();

    client.list_sites().await.unwrap();
    assert_eq!(plane.lock().unwrap().logins, 2);
}

#[tokio::test]
async fn test_bad_credentials_surface_as_auth_error() {
    let (url, _plane) = spawn_plane().await;
    let mut config = common::proxy_config(&url);
    config.password = "wrong".to_string();
    let client = ProxyClient::new(&config).unwrap();

    let err = client.list_sites().await.unwrap_err();
    assert!(matches!(err, ProxyError::Auth(_)));
}

#[tokio::test]
async fn test_add_domain_is_idempotent() {
    let (url, plane) = spawn_plane().await;
    let (client, _clock) = client(&url).await;

    let first = client.add_domain("alpha-demo.apps.test").await.unwrap();
    let second = client.add_domain("alpha-demo.apps.test").await.unwrap();

    assert_eq!(first.status, AddDomainStatus::Created);
    assert_eq!(second.status, AddDomainStatus::Exists);
    assert_eq!(plane.lock().unwrap().dns.len(), 1);
}

#[tokio::test]
async fn test_create_then_delete_site_twice() {
    let (url, plane) = spawn_plane().await;
    let (client, _clock) = client(&url).await;

    let site = client.create_site("alpha-demo", 14000).await.unwrap();
    assert_eq!(site.domain, "alpha-demo.apps.test");
    assert_eq!(site.upstream, "http://127.0.0.1:14000");
    assert_eq!(site.site_id, "1");
    let ssl = site.ssl.expect("certificate issued");
    assert_eq!(ssl.id, "cert-1");

    let found = client.find_site("alpha-demo.apps.test").await.unwrap().unwrap();
    assert_eq!(found.upstreams, vec!["http://127.0.0.1:14000".to_string()]);

    let first = client.delete_site("alpha-demo.apps.test").await.unwrap();
    let second = client.delete_site("alpha-demo.apps.test").await.unwrap();
    assert_eq!(first, DeleteSiteStatus::Deleted);
    assert_eq!(second, DeleteSiteStatus::NotFound);

    let plane = plane.lock().unwrap();
    assert!(plane.sites.is_empty());
    // DNS record survives site removal.
    assert!(plane.dns.contains("alpha-demo.apps.test"));
    assert_eq!(plane.delete_queries, vec!["cascade=true&keep_dns=true".to_string()]);
}

#[tokio::test]
async fn test_certificate_failure_keeps_site_without_ssl() {
    let (url, plane) = spawn_plane().await;
    plane.lock().unwrap().fail_certificates = true;
    let (client, _clock) = client(&url).await;

    let site = client.create_site("beta-demo", 14001).await.unwrap();
    assert!(site.ssl.is_none());
    assert_eq!(plane.lock().unwrap().sites.len(), 1);
}

#[tokio::test]
async fn test_update_site_proxy_repoints_upstream() {
    let (url, _plane) = spawn_plane().await;
    let (client, _clock) = client(&url).await;

    client.create_site("alpha-demo", 14000).await.unwrap();
    let updated = client.update_site_proxy("alpha-demo.apps.test", 14005).await.unwrap();
    assert_eq!(updated.upstreams, vec!["http://127.0.0.1:14005".to_string()]);

    let err = client.update_site_proxy("ghost.apps.test", 14005).await.unwrap_err();
    assert!(matches!(err, ProxyError::SiteNotFound(_)));
}
