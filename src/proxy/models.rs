use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Control-plane ids arrive as numbers or strings; keep them opaque.
fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(alias = "expires")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DnsRecordRequest<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub record_type: &'static str,
    pub value: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddDomainStatus {
    Created,
    Exists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddDomainResult {
    pub domain: String,
    pub status: AddDomainStatus,
}

#[derive(Debug, Serialize)]
pub struct SiteRequest<'a> {
    pub domain: &'a str,
    pub upstreams: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UpstreamsRequest {
    pub upstreams: Vec<String>,
}

/// A site as the control plane reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRecord {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    pub domain: String,
    #[serde(default)]
    pub upstreams: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CertificateRequest<'a> {
    pub domain: &'a str,
    pub site_id: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    pub domain: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of a successful `create_site`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxySite {
    pub site_id: String,
    pub domain: String,
    pub upstream: String,
    /// `None` when the certificate request failed.
    pub ssl: Option<CertificateInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteSiteStatus {
    Deleted,
    NotFound,
}

/// Error body; the control plane uses either key.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(alias = "error")]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_ids_are_opaque() {
        let numeric: SiteRecord =
            serde_json::from_str(r#"{"id": 42, "domain": "a.example.com"}"#).unwrap();
        assert_eq!(numeric.id, "42");
        assert!(numeric.upstreams.is_empty());

        let text: SiteRecord = serde_json::from_str(
            r#"{"id": "s-1", "domain": "a.example.com", "upstreams": ["http://127.0.0.1:14000"]}"#,
        )
        .unwrap();
        assert_eq!(text.id, "s-1");
    }

    #[test]
    fn test_error_body_accepts_either_key() {
        let a: ApiErrorBody = serde_json::from_str(r#"{"error": "boom"}"#).unwrap();
        let b: ApiErrorBody = serde_json::from_str(r#"{"message": "boom"}"#).unwrap();
        assert_eq!(a.message, b.message);
    }
}
