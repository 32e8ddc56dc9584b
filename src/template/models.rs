use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::TemplateError;
use crate::container::ResourceLimits;
use crate::database::models::DbService;

pub const MANIFEST_FILE: &str = "template.toml";
pub const DESCRIPTOR_FILE: &str = "docker-compose.yml";
pub const ENV_TEMPLATE_FILE: &str = ".env.template";

/// Contents of `template.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateManifest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
    pub default_port: u16,
    #[serde(default = "default_cpu")]
    pub default_cpu: String,
    #[serde(default = "default_memory")]
    pub default_memory: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_cpu() -> String {
    "1".to_string()
}

fn default_memory() -> String {
    "512M".to_string()
}

impl TemplateManifest {
    pub fn parse(content: &str) -> Result<Self, TemplateError> {
        let manifest: TemplateManifest =
            toml::from_str(content).map_err(|e| TemplateError::Manifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        crate::validation::validate_template_name(&self.name)
            .map_err(|e| TemplateError::Manifest(e.to_string()))?;
        if self.default_port == 0 {
            return Err(TemplateError::Manifest(format!("{}: default_port must be non-zero", self.name)));
        }
        ResourceLimits::parse(&self.default_cpu, &self.default_memory)
            .map_err(|e| TemplateError::InvalidResource(format!("{}: {}", self.name, e)))?;
        Ok(())
    }
}

/// A template directory that passed validation
#[derive(Debug, Clone)]
pub struct ServiceTemplate {
    pub manifest: TemplateManifest,
    pub dir: PathBuf,
}

impl ServiceTemplate {
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.dir.join(DESCRIPTOR_FILE)
    }

    pub fn env_template_path(&self) -> PathBuf {
        self.dir.join(ENV_TEMPLATE_FILE)
    }

    pub fn manifest_path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    pub fn to_db_service(&self) -> DbService {
        let now = Utc::now();
        DbService {
            name: self.manifest.name.clone(),
            description: self.manifest.description.clone(),
            version: self.manifest.version.clone(),
            default_port: i32::from(self.manifest.default_port),
            default_cpu: self.manifest.default_cpu.clone(),
            default_memory: self.manifest.default_memory.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_defaults() {
        let manifest = TemplateManifest::parse(
            r#"
            name = "demo"
            default_port = 8080
            "#,
        )
        .unwrap();
        assert_eq!(manifest.version, "1.0.0");
        assert_eq!(manifest.default_cpu, "1");
        assert_eq!(manifest.default_memory, "512M");
    }

    #[test]
    fn test_manifest_rejects_bad_limits() {
        let err = TemplateManifest::parse(
            r#"
            name = "demo"
            default_port = 8080
            default_memory = "lots"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidResource(_)));
    }
}
