use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::models::{ServiceTemplate, TemplateManifest, DESCRIPTOR_FILE, ENV_TEMPLATE_FILE};
use super::TemplateError;
use crate::database::{Database, ServiceRepository};
use crate::error::Result;

/// Read-only view of the template directories under one root.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    root: PathBuf,
}

impl TemplateRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load one template by name, checking that every required file exists.
    pub async fn load(&self, name: &str) -> std::result::Result<ServiceTemplate, TemplateError> {
        let dir = self.root.join(name);
        if !tokio::fs::try_exists(&dir).await? {
            return Err(TemplateError::NotFound(name.to_string()));
        }
        let template = Self::load_dir(&dir).await?;
        if template.name() != name {
            return Err(TemplateError::Manifest(format!(
                "directory {} declares template '{}'",
                dir.display(),
                template.name()
            )));
        }
        Ok(template)
    }

    async fn load_dir(dir: &Path) -> std::result::Result<ServiceTemplate, TemplateError> {
        let manifest_path = ServiceTemplate::manifest_path(dir);
        if !tokio::fs::try_exists(&manifest_path).await? {
            return Err(TemplateError::MissingFile {
                template: dir.display().to_string(),
                file: super::models::MANIFEST_FILE,
            });
        }
        let manifest = TemplateManifest::parse(&tokio::fs::read_to_string(&manifest_path).await?)?;

        for file in [DESCRIPTOR_FILE, ENV_TEMPLATE_FILE] {
            if !tokio::fs::try_exists(dir.join(file)).await? {
                return Err(TemplateError::MissingFile {
                    template: manifest.name.clone(),
                    file,
                });
            }
        }

        Ok(ServiceTemplate {
            manifest,
            dir: dir.to_path_buf(),
        })
    }

    /// Every valid template directory. Invalid ones are skipped with a warning.
    pub async fn scan(&self) -> std::result::Result<Vec<ServiceTemplate>, TemplateError> {
        let mut templates = Vec::new();
        if !tokio::fs::try_exists(&self.root).await? {
            warn!("Template root {} does not exist", self.root.display());
            return Ok(templates);
        }

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let dir = entry.path();
            match Self::load_dir(&dir).await {
                Ok(template) => {
                    if dir.file_name().and_then(|n| n.to_str()) != Some(template.name()) {
                        warn!(
                            "Skipping template in {}: manifest name '{}' does not match directory",
                            dir.display(),
                            template.name()
                        );
                        continue;
                    }
                    templates.push(template);
                }
                Err(e) => warn!("Skipping template in {}: {}", dir.display(), e),
            }
        }

        templates.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(templates)
    }

    /// Upsert every valid template into the catalog. Returns how many were registered.
    pub async fn sync(&self, db: &Database) -> Result<usize> {
        let templates = self.scan().await?;
        let repo = ServiceRepository::new(db);
        for template in &templates {
            repo.upsert(&template.to_db_service()).await?;
        }
        info!("Synced {} service templates from {}", templates.len(), self.root.display());
        Ok(templates.len())
    }
}
