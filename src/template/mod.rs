//! Service templates: on-disk descriptors, env rendering and catalog sync.

pub mod models;
pub mod registry;
pub mod renderer;

pub use models::{ServiceTemplate, TemplateManifest};
pub use registry::TemplateRegistry;
pub use renderer::{render_env, RenderContext, RenderedEnv};

/// Template system errors
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template {template} is missing {file}")]
    MissingFile { template: String, file: &'static str },

    #[error("Invalid template manifest: {0}")]
    Manifest(String),

    #[error("Invalid resource limit: {0}")]
    InvalidResource(String),

    #[error("Template file error: {0}")]
    FileError(#[from] std::io::Error),
}
