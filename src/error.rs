use serde::Serialize;
use thiserror::Error;

use crate::container::RuntimeError;
use crate::database::DatabaseError;
use crate::proxy::ProxyError;
use crate::template::TemplateError;

pub type Result<T> = std::result::Result<T, TenantBoxError>;

/// Coarse classification used by callers (and the HTTP layer) to decide
/// how to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    AlreadyExists,
    PoolExhausted,
    RuntimeFailure,
    ProxyFailure,
    PersistenceFailure,
    Config,
    Internal,
}

#[derive(Error, Debug)]
pub enum TenantBoxError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("{resource} already exists: {id}")]
    AlreadyExists { resource: &'static str, id: String },

    #[error("Port pool exhausted")]
    PoolExhausted,

    #[error("Runtime failure: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Proxy failure: {0}")]
    Proxy(#[from] ProxyError),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// A multi-step operation failed at `step` and its completed steps were
    /// rolled back. `source` is the failure that triggered the rollback;
    /// `cleanup_errors` are the rollback steps that failed themselves.
    #[error("{step} failed: {source}{}", format_cleanup(.cleanup_errors))]
    Compensated {
        step: &'static str,
        source: Box<TenantBoxError>,
        cleanup_errors: Vec<TenantBoxError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_cleanup(errors: &[TenantBoxError]) -> String {
    if errors.is_empty() {
        String::new()
    } else {
        let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        format!(" (cleanup errors: {})", joined.join("; "))
    }
}

impl TenantBoxError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn instance_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: "instance",
            id: id.into(),
        }
    }

    pub fn template_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            resource: "template",
            id: name.into(),
        }
    }

    pub fn instance_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource: "instance",
            id: id.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::PoolExhausted => ErrorKind::PoolExhausted,
            Self::Runtime(RuntimeError::NotFound(_)) => ErrorKind::NotFound,
            Self::Runtime(RuntimeError::WorkdirExists(_)) => ErrorKind::AlreadyExists,
            Self::Runtime(_) => ErrorKind::RuntimeFailure,
            Self::Proxy(_) => ErrorKind::ProxyFailure,
            Self::Persistence(DatabaseError::NotFound) => ErrorKind::NotFound,
            Self::Persistence(_) => ErrorKind::PersistenceFailure,
            Self::Template(TemplateError::NotFound(_)) => ErrorKind::NotFound,
            Self::Template(TemplateError::InvalidResource(_)) => ErrorKind::InvalidInput,
            Self::Template(_) => ErrorKind::Internal,
            Self::Compensated { source, .. } => source.kind(),
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) | Self::Json(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The error that started the failure chain, unwrapping compensation layers.
    pub fn root_cause(&self) -> &TenantBoxError {
        match self {
            Self::Compensated { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Secondary errors raised while rolling back, empty for plain errors.
    pub fn cleanup_errors(&self) -> &[TenantBoxError] {
        match self {
            Self::Compensated { cleanup_errors, .. } => cleanup_errors,
            _ => &[],
        }
    }
}
