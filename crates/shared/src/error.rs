use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::DocumentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedDescriptor,
    NoControllerAvailable,
    ControllerCreation,
    ControllerInitialization,
    WindowCreation,
    Save,
    DocumentDisposed,
    IdentityConflict,
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("no controller factory supports {descriptor}")]
    UnsupportedDescriptor { descriptor: String },
    #[error("no controller available for {descriptor}")]
    NoControllerAvailable { descriptor: String },
    #[error("factory '{factory}' failed to create a controller for {descriptor}")]
    ControllerCreation {
        factory: String,
        descriptor: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("controller initialization failed for {identity}")]
    ControllerInitialization {
        identity: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("shell could not create a window for {identity}")]
    WindowCreation {
        identity: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to save {identity}")]
    Save {
        identity: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("document {0} has been closed")]
    DocumentDisposed(DocumentId),
    #[error("another document is already open as {identity}")]
    IdentityConflict { identity: String },
}

impl DocumentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocumentError::UnsupportedDescriptor { .. } => ErrorKind::UnsupportedDescriptor,
            DocumentError::NoControllerAvailable { .. } => ErrorKind::NoControllerAvailable,
            DocumentError::ControllerCreation { .. } => ErrorKind::ControllerCreation,
            DocumentError::ControllerInitialization { .. } => ErrorKind::ControllerInitialization,
            DocumentError::WindowCreation { .. } => ErrorKind::WindowCreation,
            DocumentError::Save { .. } => ErrorKind::Save,
            DocumentError::DocumentDisposed(_) => ErrorKind::DocumentDisposed,
            DocumentError::IdentityConflict { .. } => ErrorKind::IdentityConflict,
        }
    }
}

pub type DocumentResult<T> = std::result::Result<T, DocumentError>;

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
