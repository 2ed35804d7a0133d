use thiserror::Error;

/// Errors produced while building, committing, or querying a scene.
///
/// Lookup misses (an absent geometry id, for example) are not errors and are reported as `None`
/// by the relevant accessors instead.
#[derive(Error, Debug)]
pub enum RaycastError {
    /// A precondition of the call was violated: no sensor model or map was set, a geometry was
    /// committed with pending edits, an instance was committed before its child scene, etc.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The ray tracing backend refused to build or launch.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A mesh file could not be turned into a scene.
    #[error("Failed to load '{path}': {reason}")]
    Load { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RaycastError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, RaycastError::Configuration(_))
    }

    pub fn is_backend(&self) -> bool {
        matches!(self, RaycastError::Backend(_))
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        RaycastError::Configuration(msg.into())
    }

    pub(crate) fn backend(msg: impl Into<String>) -> Self {
        RaycastError::Backend(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RaycastError>;
