use thiserror::Error;

/// Typed failures surfaced by registry and graph-mutation operations.
///
/// Each variant maps 1:1 onto a transport-level status (409, 404, 422, 500).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OntologyError {
    #[error("{kind} '{name}' already exists")]
    Conflict { kind: &'static str, name: String },

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl OntologyError {
    pub fn conflict(kind: &'static str, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            name: name.into(),
        }
    }

    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<serde_json::Error> for OntologyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(format!("serialization: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, OntologyError>;
