//! Error types for shardmigrate

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Coordination store Errors ===
    #[error("Node not found: {0}")]
    NotFound(String),

    #[error("Node already exists: {0}")]
    NodeExists(String),

    #[error("Invalid store path: {0}")]
    InvalidPath(String),

    #[error("Coordination store is closed")]
    StoreClosed,

    #[error("Store error: {0}")]
    Store(String),

    // === Member Errors ===
    #[error("Unknown member: {0}")]
    UnknownMember(u32),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Does this error mean the node is absent?
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Does this error mean a create lost the race to another writer?
    pub fn is_node_exists(&self) -> bool {
        matches!(self, Error::NodeExists(_))
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::NotFound(_) | Error::UnknownMember(_) => StatusCode::NOT_FOUND,
            Error::InvalidConfig(_) | Error::InvalidPath(_) => StatusCode::BAD_REQUEST,
            Error::StoreClosed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        use axum::http::StatusCode;
        assert_eq!(
            Error::UnknownMember(7).to_http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::StoreClosed.to_http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::Internal("boom".into()).to_http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_error_predicates() {
        assert!(Error::NotFound("svc/1/stat".into()).is_not_found());
        assert!(!Error::NotFound("svc/1/stat".into()).is_node_exists());
        assert!(Error::NodeExists("svc/1/stat".into()).is_node_exists());
    }
}
