//! Error types for sidecar

use thiserror::Error;

/// Result type for sidecar operations
pub type Result<T> = std::result::Result<T, SidecarError>;

/// Sidecar error types
#[derive(Error, Debug)]
pub enum SidecarError {
    /// The reserved proxy port range has no free port left
    #[error("no ports available")]
    PortsExhausted,

    /// A trusted CA entry is not valid PEM
    #[error("cannot parse invalid certificate: {0}")]
    InvalidCertificate(String),

    /// An ADS server entry is not a valid `host:port`
    #[error("ads server address is invalid: {0}")]
    MalformedDiscoveryAddress(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
