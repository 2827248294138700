//! Secret discovery (SDS) documents
//!
//! Envoy watches these files and reloads the TLS material inside them
//! without restarting.

use serde::{Deserialize, Serialize};

/// Type URL of every secret resource
pub const SECRET_TYPE_URL: &str = "type.googleapis.com/envoy.api.v2.auth.Secret";

/// Version tag written on every rotation. It never changes; Envoy picks
/// up new content through its file watch, not through version bumps.
pub const SECRET_VERSION_INFO: &str = "0";

/// Discovery response envelope wrapping the secrets of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdsResource {
    pub version_info: String,
    pub resources: Vec<Secret>,
}

impl SdsResource {
    /// Wrap a single secret with the fixed version tag
    pub fn single(secret: Secret) -> Self {
        Self {
            version_info: SECRET_VERSION_INFO.to_string(),
            resources: vec![secret],
        }
    }
}

/// Named secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    #[serde(rename = "@type")]
    pub type_url: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: SecretKind,
}

impl Secret {
    pub fn new(name: &str, kind: SecretKind) -> Self {
        Self {
            type_url: SECRET_TYPE_URL.to_string(),
            name: name.to_string(),
            kind,
        }
    }
}

/// Payload of a secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    /// Server identity
    TlsCertificate(TlsCertificate),
    /// Trust store used to validate client certificates
    ValidationContext(CertificateValidationContext),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsCertificate {
    pub certificate_chain: DataSource,
    pub private_key: DataSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateValidationContext {
    pub trusted_ca: DataSource,
    #[serde(default)]
    pub verify_subject_alt_name: Vec<String>,
}

/// Inline data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub inline_string: String,
}

impl DataSource {
    pub fn inline(data: &str) -> Self {
        Self {
            inline_string: data.to_string(),
        }
    }
}
