//! Envoy configuration schema
//!
//! Serde types for the two kinds of documents written per container: the
//! v2 bootstrap file and the SDS discovery responses carrying secrets.

pub mod bootstrap;
pub mod secret;

pub use bootstrap::{
    Address, Admin, ApiConfigSource, Cluster, DynamicResources, Filter, FilterChain, Listener,
    ProxyConfig, SdsSecretConfig, TlsContext,
};
pub use secret::{
    CertificateValidationContext, DataSource, SdsResource, Secret, SecretKind, TlsCertificate,
    SECRET_TYPE_URL, SECRET_VERSION_INFO,
};
