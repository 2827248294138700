//! Proxy policy
//!
//! Everything the handler needs at construction time: where files go,
//! which CAs and SANs to trust, how long to wait for a reload, and the
//! fixed layout constants of the Envoy integration.

use crate::error::{Result, SidecarError};
use crate::network::ProxyPortRange;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fixed names and paths shared between the host and the proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyLayout {
    /// Ports reserved for proxy listeners
    pub port_range: ProxyPortRange,
    /// Mount target of the proxy binary directory
    pub container_proxy_dir: String,
    /// Mount target of the per-container config directory
    pub container_config_dir: String,
    pub bootstrap_file: String,
    pub cert_and_key_file: String,
    pub validation_context_file: String,
    pub cert_and_key_secret: String,
    pub validation_context_secret: String,
    /// Allowed downstream cipher suites
    pub cipher_suites: Vec<String>,
    pub connect_timeout: String,
    pub admin_access_log: String,
    /// Name of the cluster carrying ADS traffic
    pub ads_cluster: String,
    /// Cluster reported in the node identity
    pub node_cluster: String,
}

impl Default for ProxyLayout {
    fn default() -> Self {
        Self {
            port_range: ProxyPortRange::default(),
            container_proxy_dir: "/etc/cf-assets/envoy".to_string(),
            container_config_dir: "/etc/cf-assets/envoy_config".to_string(),
            bootstrap_file: "envoy.yaml".to_string(),
            cert_and_key_file: "sds-server-cert-and-key.yaml".to_string(),
            validation_context_file: "sds-server-validation-context.yaml".to_string(),
            cert_and_key_secret: "server-cert-and-key".to_string(),
            validation_context_secret: "server-validation-context".to_string(),
            cipher_suites: vec![
                "ECDHE-RSA-AES256-GCM-SHA384".to_string(),
                "ECDHE-RSA-AES128-GCM-SHA256".to_string(),
            ],
            connect_timeout: "0.25s".to_string(),
            admin_access_log: "/dev/null".to_string(),
            ads_cluster: "pilot-ads".to_string(),
            node_cluster: "proxy-cluster".to_string(),
        }
    }
}

impl ProxyLayout {
    /// Path of the identity secret as seen from inside the container
    pub fn container_cert_and_key_path(&self) -> String {
        format!("{}/{}", self.container_config_dir, self.cert_and_key_file)
    }

    /// Path of the validation secret as seen from inside the container
    pub fn container_validation_context_path(&self) -> String {
        format!("{}/{}", self.container_config_dir, self.validation_context_file)
    }
}

/// Construction-time configuration of the proxy handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyPolicy {
    /// Host directory holding the proxy binary
    pub proxy_path: PathBuf,
    /// Host directory under which one config directory per container is made
    pub config_root: PathBuf,
    /// PEM-encoded CAs trusted for client certificates
    pub trusted_ca_certs: Vec<String>,
    /// Subject alt names accepted on client certificates
    pub verify_subject_alt_names: Vec<String>,
    pub require_client_certs: bool,
    /// How long `close` waits for the proxy to drop the old secret
    pub reload_duration_ms: u64,
    /// ADS servers as `host:port`
    pub ads_servers: Vec<String>,
    pub layout: ProxyLayout,
}

impl Default for ProxyPolicy {
    fn default() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("/var/lib"))
            .join("sidecar");

        Self {
            proxy_path: base.join("envoy"),
            config_root: base.join("envoy_config"),
            trusted_ca_certs: Vec::new(),
            verify_subject_alt_names: Vec::new(),
            require_client_certs: false,
            reload_duration_ms: 1000,
            ads_servers: Vec::new(),
            layout: ProxyLayout::default(),
        }
    }
}

impl ProxyPolicy {
    /// Create a policy rooted at the given directories
    pub fn new(proxy_path: &Path, config_root: &Path) -> Self {
        Self {
            proxy_path: proxy_path.to_path_buf(),
            config_root: config_root.to_path_buf(),
            ..Self::default()
        }
    }

    /// Parse a policy file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    /// Parse a policy from YAML
    pub fn parse_str(content: &str) -> Result<Self> {
        let policy: Self = serde_yaml::from_str(content)
            .map_err(|e| SidecarError::Yaml(format!("Failed to parse policy: {}", e)))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        let range = self.layout.port_range;
        if range.is_empty() {
            return Err(SidecarError::InvalidConfig(format!(
                "proxy port range {}..{} is empty",
                range.start, range.end
            )));
        }
        if self.layout.cipher_suites.is_empty() {
            return Err(SidecarError::InvalidConfig(
                "at least one cipher suite is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reload_duration(&self) -> Duration {
        Duration::from_millis(self.reload_duration_ms)
    }

    /// Set trusted CA certificates
    pub fn trusted_ca_certs(mut self, certs: Vec<String>) -> Self {
        self.trusted_ca_certs = certs;
        self
    }

    /// Set accepted subject alt names
    pub fn verify_subject_alt_names(mut self, names: Vec<String>) -> Self {
        self.verify_subject_alt_names = names;
        self
    }

    /// Require clients to present certificates
    pub fn require_client_certs(mut self, require: bool) -> Self {
        self.require_client_certs = require;
        self
    }

    /// Set the reload wait, rounded up to whole milliseconds
    pub fn reload_after(mut self, duration: Duration) -> Self {
        let millis = duration.as_nanos().div_ceil(1_000_000);
        self.reload_duration_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    /// Set ADS servers
    pub fn ads_servers(mut self, servers: Vec<String>) -> Self {
        self.ads_servers = servers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let layout = ProxyLayout::default();
        assert_eq!(layout.port_range, ProxyPortRange::new(61001, 65534));
        assert_eq!(
            layout.container_cert_and_key_path(),
            "/etc/cf-assets/envoy_config/sds-server-cert-and-key.yaml"
        );
        assert_eq!(
            layout.container_validation_context_path(),
            "/etc/cf-assets/envoy_config/sds-server-validation-context.yaml"
        );
    }

    #[test]
    fn test_reload_after_never_shortens_the_wait() {
        let root = Path::new("/tmp");
        for wait in [
            Duration::from_micros(500),
            Duration::from_nanos(1),
            Duration::from_micros(1500),
            Duration::from_secs(2),
        ] {
            let policy = ProxyPolicy::new(root, root).reload_after(wait);
            assert!(policy.reload_duration() >= wait, "{:?} shortened", wait);
        }

        let policy = ProxyPolicy::new(root, root).reload_after(Duration::from_micros(500));
        assert_eq!(policy.reload_duration_ms, 1);

        let policy = ProxyPolicy::new(root, root).reload_after(Duration::ZERO);
        assert_eq!(policy.reload_duration(), Duration::ZERO);

        let policy = ProxyPolicy::new(root, root).reload_after(Duration::MAX);
        assert_eq!(policy.reload_duration_ms, u64::MAX);
    }

    #[test]
    fn test_parse_partial_policy() {
        let policy = ProxyPolicy::parse_str(
            r#"
config_root: /var/vcap/data/proxy
require_client_certs: true
reload_duration_ms: 250
ads_servers:
  - 10.255.217.2:15010
"#,
        )
        .unwrap();

        assert_eq!(policy.config_root, PathBuf::from("/var/vcap/data/proxy"));
        assert!(policy.require_client_certs);
        assert_eq!(policy.reload_duration(), Duration::from_millis(250));
        assert_eq!(policy.ads_servers, vec!["10.255.217.2:15010".to_string()]);
        assert_eq!(policy.layout, ProxyLayout::default());
    }

    #[test]
    fn test_rejects_empty_port_range() {
        let result = ProxyPolicy::parse_str(
            r#"
layout:
  port_range:
    start: 62000
    end: 61000
"#,
        );
        assert!(matches!(result, Err(SidecarError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_yaml() {
        let result = ProxyPolicy::parse_str("reload_duration_ms: [not, a, number]");
        assert!(matches!(result, Err(SidecarError::Yaml(_))));
    }
}
