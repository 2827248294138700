//! Container descriptors as seen by the proxy configuration layer

use crate::error::{Result, SidecarError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Container description consumed by the proxy handlers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Unique container guid
    pub guid: String,
    /// Address of the container on the internal network
    pub internal_ip: String,
    /// Declared port mappings, in declaration order
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    /// Whether the Envoy sidecar is enabled for this container
    #[serde(default)]
    pub enable_container_proxy: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            guid: Uuid::new_v4().to_string(),
            internal_ip: String::new(),
            ports: Vec::new(),
            enable_container_proxy: false,
        }
    }
}

impl ContainerConfig {
    /// Create a new container descriptor
    pub fn new(guid: &str, internal_ip: &str) -> Self {
        Self {
            guid: guid.to_string(),
            internal_ip: internal_ip.to_string(),
            ..Self::default()
        }
    }

    /// Load a descriptor file: YAML for `.yaml`/`.yml`, JSON otherwise
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
                SidecarError::Yaml(format!("Failed to parse container descriptor: {}", e))
            }),
            _ => Ok(serde_json::from_str(&content)?),
        }
    }

    /// Enable or disable the container proxy
    pub fn proxy(mut self, enabled: bool) -> Self {
        self.enable_container_proxy = enabled;
        self
    }

    /// Declare an application port
    pub fn port(mut self, container_port: u16) -> Self {
        self.ports.push(PortMapping::new(container_port));
        self
    }

    /// Declare an application port with its TLS proxy port already assigned
    pub fn tls_port(mut self, container_port: u16, container_tls_proxy_port: u16) -> Self {
        self.ports.push(PortMapping {
            container_tls_proxy_port,
            ..PortMapping::new(container_port)
        });
        self
    }

    /// Copy allocator results onto the declared port mappings.
    ///
    /// Mappings are matched by position, the same order the allocator
    /// hands them out in. Fails if an assignment would break the
    /// uniqueness invariant.
    pub fn apply_proxy_ports(&mut self, mappings: &[ProxyPortMapping]) -> Result<()> {
        let app_ports: HashSet<u16> = self.ports.iter().map(|p| p.container_port).collect();
        let mut seen = HashSet::new();

        for mapping in mappings {
            if app_ports.contains(&mapping.proxy_port) || !seen.insert(mapping.proxy_port) {
                return Err(SidecarError::InvalidConfig(format!(
                    "proxy port {} collides with another port of container {}",
                    mapping.proxy_port, self.guid
                )));
            }
        }

        for (port, mapping) in self.ports.iter_mut().zip(mappings) {
            if port.container_port != mapping.app_port {
                return Err(SidecarError::InvalidConfig(format!(
                    "proxy mapping for port {} does not match declared port {}",
                    mapping.app_port, port.container_port
                )));
            }
            port.container_tls_proxy_port = mapping.proxy_port;
        }

        Ok(())
    }
}

/// Port mapping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Application port declared by the container
    pub container_port: u16,
    /// Host-side ingress port (0 when unassigned)
    #[serde(default)]
    pub host_port: u16,
    /// In-container TLS-terminating proxy port (0 when unassigned)
    #[serde(default)]
    pub container_tls_proxy_port: u16,
}

impl PortMapping {
    /// Create a mapping for an application port with nothing assigned yet
    pub fn new(container_port: u16) -> Self {
        Self {
            container_port,
            host_port: 0,
            container_tls_proxy_port: 0,
        }
    }
}

/// Application port paired with the proxy port assigned to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyPortMapping {
    pub app_port: u16,
    pub proxy_port: u16,
}

impl ProxyPortMapping {
    pub fn new(app_port: u16, proxy_port: u16) -> Self {
        Self {
            app_port,
            proxy_port,
        }
    }
}

/// TLS credential pair, PEM-encoded
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub cert: String,
    pub key: String,
}

impl Credential {
    pub fn new(cert: &str, key: &str) -> Self {
        Self {
            cert: cert.to_string(),
            key: key.to_string(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("cert", &format_args!("<{} bytes>", self.cert.len()))
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Where the source of a bind mount lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMountOrigin {
    /// Path on the host
    Host,
}

/// Bind mount the container runtime must apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    pub origin: BindMountOrigin,
    pub src_path: PathBuf,
    pub dst_path: String,
}

impl BindMount {
    /// Bind a host directory into the container
    pub fn host(src_path: PathBuf, dst_path: &str) -> Self {
        Self {
            origin: BindMountOrigin::Host,
            src_path,
            dst_path: dst_path.to_string(),
        }
    }
}

/// Environment variable handed to the container runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_builder() {
        let container = ContainerConfig::new("guid-1", "10.0.0.1")
            .proxy(true)
            .port(8080)
            .tls_port(9090, 61001);

        assert_eq!(container.guid, "guid-1");
        assert!(container.enable_container_proxy);
        assert_eq!(container.ports.len(), 2);
        assert_eq!(container.ports[0].container_tls_proxy_port, 0);
        assert_eq!(container.ports[1].container_tls_proxy_port, 61001);
    }

    #[test]
    fn test_from_file_json_and_yaml() {
        let temp = tempfile::tempdir().unwrap();

        let json = temp.path().join("c.json");
        std::fs::write(
            &json,
            r#"{"guid":"g1","internal_ip":"10.0.0.1","enable_container_proxy":true}"#,
        )
        .unwrap();
        let container = ContainerConfig::from_file(&json).unwrap();
        assert_eq!(container.guid, "g1");
        assert!(container.enable_container_proxy);

        let yaml = temp.path().join("c.yaml");
        std::fs::write(&yaml, "guid: g2\ninternal_ip: 10.0.0.2\n").unwrap();
        let container = ContainerConfig::from_file(&yaml).unwrap();
        assert_eq!(container.guid, "g2");
        assert!(container.ports.is_empty());
    }

    #[test]
    fn test_from_file_bad_json() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("c.json");
        std::fs::write(&path, "{not json").unwrap();

        let result = ContainerConfig::from_file(&path);
        assert!(matches!(result, Err(SidecarError::Json(_))));
    }

    #[test]
    fn test_default_guid_is_unique() {
        let a = ContainerConfig::default();
        let b = ContainerConfig::default();
        assert_ne!(a.guid, b.guid);
        assert!(!a.enable_container_proxy);
    }

    #[test]
    fn test_apply_proxy_ports() {
        let mut container = ContainerConfig::new("guid", "10.0.0.1").port(8080).port(9090);
        container
            .apply_proxy_ports(&[
                ProxyPortMapping::new(8080, 61001),
                ProxyPortMapping::new(9090, 61002),
            ])
            .unwrap();

        assert_eq!(container.ports[0].container_tls_proxy_port, 61001);
        assert_eq!(container.ports[1].container_tls_proxy_port, 61002);
    }

    #[test]
    fn test_apply_proxy_ports_rejects_collision() {
        let mut container = ContainerConfig::new("guid", "10.0.0.1").port(61001).port(9090);
        let result = container.apply_proxy_ports(&[
            ProxyPortMapping::new(61001, 61001),
            ProxyPortMapping::new(9090, 61002),
        ]);
        assert!(result.is_err());
        assert_eq!(container.ports[0].container_tls_proxy_port, 0);
    }

    #[test]
    fn test_credential_debug_hides_key() {
        let cred = Credential::new("cert", "super-secret");
        let out = format!("{:?}", cred);
        assert!(!out.contains("super-secret"));
    }

    #[test]
    fn test_container_from_json() {
        let json = r#"{
            "guid": "abc",
            "internal_ip": "10.0.0.1",
            "ports": [{"container_port": 8080}],
            "enable_container_proxy": true
        }"#;
        let container: ContainerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(container.ports, vec![PortMapping::new(8080)]);
        assert!(container.enable_container_proxy);
    }
}
