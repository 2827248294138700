//! Envoy v2 bootstrap document types
//!
//! Field names follow the Envoy v2 YAML representation so the structs
//! serialize straight into a file Envoy can load at startup.

use serde::{Deserialize, Serialize};

/// Top-level bootstrap configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Admin endpoint
    pub admin: Admin,
    /// Node identity reported to the management server
    pub node: Node,
    /// Clusters and listeners known at startup
    pub static_resources: StaticResources,
    /// Discovery wiring, only present when ADS servers are configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_resources: Option<DynamicResources>,
}

/// Admin endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admin {
    pub access_log_path: String,
    pub address: Address,
}

/// Node identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub cluster: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticResources {
    pub clusters: Vec<Cluster>,
    pub listeners: Vec<Listener>,
}

/// Network address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub socket_address: SocketAddress,
}

impl Address {
    pub fn new(address: &str, port_value: u16) -> Self {
        Self {
            socket_address: SocketAddress {
                address: address.to_string(),
                port_value: u32::from(port_value),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketAddress {
    pub address: String,
    pub port_value: u32,
}

/// Cluster discovery type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterType {
    Static,
}

/// Load balancing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LbPolicy {
    RoundRobin,
}

/// Upstream cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    /// Duration string, e.g. `0.25s`
    pub connect_timeout: String,
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,
    pub lb_policy: LbPolicy,
    pub hosts: Vec<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breakers: Option<CircuitBreakers>,
    /// Presence alone enables HTTP/2 towards the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http2_protocol_options: Option<Http2ProtocolOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakers {
    pub thresholds: Vec<Threshold>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    pub max_connections: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Http2ProtocolOptions {}

/// Listener bound by the proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    pub name: String,
    pub address: Address,
    pub filter_chains: Vec<FilterChain>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterChain {
    pub filters: Vec<Filter>,
    pub tls_context: TlsContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    pub config: TcpProxyConfig,
}

/// `envoy.tcp_proxy` filter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpProxyConfig {
    pub stat_prefix: String,
    pub cluster: String,
}

/// Downstream TLS settings of a filter chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsContext {
    pub require_client_certificate: bool,
    pub common_tls_context: CommonTlsContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonTlsContext {
    pub tls_certificate_sds_secret_configs: Vec<SdsSecretConfig>,
    pub tls_params: TlsParams,
    /// Client certificate validation; absent unless mutual TLS is required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_context_sds_secret_config: Option<SdsSecretConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsParams {
    pub cipher_suites: Vec<String>,
}

/// Reference to a secret served from a file on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdsSecretConfig {
    pub name: String,
    pub sds_config: PathConfigSource,
}

impl SdsSecretConfig {
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            sds_config: PathConfigSource {
                path: path.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathConfigSource {
    pub path: String,
}

/// Listener and cluster discovery through one aggregated channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicResources {
    pub lds_config: AdsConfigSource,
    pub cds_config: AdsConfigSource,
    pub ads_config: ApiConfigSource,
}

/// Config source pointing at the aggregated discovery service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdsConfigSource {
    pub ads: AggregatedConfigSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedConfigSource {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiType {
    Grpc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfigSource {
    pub api_type: ApiType,
    pub grpc_services: Vec<GrpcService>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcService {
    pub envoy_grpc: EnvoyGrpc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvoyGrpc {
    pub cluster_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_yaml::to_string(&ClusterType::Static).unwrap().trim(), "STATIC");
        assert_eq!(serde_yaml::to_string(&LbPolicy::RoundRobin).unwrap().trim(), "ROUND_ROBIN");
        assert_eq!(serde_yaml::to_string(&ApiType::Grpc).unwrap().trim(), "GRPC");
    }

    #[test]
    fn test_cluster_omits_absent_options() {
        let cluster = Cluster {
            name: "0-service-cluster".to_string(),
            connect_timeout: "0.25s".to_string(),
            cluster_type: ClusterType::Static,
            lb_policy: LbPolicy::RoundRobin,
            hosts: vec![Address::new("10.0.0.1", 8080)],
            circuit_breakers: None,
            http2_protocol_options: None,
        };

        let yaml = serde_yaml::to_string(&cluster).unwrap();
        assert!(yaml.contains("type: STATIC"));
        assert!(yaml.contains("port_value: 8080"));
        assert!(!yaml.contains("circuit_breakers"));
        assert!(!yaml.contains("http2_protocol_options"));
    }
}
