//! Envoy configuration synthesis
//!
//! Pure transforms from a container descriptor, credentials and policy
//! into the documents written to the container's config directory.

use super::policy::ProxyLayout;
use crate::container::{ContainerConfig, Credential};
use crate::envoy::bootstrap::{
    Address, AdsConfigSource, Admin, ApiConfigSource, ApiType, CircuitBreakers, Cluster,
    ClusterType, CommonTlsContext, DynamicResources, EnvoyGrpc, Filter, FilterChain, GrpcService,
    Http2ProtocolOptions, LbPolicy, Listener, Node, ProxyConfig, SdsSecretConfig, StaticResources,
    TcpProxyConfig, Threshold, TlsContext, TlsParams,
};
use crate::envoy::secret::{
    CertificateValidationContext, DataSource, SdsResource, Secret, SecretKind, TlsCertificate,
};
use crate::error::{Result, SidecarError};
use pem::{EncodeConfig, LineEnding};

/// Filter forwarding raw TCP to a cluster
pub const TCP_PROXY_FILTER: &str = "envoy.tcp_proxy";

const ADMIN_ADDRESS: &str = "127.0.0.1";
const LISTENER_ADDRESS: &str = "0.0.0.0";

fn service_cluster_name(index: usize) -> String {
    format!("{}-service-cluster", index)
}

/// Build the bootstrap document for a container.
///
/// Fails if any ADS server entry is not a `host:port` pair.
pub fn build_bootstrap(
    container: &ContainerConfig,
    admin_port: u16,
    require_client_certs: bool,
    ads_servers: &[String],
    layout: &ProxyLayout,
) -> Result<ProxyConfig> {
    let mut clusters: Vec<Cluster> = container
        .ports
        .iter()
        .enumerate()
        .map(|(index, port)| Cluster {
            name: service_cluster_name(index),
            connect_timeout: layout.connect_timeout.clone(),
            cluster_type: ClusterType::Static,
            lb_policy: LbPolicy::RoundRobin,
            hosts: vec![Address::new(&container.internal_ip, port.container_port)],
            circuit_breakers: Some(CircuitBreakers {
                thresholds: vec![Threshold {
                    max_connections: u32::MAX,
                }],
            }),
            http2_protocol_options: None,
        })
        .collect();

    let mut dynamic_resources = None;
    if !ads_servers.is_empty() {
        let hosts = ads_servers
            .iter()
            .map(|entry| parse_ads_address(entry))
            .collect::<Result<Vec<_>>>()?;

        clusters.push(Cluster {
            name: layout.ads_cluster.clone(),
            connect_timeout: layout.connect_timeout.clone(),
            cluster_type: ClusterType::Static,
            lb_policy: LbPolicy::RoundRobin,
            hosts,
            circuit_breakers: None,
            http2_protocol_options: Some(Http2ProtocolOptions::default()),
        });

        dynamic_resources = Some(DynamicResources {
            lds_config: AdsConfigSource::default(),
            cds_config: AdsConfigSource::default(),
            ads_config: ApiConfigSource {
                api_type: ApiType::Grpc,
                grpc_services: vec![GrpcService {
                    envoy_grpc: EnvoyGrpc {
                        cluster_name: layout.ads_cluster.clone(),
                    },
                }],
            },
        });
    }

    Ok(ProxyConfig {
        admin: Admin {
            access_log_path: layout.admin_access_log.clone(),
            address: Address::new(ADMIN_ADDRESS, admin_port),
        },
        node: Node {
            id: format!("sidecar~{}~{}~x", container.internal_ip, container.guid),
            cluster: layout.node_cluster.clone(),
        },
        static_resources: StaticResources {
            clusters,
            listeners: build_listeners(container, require_client_certs, layout),
        },
        dynamic_resources,
    })
}

/// One TLS-terminating listener per declared port
pub fn build_listeners(
    container: &ContainerConfig,
    require_client_certs: bool,
    layout: &ProxyLayout,
) -> Vec<Listener> {
    container
        .ports
        .iter()
        .enumerate()
        .map(|(index, port)| {
            let validation = require_client_certs.then(|| {
                SdsSecretConfig::new(
                    &layout.validation_context_secret,
                    &layout.container_validation_context_path(),
                )
            });

            Listener {
                name: format!("listener-{}", port.container_port),
                address: Address::new(LISTENER_ADDRESS, port.container_tls_proxy_port),
                filter_chains: vec![FilterChain {
                    filters: vec![Filter {
                        name: TCP_PROXY_FILTER.to_string(),
                        config: TcpProxyConfig {
                            stat_prefix: format!("{}-stats", index),
                            cluster: service_cluster_name(index),
                        },
                    }],
                    tls_context: TlsContext {
                        require_client_certificate: require_client_certs,
                        common_tls_context: CommonTlsContext {
                            tls_certificate_sds_secret_configs: vec![SdsSecretConfig::new(
                                &layout.cert_and_key_secret,
                                &layout.container_cert_and_key_path(),
                            )],
                            tls_params: TlsParams {
                                cipher_suites: layout.cipher_suites.clone(),
                            },
                            validation_context_sds_secret_config: validation,
                        },
                    },
                }],
            }
        })
        .collect()
}

/// Wrap the server certificate and key as the identity secret
pub fn build_identity_secret(credential: &Credential, layout: &ProxyLayout) -> SdsResource {
    SdsResource::single(Secret::new(
        &layout.cert_and_key_secret,
        SecretKind::TlsCertificate(TlsCertificate {
            certificate_chain: DataSource::inline(&credential.cert),
            private_key: DataSource::inline(&credential.key),
        }),
    ))
}

/// Bundle the trusted CAs with the SAN allow-list as the validation secret
pub fn build_validation_secret(
    trusted_cas: &[String],
    subject_alt_names: &[String],
    layout: &ProxyLayout,
) -> Result<SdsResource> {
    let bundle = pem_concatenate(trusted_cas)?;

    Ok(SdsResource::single(Secret::new(
        &layout.validation_context_secret,
        SecretKind::ValidationContext(CertificateValidationContext {
            trusted_ca: DataSource::inline(&bundle),
            verify_subject_alt_name: subject_alt_names.to_vec(),
        }),
    )))
}

/// Re-encode every PEM block of every entry, in order, into one bundle.
/// An entry without a single valid block rejects the whole list.
fn pem_concatenate(certs: &[String]) -> Result<String> {
    let mut bundle = String::new();

    for (index, cert) in certs.iter().enumerate() {
        let blocks = pem::parse_many(cert.as_bytes()).map_err(|e| {
            SidecarError::InvalidCertificate(format!("trusted CA #{}: {}", index, e))
        })?;
        if blocks.is_empty() {
            return Err(SidecarError::InvalidCertificate(format!(
                "trusted CA #{}: no PEM block found",
                index
            )));
        }
        for block in &blocks {
            let config = EncodeConfig::new().set_line_ending(LineEnding::LF);
            bundle.push_str(&pem::encode_config(block, config));
        }
    }

    Ok(bundle)
}

/// Parse `host:port`, accepting bracketed IPv6 hosts
fn parse_ads_address(entry: &str) -> Result<Address> {
    let invalid = || SidecarError::MalformedDiscoveryAddress(entry.to_string());

    let (host, port) = entry.rsplit_once(':').ok_or_else(invalid)?;
    let host = match host.strip_prefix('[') {
        Some(inner) => inner.strip_suffix(']').ok_or_else(invalid)?,
        None if host.contains(':') => return Err(invalid()),
        None => host,
    };
    let port: u16 = port.parse().map_err(|_| invalid())?;

    Ok(Address::new(host, port))
}
