//! Proxy config lifecycle
//!
//! Per container: `create_dir` makes the config directory and reports the
//! bind mounts, `update` (re)writes every document for a fresh credential,
//! `close` writes an invalidated credential and waits for Envoy to reload,
//! and `remove_dir` deletes the directory again.
//!
//! Callers must not run two rotations for the same container at once;
//! different containers are independent.

use super::clock::{Clock, SystemClock};
use super::policy::ProxyPolicy;
use super::synth;
use super::writer::{write_atomic, write_file};
use crate::container::{
    BindMount, ContainerConfig, Credential, EnvironmentVariable, ProxyPortMapping,
};
use crate::error::{Result, SidecarError};
use crate::network::PortAllocator;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Mounts and environment the container runtime has to apply
pub type ContainerAdditions = (Vec<BindMount>, Vec<EnvironmentVariable>);

/// Proxy configuration lifecycle of a container
pub trait ProxyConfigHandler: Send + Sync {
    /// Assign proxy ports for the container's declared ports
    fn proxy_ports(&self, container: &ContainerConfig) -> (Vec<ProxyPortMapping>, Vec<u16>);

    /// Create the config directory and describe the mounts it needs
    fn create_dir(&self, container: &ContainerConfig) -> Result<ContainerAdditions>;

    /// Delete the config directory
    fn remove_dir(&self, container: &ContainerConfig) -> Result<()>;

    /// Regenerate every config file for a new credential
    fn update(&self, credential: &Credential, container: &ContainerConfig) -> Result<()>;

    /// Write an invalidated credential and wait for the proxy to reload
    fn close(&self, invalid_credential: &Credential, container: &ContainerConfig) -> Result<()>;
}

/// Handler used when the container proxy feature is off node-wide
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProxyConfigHandler;

impl NoopProxyConfigHandler {
    pub fn new() -> Self {
        Self
    }
}

impl ProxyConfigHandler for NoopProxyConfigHandler {
    fn proxy_ports(&self, _container: &ContainerConfig) -> (Vec<ProxyPortMapping>, Vec<u16>) {
        (Vec::new(), Vec::new())
    }

    fn create_dir(&self, _container: &ContainerConfig) -> Result<ContainerAdditions> {
        Ok((Vec::new(), Vec::new()))
    }

    fn remove_dir(&self, _container: &ContainerConfig) -> Result<()> {
        Ok(())
    }

    fn update(&self, _credential: &Credential, _container: &ContainerConfig) -> Result<()> {
        Ok(())
    }

    fn close(&self, _invalid_credential: &Credential, _container: &ContainerConfig) -> Result<()> {
        Ok(())
    }
}

/// Writes Envoy bootstrap and SDS files under `<config_root>/<guid>`
pub struct EnvoyConfigHandler {
    policy: ProxyPolicy,
    allocator: PortAllocator,
    clock: Arc<dyn Clock>,
}

impl EnvoyConfigHandler {
    /// Create a handler with an explicit time source
    pub fn new(policy: ProxyPolicy, clock: Arc<dyn Clock>) -> Result<Self> {
        policy.validate()?;

        Ok(Self {
            allocator: PortAllocator::new(policy.layout.port_range),
            policy,
            clock,
        })
    }

    /// Create a handler that waits on the wall clock
    pub fn with_system_clock(policy: ProxyPolicy) -> Result<Self> {
        Self::new(policy, Arc::new(SystemClock))
    }

    pub fn policy(&self) -> &ProxyPolicy {
        &self.policy
    }

    /// Host directory holding the container's config files
    pub fn config_dir(&self, container: &ContainerConfig) -> Result<PathBuf> {
        let guid = container.guid.as_str();
        if guid.is_empty() || guid == "." || guid == ".." || guid.contains(['/', '\\']) {
            return Err(SidecarError::InvalidConfig(format!(
                "container guid {:?} cannot name a directory",
                guid
            )));
        }
        Ok(self.policy.config_root.join(guid))
    }

    fn write_config(&self, credential: &Credential, container: &ContainerConfig) -> Result<()> {
        let layout = &self.policy.layout;
        let dir = self.config_dir(container)?;

        let admin_port = self.allocator.pick_free_port(&container.ports, &[])?;
        tracing::debug!("Picked admin port {} for container {}", admin_port, container.guid);

        let bootstrap = synth::build_bootstrap(
            container,
            admin_port,
            self.policy.require_client_certs,
            &self.policy.ads_servers,
            layout,
        )?;
        let identity = synth::build_identity_secret(credential, layout);
        let validation = synth::build_validation_secret(
            &self.policy.trusted_ca_certs,
            &self.policy.verify_subject_alt_names,
            layout,
        )?;

        write_file(&bootstrap, &dir.join(&layout.bootstrap_file))?;
        write_atomic(&identity, &dir.join(&layout.cert_and_key_file))?;
        write_atomic(&validation, &dir.join(&layout.validation_context_file))?;

        Ok(())
    }
}

impl ProxyConfigHandler for EnvoyConfigHandler {
    fn proxy_ports(&self, container: &ContainerConfig) -> (Vec<ProxyPortMapping>, Vec<u16>) {
        self.allocator.assign_proxy_ports(container)
    }

    fn create_dir(&self, container: &ContainerConfig) -> Result<ContainerAdditions> {
        if !container.enable_container_proxy {
            return Ok((Vec::new(), Vec::new()));
        }

        let dir = self.config_dir(container)?;
        tracing::info!("Creating proxy config directory {}", dir.display());
        std::fs::create_dir_all(&dir)?;

        let layout = &self.policy.layout;
        let mounts = vec![
            BindMount::host(self.policy.proxy_path.clone(), &layout.container_proxy_dir),
            BindMount::host(dir, &layout.container_config_dir),
        ];

        Ok((mounts, Vec::new()))
    }

    fn remove_dir(&self, container: &ContainerConfig) -> Result<()> {
        if !container.enable_container_proxy {
            return Ok(());
        }

        let dir = self.config_dir(container)?;
        tracing::info!("Removing proxy config directory {}", dir.display());
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn update(&self, credential: &Credential, container: &ContainerConfig) -> Result<()> {
        if !container.enable_container_proxy {
            return Ok(());
        }

        tracing::info!("Rotating proxy credentials for container {}", container.guid);
        self.write_config(credential, container)
    }

    fn close(&self, invalid_credential: &Credential, container: &ContainerConfig) -> Result<()> {
        if !container.enable_container_proxy {
            return Ok(());
        }

        self.write_config(invalid_credential, container)?;

        let wait = self.policy.reload_duration();
        tracing::info!(
            "Waiting {:?} for proxy of container {} to drop its credentials",
            wait,
            container.guid
        );
        let started = self.clock.now();
        self.clock.sleep(wait);
        tracing::debug!(
            "Reload wait for container {} ended after {:?}",
            container.guid,
            self.clock.now().saturating_duration_since(started)
        );
        Ok(())
    }
}
