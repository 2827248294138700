//! Container descriptors
//!
//! The proxy layer never creates containers itself; it only consumes
//! what the container runtime declares and hands back mount and
//! environment descriptions for the runtime to apply.

pub mod config;

pub use config::{
    BindMount, BindMountOrigin, ContainerConfig, Credential, EnvironmentVariable, PortMapping,
    ProxyPortMapping,
};
