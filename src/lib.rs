//! Sidecar - Envoy configuration for container proxies
//!
//! Sidecar synthesizes the per-container configuration of an Envoy proxy
//! running next to an application:
//!
//! - Collision-free proxy port allocation
//! - Bootstrap generation with optional mutual TLS and ADS wiring
//! - Secret discovery files replaced atomically on every rotation
//! - Config directory lifecycle with a reload wait on teardown

pub mod container;
pub mod envoy;
pub mod error;
pub mod network;
pub mod proxy;

pub use error::{Result, SidecarError};
