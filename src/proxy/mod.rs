//! Envoy sidecar configuration
//!
//! This module turns a container description and a TLS credential into
//! the bootstrap and secret files an Envoy sidecar reads, and manages the
//! per-container directory those files live in.

pub mod clock;
pub mod handler;
pub mod policy;
pub mod synth;
pub mod writer;

pub use clock::{Clock, FakeClock, SystemClock};
pub use handler::{
    ContainerAdditions, EnvoyConfigHandler, NoopProxyConfigHandler, ProxyConfigHandler,
};
pub use policy::{ProxyLayout, ProxyPolicy};
