//! Network management module
//!
//! This module provides port allocation for container proxies.

pub mod ports;

pub use ports::{PortAllocator, ProxyPortRange, END_PROXY_PORT, START_PROXY_PORT};
