//! Proxy port allocation
//!
//! Proxy listeners live inside the container's network namespace next to
//! the application, so every port handed out here must avoid the ports
//! the application itself declared.

use crate::container::{ContainerConfig, PortMapping, ProxyPortMapping};
use crate::error::{Result, SidecarError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Range;

/// First port of the reserved proxy range
pub const START_PROXY_PORT: u16 = 61001;
/// End of the reserved proxy range (exclusive)
pub const END_PROXY_PORT: u16 = 65534;

/// Half-open port range `[start, end)` reserved for proxy listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyPortRange {
    pub start: u16,
    pub end: u16,
}

impl Default for ProxyPortRange {
    fn default() -> Self {
        Self {
            start: START_PROXY_PORT,
            end: END_PROXY_PORT,
        }
    }
}

impl ProxyPortRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Candidate ports in ascending order
    pub fn ports(&self) -> Range<u16> {
        self.start..self.end
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ports().contains(&port)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Picks proxy ports from the reserved range. Holds no state beyond the
/// range itself; every call works only from its inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortAllocator {
    range: ProxyPortRange,
}

impl PortAllocator {
    /// Create an allocator over a port range
    pub fn new(range: ProxyPortRange) -> Self {
        Self { range }
    }

    pub fn range(&self) -> ProxyPortRange {
        self.range
    }

    /// Assign one proxy port per declared application port.
    ///
    /// Returns the mappings in declaration order together with the list
    /// of ports that were reserved. A disabled proxy yields an empty
    /// result. Allocation stops once as many ports were handed out as
    /// there are distinct application ports, so a short result means the
    /// range could not satisfy the container.
    pub fn assign_proxy_ports(
        &self,
        container: &ContainerConfig,
    ) -> (Vec<ProxyPortMapping>, Vec<u16>) {
        if !container.enable_container_proxy {
            return (Vec::new(), Vec::new());
        }

        let existing: HashSet<u16> = container.ports.iter().map(|p| p.container_port).collect();
        let mut mappings = Vec::with_capacity(existing.len());
        let mut reserved = Vec::with_capacity(existing.len());

        for port in self.range.ports() {
            if mappings.len() == existing.len() {
                break;
            }
            if existing.contains(&port) {
                continue;
            }

            reserved.push(port);
            let app_port = container.ports[mappings.len()].container_port;
            mappings.push(ProxyPortMapping::new(app_port, port));
        }

        if mappings.len() < existing.len() {
            tracing::warn!(
                "Only {} of {} proxy ports could be assigned for container {}",
                mappings.len(),
                existing.len(),
                container.guid
            );
        }

        (mappings, reserved)
    }

    /// Return the lowest port in the range that is not already used as
    /// an application port, an assigned TLS proxy port or one of the
    /// extra reserved ports.
    pub fn pick_free_port(&self, allocated: &[PortMapping], extra_reserved: &[u16]) -> Result<u16> {
        let mut taken: HashSet<u16> = extra_reserved.iter().copied().collect();
        for mapping in allocated {
            taken.insert(mapping.container_port);
            taken.insert(mapping.container_tls_proxy_port);
        }

        self.range
            .ports()
            .find(|port| !taken.contains(port))
            .ok_or(SidecarError::PortsExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(ports: &[u16]) -> ContainerConfig {
        ports
            .iter()
            .fold(ContainerConfig::new("guid", "10.0.0.1").proxy(true), |c, p| c.port(*p))
    }

    #[test]
    fn test_each_port_gets_a_proxy_port() {
        let allocator = PortAllocator::default();
        let (mappings, reserved) = allocator.assign_proxy_ports(&container(&[8080, 9090]));

        assert_eq!(
            mappings,
            vec![
                ProxyPortMapping::new(8080, 61001),
                ProxyPortMapping::new(9090, 61002),
            ]
        );
        assert_eq!(reserved, vec![61001, 61002]);
    }

    #[test]
    fn test_skips_declared_ports_inside_range() {
        let allocator = PortAllocator::default();
        let (mappings, reserved) = allocator.assign_proxy_ports(&container(&[61001, 9090]));

        assert_eq!(
            mappings,
            vec![
                ProxyPortMapping::new(61001, 61002),
                ProxyPortMapping::new(9090, 61003),
            ]
        );
        assert_eq!(reserved, vec![61002, 61003]);
    }

    #[test]
    fn test_disabled_proxy_assigns_nothing() {
        let allocator = PortAllocator::default();
        let disabled = container(&[8080, 9090]).proxy(false);
        let (mappings, reserved) = allocator.assign_proxy_ports(&disabled);

        assert!(mappings.is_empty());
        assert!(reserved.is_empty());
    }

    #[test]
    fn test_assigned_ports_are_distinct_and_in_range() {
        let allocator = PortAllocator::default();
        let declared = [80, 443, 61001, 61003, 8080, 61002];
        let (mappings, _) = allocator.assign_proxy_ports(&container(&declared));

        assert_eq!(mappings.len(), declared.len());
        let unique: HashSet<u16> = mappings.iter().map(|m| m.proxy_port).collect();
        assert_eq!(unique.len(), declared.len());
        for m in &mappings {
            assert!((61001..=65533).contains(&m.proxy_port));
            assert!(!declared.contains(&m.proxy_port));
        }
    }

    #[test]
    fn test_short_range_returns_partial_result() {
        let allocator = PortAllocator::new(ProxyPortRange::new(61001, 61003));
        let (mappings, reserved) = allocator.assign_proxy_ports(&container(&[1, 2, 3]));

        assert_eq!(mappings.len(), 2);
        assert_eq!(reserved, vec![61001, 61002]);
    }

    #[test]
    fn test_pick_free_port_skips_used() {
        let allocator = PortAllocator::default();
        let allocated = vec![PortMapping {
            container_port: 8080,
            host_port: 0,
            container_tls_proxy_port: 61001,
        }];

        assert_eq!(allocator.pick_free_port(&allocated, &[]).unwrap(), 61002);
        assert_eq!(allocator.pick_free_port(&allocated, &[61002]).unwrap(), 61003);
    }

    #[test]
    fn test_pick_free_port_exhausted() {
        let allocator = PortAllocator::default();
        let allocated: Vec<PortMapping> = (START_PROXY_PORT..END_PROXY_PORT)
            .step_by(2)
            .map(|port| PortMapping {
                container_port: port,
                host_port: 0,
                container_tls_proxy_port: port + 1,
            })
            .collect();

        let result = allocator.pick_free_port(&allocated, &[]);
        assert!(matches!(result, Err(SidecarError::PortsExhausted)));
    }

    #[test]
    fn test_range_bounds() {
        let range = ProxyPortRange::default();
        assert!(range.contains(61001));
        assert!(range.contains(65533));
        assert!(!range.contains(65534));
        assert!(ProxyPortRange::new(10, 10).is_empty());
    }
}
