//! Turns raw registry instance records into the canonical endpoint list.

use crate::registry::Instance;
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};

/// Map raw instance records to a deduplicated endpoint list in a fixed total
/// order.
///
/// Records whose IP does not parse or whose port is zero cannot be dialed
/// and are skipped. Two inputs containing the same `(ip, port)` pairs yield
/// identical output regardless of arrival order or duplicate entries, which
/// is what lets the propagation loop compare consecutive lists cheaply.
///
/// An empty input yields an empty list; zero live backends is a valid
/// resolution state, not an error.
pub fn sorted_endpoints(instances: &[Instance]) -> Vec<SocketAddr> {
    instances
        .iter()
        .filter_map(|instance| {
            if instance.port == 0 {
                tracing::debug!(ip = %instance.ip, "skipping instance without a usable port");
                return None;
            }
            match instance.ip.parse::<IpAddr>() {
                Ok(ip) => Some(SocketAddr::new(ip, instance.port)),
                Err(_) => {
                    tracing::debug!(ip = %instance.ip, "skipping instance without a usable ip");
                    None
                }
            }
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
