//! Defines the interface that the resolver requires in order to watch the
//! live instances of a service in an external registry.

use std::collections::HashMap;
use tokio::sync::mpsc;

/// One backend instance as reported by the registry.
///
/// The resolver consumes only `ip` and `port`; everything else is carried
/// opaquely for registry implementations that need it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Instance IP address, as reported by the registry.
    pub ip: String,
    /// Instance port.
    pub port: u16,
    /// Whether the registry considers the instance healthy.
    pub healthy: bool,
    /// Whether the instance is enabled for traffic.
    pub enabled: bool,
    /// Registry-defined instance metadata.
    pub metadata: HashMap<String, String>,
}

impl Instance {
    /// An enabled, healthy instance with no metadata.
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            healthy: true,
            enabled: true,
            metadata: HashMap::new(),
        }
    }
}

/// Interface to a push-based service registry.
///
/// Implementations wrap a concrete registry client and deliver every
/// instance-change notification for the subscribed service as one raw
/// instance list on the channel handed to
/// [`subscribe`](ServiceRegistry::subscribe). Delivering on a channel rather
/// than through a callback keeps the registry client's threading model out
/// of the resolver: the watch consumes notifications at its own pace and in
/// arrival order.
#[async_trait::async_trait]
pub trait ServiceRegistry: Send + Sync + 'static {
    /// Subscribe to instance changes for `service` in `group`.
    ///
    /// Every change notification must push the full raw instance list into
    /// `notifications`. An error here is fatal to the watch: it is reported
    /// and the watch makes no further progress.
    async fn subscribe(
        &self,
        service: &str,
        group: &str,
        notifications: mpsc::Sender<Vec<Instance>>,
    ) -> Result<(), anyhow::Error>;

    /// Drop the subscription created by [`subscribe`](ServiceRegistry::subscribe).
    ///
    /// Called exactly once when the watch is torn down.
    async fn unsubscribe(&self, service: &str, group: &str) -> Result<(), anyhow::Error>;
}
