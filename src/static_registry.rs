//! Implements [`ServiceRegistry`] for a fixed set of instances.

use crate::registry::{Instance, ServiceRegistry};
use tokio::sync::mpsc;

/// A [`ServiceRegistry`] that reports a fixed set of instances.
///
/// Delivers a single snapshot on subscribe and never notifies again. Useful
/// for fixed fleets, local development, and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    instances: Vec<Instance>,
}

impl StaticRegistry {
    /// Construct a registry that always reports `instances`.
    pub fn new(instances: impl IntoIterator<Item = Instance>) -> Self {
        Self {
            instances: instances.into_iter().collect(),
        }
    }
}

#[async_trait::async_trait]
impl ServiceRegistry for StaticRegistry {
    async fn subscribe(
        &self,
        _service: &str,
        _group: &str,
        notifications: mpsc::Sender<Vec<Instance>>,
    ) -> Result<(), anyhow::Error> {
        notifications
            .send(self.instances.clone())
            .await
            .map_err(|_| anyhow::anyhow!("the watch stopped listening before the first snapshot"))
    }

    async fn unsubscribe(&self, _service: &str, _group: &str) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
