//! The watch session: registry subscription, update hand-off, and state
//! propagation.
//!
//! A session is two cooperating tasks joined by a bounded channel. The
//! subscription listener owns the registry subscription and normalizes every
//! raw notification; the propagation loop owns the connection-state sink and
//! is its only writer. Both observe one shared cancellation token, so
//! teardown completes in bounded time no matter which side is blocked.

use crate::endpoints::sorted_endpoints;
use crate::registry::ServiceRegistry;
use crate::sink::EndpointSink;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

// How many normalized endpoint lists may queue between the subscription
// listener and the propagation loop. Only the latest list is meaningful, so
// a small buffer is enough to absorb notification bursts without stalling
// the registry client.
const UPDATE_CHANNEL_SIZE: usize = 16;

// How many raw notifications may queue between the registry client and the
// subscription listener.
const NOTIFICATIONS_CHANNEL_SIZE: usize = 16;

/// Handle to a live resolver session.
///
/// The only operation is [`cancel`](ResolverHandle::cancel); once cancelled
/// the handle is terminal and a new session requires a fresh build. Dropping
/// the handle without cancelling leaves the watch running.
#[derive(Debug, Clone)]
pub struct ResolverHandle {
    token: CancellationToken,
}

impl ResolverHandle {
    /// Stop the watch: unsubscribe from the registry and stop endpoint
    /// propagation.
    ///
    /// Idempotent and non-blocking; teardown completes in the background.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Start a resolver session: one subscription listener and one propagation
/// loop, joined by the update channel and a shared cancellation token.
///
/// Must be called within a tokio runtime. The call does not wait for the
/// subscription to be established, let alone for the first notification.
pub(crate) fn spawn_session<R, S>(
    registry: R,
    service: String,
    group: String,
    sink: S,
) -> ResolverHandle
where
    R: ServiceRegistry,
    S: EndpointSink,
{
    let token = CancellationToken::new();
    let (updates_tx, updates_rx) = mpsc::channel(UPDATE_CHANNEL_SIZE);

    let listener_span = tracing::info_span!("registry_watch", service = %service, group = %group);
    tokio::spawn(
        watch_registry(registry, service, group, updates_tx, token.clone())
            .instrument(listener_span),
    );
    tokio::spawn(
        propagate_updates(updates_rx, sink, token.clone())
            .instrument(tracing::info_span!("endpoint_propagation")),
    );

    ResolverHandle { token }
}

/// Subscription listener: subscribes to the registry, normalizes every raw
/// notification, and forwards the result into the update channel.
async fn watch_registry<R>(
    registry: R,
    service: String,
    group: String,
    updates: mpsc::Sender<Vec<SocketAddr>>,
    token: CancellationToken,
) where
    R: ServiceRegistry,
{
    let (notifications_tx, mut notifications) = mpsc::channel(NOTIFICATIONS_CHANNEL_SIZE);
    if let Err(err) = registry.subscribe(&service, &group, notifications_tx).await {
        // Fatal for this session: the watch is left broken rather than
        // retried, and the failure is only observable through logs and
        // endpoint staleness.
        tracing::error!(error = ?err, "registry subscription failed; endpoint watch is not running");
        return;
    }
    tracing::debug!("subscribed to registry");

    loop {
        let raw = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            raw = notifications.recv() => match raw {
                Some(raw) => raw,
                // The registry client dropped its sender; no further
                // notifications can arrive.
                None => break,
            },
        };
        let endpoints = sorted_endpoints(&raw);
        tracing::debug!(
            instances = raw.len(),
            endpoints = endpoints.len(),
            "received instance notification"
        );
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            sent = updates.send(endpoints) => {
                if sent.is_err() {
                    // The propagation loop is gone; nothing left to feed.
                    break;
                }
            }
        }
    }

    if let Err(err) = registry.unsubscribe(&service, &group).await {
        tracing::warn!(error = ?err, "failed to unsubscribe from registry");
    }
    tracing::debug!("registry watch stopped");
}

/// State propagation loop: pushes each endpoint list that differs from the
/// previous one into the sink, in notification order.
async fn propagate_updates<S>(
    mut updates: mpsc::Receiver<Vec<SocketAddr>>,
    mut sink: S,
    token: CancellationToken,
) where
    S: EndpointSink,
{
    // The list last pushed into the sink. `None` until the first update, so
    // an initial empty list still propagates.
    let mut current: Option<Vec<SocketAddr>> = None;
    loop {
        let endpoints = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            update = updates.recv() => match update {
                Some(endpoints) => endpoints,
                // Listener gone; same as cancellation.
                None => break,
            },
        };
        if current.as_ref() == Some(&endpoints) {
            tracing::trace!("endpoint list unchanged; nothing to propagate");
            continue;
        }
        if sink.replace(&endpoints).await.is_err() {
            tracing::warn!("connection-state sink closed; stopping endpoint propagation");
            break;
        }
        tracing::debug!(endpoints = ?endpoints, "propagated endpoint update");
        current = Some(endpoints);
    }
    tracing::debug!("endpoint propagation stopped");
}
