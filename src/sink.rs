//! The connection-state sink: where resolved endpoint lists are pushed.

use crate::error::SinkClosed;
use http::Uri;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tonic::transport::{ClientTlsConfig, Endpoint};
use tower::discover::Change;

/// Consumes each newly resolved endpoint list.
///
/// The propagation loop is the only caller: at most one `replace` is in
/// flight at a time. Implemented for tonic channels by [`ChannelSink`];
/// tests substitute recording sinks.
#[async_trait::async_trait]
pub trait EndpointSink: Send + 'static {
    /// Replace the consumer's entire view of live backends with `endpoints`.
    ///
    /// Returning [`SinkClosed`] means the consumer is permanently gone and
    /// resolution should stop; transient problems must be handled inside the
    /// implementation.
    async fn replace(&mut self, endpoints: &[SocketAddr]) -> Result<(), SinkClosed>;
}

#[async_trait::async_trait]
impl<S: EndpointSink + ?Sized> EndpointSink for Box<S> {
    async fn replace(&mut self, endpoints: &[SocketAddr]) -> Result<(), SinkClosed> {
        (**self).replace(endpoints).await
    }
}

/// Reports endpoint changes to a tonic [`Channel`](tonic::transport::Channel)
/// created through
/// [`Channel::balance_channel`](tonic::transport::Channel::balance_channel).
///
/// tonic consumes endpoint *deltas* rather than whole lists, so each
/// [`replace`](EndpointSink::replace) is diffed against the set reported so
/// far and only the resulting insertions and removals are sent.
pub struct ChannelSink {
    reporter: Sender<Change<SocketAddr, Endpoint>>,
    reported: HashSet<SocketAddr>,
    endpoint_timeout: Option<Duration>,
    endpoint_connect_timeout: Option<Duration>,
    tls_config: Option<ClientTlsConfig>,
}

impl ChannelSink {
    /// Wrap the sender half returned by `Channel::balance_channel`.
    pub fn new(reporter: Sender<Change<SocketAddr, Endpoint>>) -> Self {
        Self {
            reporter,
            reported: HashSet::new(),
            endpoint_timeout: None,
            endpoint_connect_timeout: None,
            tls_config: None,
        }
    }

    /// Set a request timeout applied to every new `Endpoint`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.endpoint_timeout = Some(timeout);
        self
    }

    /// Set a connection timeout applied to every new `Endpoint`.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint_connect_timeout = Some(timeout);
        self
    }

    /// Configure every new `Endpoint` to use tls.
    pub fn with_tls(mut self, tls_config: ClientTlsConfig) -> Self {
        self.tls_config = Some(tls_config);
        self
    }

    fn build_endpoint(&self, address: &SocketAddr) -> Option<Endpoint> {
        let uri = build_uri(address, self.tls_config.is_some())?;
        let mut endpoint = Endpoint::from(uri);
        if let Some(tls_config) = &self.tls_config {
            endpoint = match endpoint.tls_config(tls_config.clone()) {
                Ok(endpoint) => endpoint,
                Err(err) => {
                    tracing::warn!(%address, error = %err, "failed to configure tls for endpoint");
                    return None;
                }
            };
        }
        if let Some(timeout) = self.endpoint_timeout {
            endpoint = endpoint.timeout(timeout);
        }
        if let Some(timeout) = self.endpoint_connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }
        Some(endpoint)
    }
}

#[async_trait::async_trait]
impl EndpointSink for ChannelSink {
    async fn replace(&mut self, endpoints: &[SocketAddr]) -> Result<(), SinkClosed> {
        let next: HashSet<SocketAddr> = endpoints.iter().copied().collect();
        let (added, removed) = changeset(&self.reported, &next);

        for address in removed {
            self.reporter
                .send(Change::Remove(address))
                .await
                .map_err(|_| SinkClosed)?;
            self.reported.remove(&address);
        }
        for address in added {
            let endpoint = match self.build_endpoint(&address) {
                Some(endpoint) => endpoint,
                // An endpoint we cannot construct is dropped from this
                // round; it will be retried if it reappears in a later diff.
                None => continue,
            };
            self.reporter
                .send(Change::Insert(address, endpoint))
                .await
                .map_err(|_| SinkClosed)?;
            self.reported.insert(address);
        }
        Ok(())
    }
}

/// Endpoints to insert and to remove to get from `reported` to `next`.
fn changeset(
    reported: &HashSet<SocketAddr>,
    next: &HashSet<SocketAddr>,
) -> (Vec<SocketAddr>, Vec<SocketAddr>) {
    let added = next.difference(reported).copied().collect();
    let removed = reported.difference(next).copied().collect();
    (added, removed)
}

fn build_uri(address: &SocketAddr, tls: bool) -> Option<Uri> {
    let scheme = if tls { "https" } else { "http" };
    match Uri::builder()
        .scheme(scheme)
        .authority(address.to_string().as_str())
        .path_and_query("/")
        .build()
    {
        Ok(uri) => Some(uri),
        Err(err) => {
            tracing::warn!(%address, error = %err, "failed to build endpoint uri");
            None
        }
    }
}
