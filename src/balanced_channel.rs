//! Provides the builder and implementation of [`GrpcService`] whose active
//! endpoint set follows a service-registry subscription.

use crate::error::BuildError;
use crate::registry::ServiceRegistry;
use crate::sink::ChannelSink;
use crate::target::RegistryTarget;
use crate::watch::{spawn_session, ResolverHandle};
use http::Request;
use std::{
    net::SocketAddr,
    task::{Context, Poll},
};
use tokio::time::Duration;
use tonic::transport::{Channel, ClientTlsConfig};
use tonic::{body::BoxBody, client::GrpcService};
use tower::Service;

// Determines the size of the channel we use to report endpoint changes to
// tonic. This is effectively how many changes we can report in one go.
// We set the number high to avoid any blocking on our side.
static GRPC_REPORT_ENDPOINTS_CHANNEL_SIZE: usize = 1024;

/// Implements tonic [`GrpcService`] for a client-side load balanced
/// [`Channel`] (using `The Power of Two Choices`) whose endpoints track a
/// service registry.
///
/// ```rust,no_run
/// #[tokio::main]
/// async fn main() {
///     use mirto::{Instance, LoadBalancedChannel, RegistryTarget, StaticRegistry};
///
///     let target = RegistryTarget::new("127.0.0.1:8848", "orders", "DEFAULT_GROUP");
///
///     let (channel, resolver) = LoadBalancedChannel::builder(target)
///         .registry(StaticRegistry::new([Instance::new("10.0.0.1", 9000)]))
///         .channel()
///         .await
///         .expect("failed to construct LoadBalancedChannel");
///
///     // Hand `channel` to a generated tonic client.
///     # drop(channel);
///     // On connection teardown, stop the watch.
///     resolver.cancel();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LoadBalancedChannel(Channel);

impl From<LoadBalancedChannel> for Channel {
    fn from(channel: LoadBalancedChannel) -> Self {
        channel.0
    }
}

impl LoadBalancedChannel {
    /// Start configuring a `LoadBalancedChannel` by passing in the
    /// [`RegistryTarget`] describing the registry server and the service you
    /// want to call.
    pub fn builder(target: RegistryTarget) -> LoadBalancedChannelBuilder<()> {
        LoadBalancedChannelBuilder::new_with_target(target)
    }
}

impl Service<Request<BoxBody>> for LoadBalancedChannel {
    type Response = http::Response<<Channel as GrpcService<BoxBody>>::ResponseBody>;
    type Error = <Channel as GrpcService<BoxBody>>::Error;
    type Future = <Channel as GrpcService<BoxBody>>::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        GrpcService::poll_ready(&mut self.0, cx)
    }

    fn call(&mut self, request: Request<BoxBody>) -> Self::Future {
        GrpcService::call(&mut self.0, request)
    }
}

/// Builder to configure and create a [`LoadBalancedChannel`].
pub struct LoadBalancedChannelBuilder<T> {
    target: RegistryTarget,
    registry: T,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    tls_config: Option<ClientTlsConfig>,
}

impl LoadBalancedChannelBuilder<()> {
    /// Start from the [`RegistryTarget`] describing the registry server and
    /// the `(service, group)` pair to watch.
    pub fn new_with_target(target: RegistryTarget) -> Self {
        Self {
            target,
            registry: (),
            timeout: None,
            connect_timeout: None,
            tls_config: None,
        }
    }

    /// Set the [`ServiceRegistry`] used to watch the service's instances.
    pub fn registry<T: ServiceRegistry>(self, registry: T) -> LoadBalancedChannelBuilder<T> {
        LoadBalancedChannelBuilder {
            target: self.target,
            registry,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            tls_config: self.tls_config,
        }
    }
}

impl<T: ServiceRegistry> LoadBalancedChannelBuilder<T> {
    /// Set a request timeout that will be applied to every new `Endpoint`.
    pub fn timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    /// Set a connection timeout that will be applied to every new
    /// `Endpoint`.
    ///
    /// Defaults to the overall request `timeout` if not set.
    pub fn connect_timeout(self, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout: Some(connect_timeout),
            ..self
        }
    }

    /// Configure the channel to use tls.
    /// A `tls_config` MUST be specified to use the `HTTPS` scheme.
    pub fn with_tls(self, tls_config: ClientTlsConfig) -> Self {
        Self {
            tls_config: Some(tls_config),
            ..self
        }
    }

    /// Construct a [`LoadBalancedChannel`] and start the resolver session
    /// feeding it.
    ///
    /// The call validates the target and starts the registry subscription,
    /// but does not wait for the first notification: the endpoint set fills
    /// in asynchronously. The returned [`ResolverHandle`] stops the session;
    /// the channel itself stays usable until dropped.
    pub async fn channel(self) -> Result<(LoadBalancedChannel, ResolverHandle), BuildError> {
        // Surface configuration problems before anything is spawned.
        self.target.validate()?;

        let (channel, reporter) =
            Channel::balance_channel::<SocketAddr>(GRPC_REPORT_ENDPOINTS_CHANNEL_SIZE);

        let tls_config = self.tls_config.map(|tls_config| {
            // Since we dial resolved IPs, which are not valid DNS names, the
            // hostname has to be set explicitly on the tls config, otherwise
            // the IP would be set as the domain name and the tls handshake
            // would fail.
            tls_config.domain_name(self.target.service())
        });

        let mut sink = ChannelSink::new(reporter);
        if let Some(timeout) = self.timeout {
            sink = sink.timeout(timeout);
        }
        if let Some(timeout) = self.connect_timeout.or(self.timeout) {
            sink = sink.connect_timeout(timeout);
        }
        if let Some(tls_config) = tls_config {
            sink = sink.with_tls(tls_config);
        }

        let handle = spawn_session(
            self.registry,
            self.target.service().to_string(),
            self.target.group().to_string(),
            sink,
        );

        Ok((LoadBalancedChannel(channel), handle))
    }
}

const _: () = {
    const fn assert_is_send<T: Send>() {}
    assert_is_send::<LoadBalancedChannel>();
    assert_is_send::<ResolverHandle>();
};
