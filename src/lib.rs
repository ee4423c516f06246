//! `mirto` offers an enriched tonic [`Channel`](tonic::transport::Channel)
//! whose active set of `gRPC` servers follows a service registry: the
//! registry pushes instance changes, and the channel's endpoint set is kept
//! current without the caller ever re-resolving.
//!
//! # Simple example
//!
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() {
//!     use mirto::{Instance, LoadBalancedChannel, RegistryTarget, StaticRegistry};
//!
//!     let target = RegistryTarget::new("127.0.0.1:8848", "orders", "DEFAULT_GROUP")
//!         .with_namespace("prod")
//!         .with_app_name("orders-client");
//!
//!     // A fixed fleet; production code plugs in a real registry client here.
//!     let registry = StaticRegistry::new([
//!         Instance::new("10.0.0.1", 9000),
//!         Instance::new("10.0.0.2", 9000),
//!     ]);
//!
//!     let (channel, resolver) = LoadBalancedChannel::builder(target)
//!         .registry(registry)
//!         .channel()
//!         .await
//!         .expect("failed to construct LoadBalancedChannel");
//!
//!     // Hand `channel` to a generated tonic client; when the connection is
//!     // torn down, stop the watch.
//!     # drop(channel);
//!     resolver.cancel();
//! }
//! ```
//!
//! Any push-based registry can drive the channel by implementing
//! [`ServiceRegistry`].
//!
//! ```rust
//! use mirto::{Instance, ServiceRegistry};
//! use tokio::sync::mpsc;
//!
//! // Reports no instances, ever.
//! struct EmptyRegistry;
//!
//! #[async_trait::async_trait]
//! impl ServiceRegistry for EmptyRegistry {
//!     async fn subscribe(
//!         &self,
//!         _service: &str,
//!         _group: &str,
//!         notifications: mpsc::Sender<Vec<Instance>>,
//!     ) -> Result<(), anyhow::Error> {
//!         notifications
//!             .send(Vec::new())
//!             .await
//!             .map_err(|_| anyhow::anyhow!("watch stopped"))
//!     }
//!
//!     async fn unsubscribe(&self, _service: &str, _group: &str) -> Result<(), anyhow::Error> {
//!         Ok(())
//!     }
//! }
//! ```
//!
//! It's also possible to associate a timeout for every new endpoint that the
//! [`LoadBalancedChannel`] tries to connect to, and to enable tls.
//!
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() {
//!     use mirto::{LoadBalancedChannel, RegistryTarget, StaticRegistry};
//!
//!     let target = RegistryTarget::new("127.0.0.1:8848", "orders", "DEFAULT_GROUP");
//!
//!     let (channel, resolver) = LoadBalancedChannel::builder(target)
//!         .registry(StaticRegistry::default())
//!         .timeout(std::time::Duration::from_secs(10))
//!         .channel()
//!         .await
//!         .expect("failed to construct LoadBalancedChannel");
//! }
//! ```
//!
//! Callers that dispatch on connection-string schemes can register builders
//! in a [`ResolverRegistry`] and feed any [`EndpointSink`] instead of a
//! tonic channel.
//!
//! # Internals
//!
//! The tonic [`Channel`](tonic::transport::Channel) exposes the function
//! [`balance_channel`](tonic::transport::Channel::balance_channel) which
//! returns a bounded channel through which endpoint changes can be sent.
//! `mirto` subscribes to the registry, normalizes every pushed instance list
//! into a deduplicated, canonically ordered endpoint list, suppresses
//! no-op repeats, and reports the resulting additions and removals through
//! that message passing mechanism.

mod balanced_channel;
mod endpoints;
mod error;
mod registry;
mod resolver;
mod sink;
mod static_registry;
mod target;
mod watch;

pub use balanced_channel::*;
pub use endpoints::*;
pub use error::*;
pub use registry::*;
pub use resolver::*;
pub use sink::*;
pub use static_registry::*;
pub use target::*;
pub use watch::ResolverHandle;
