use anyhow::anyhow;
use mirto::{
    BuildError, ConfigurationError, ConnectorResolverBuilder, EndpointSink, Instance,
    LoadBalancedChannel, RegistryTarget, ResolverBuilder, ResolverHandle, ResolverRegistry,
    ServiceRegistry, SinkClosed, StaticRegistry,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

fn orders_target() -> RegistryTarget {
    RegistryTarget::new("127.0.0.1:8848", "orders", "DEFAULT_GROUP")
}

/// Poll `condition` until it holds or the test times out.
async fn eventually(condition: impl Fn() -> bool, what: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

/// Sleep long enough for the session's tasks to have drained anything
/// pending, then hand back to the test to assert that nothing happened.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[derive(Default)]
struct ScriptedRegistryState {
    notifications: Option<mpsc::Sender<Vec<Instance>>>,
    subscribes: usize,
    unsubscribes: usize,
}

/// A registry fake whose notifications are scripted by the test.
#[derive(Clone, Default)]
struct ScriptedRegistry {
    state: Arc<Mutex<ScriptedRegistryState>>,
    fail_subscribe: bool,
}

impl ScriptedRegistry {
    fn failing() -> Self {
        Self {
            fail_subscribe: true,
            ..Self::default()
        }
    }

    fn subscribed(&self) -> bool {
        self.state.lock().unwrap().subscribes > 0
    }

    fn subscribe_count(&self) -> usize {
        self.state.lock().unwrap().subscribes
    }

    fn unsubscribe_count(&self) -> usize {
        self.state.lock().unwrap().unsubscribes
    }

    /// Push one raw instance list, as the registry would on a change.
    async fn publish(&self, instances: Vec<Instance>) {
        let sender = self
            .state
            .lock()
            .unwrap()
            .notifications
            .clone()
            .expect("no live subscription to publish through");
        sender.send(instances).await.expect("watch not listening");
    }

    /// Like `publish`, but tolerates a watch that is already gone.
    async fn try_publish(&self, instances: Vec<Instance>) {
        let sender = self.state.lock().unwrap().notifications.clone();
        if let Some(sender) = sender {
            let _ = sender.send(instances).await;
        }
    }

    /// Drop the registry side of the notification channel, as a registry
    /// client shutting down would.
    fn hang_up(&self) {
        self.state.lock().unwrap().notifications = None;
    }
}

#[async_trait::async_trait]
impl ServiceRegistry for ScriptedRegistry {
    async fn subscribe(
        &self,
        _service: &str,
        _group: &str,
        notifications: mpsc::Sender<Vec<Instance>>,
    ) -> Result<(), anyhow::Error> {
        if self.fail_subscribe {
            return Err(anyhow!("registry unavailable"));
        }
        let mut state = self.state.lock().unwrap();
        state.subscribes += 1;
        state.notifications = Some(notifications);
        Ok(())
    }

    async fn unsubscribe(&self, _service: &str, _group: &str) -> Result<(), anyhow::Error> {
        let mut state = self.state.lock().unwrap();
        state.unsubscribes += 1;
        state.notifications = None;
        Ok(())
    }
}

/// A connection-state sink fake that records every pushed endpoint list.
#[derive(Clone, Default)]
struct RecordingSink {
    pushes: Arc<Mutex<Vec<Vec<SocketAddr>>>>,
}

impl RecordingSink {
    fn recorded(&self) -> Vec<Vec<SocketAddr>> {
        self.pushes.lock().unwrap().clone()
    }

    fn push_count(&self) -> usize {
        self.pushes.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl EndpointSink for RecordingSink {
    async fn replace(&mut self, endpoints: &[SocketAddr]) -> Result<(), SinkClosed> {
        self.pushes.lock().unwrap().push(endpoints.to_vec());
        Ok(())
    }
}

/// Wire a scripted registry and a recording sink through the public
/// builder surface.
fn spawn_pipeline(registry: &ScriptedRegistry, sink: &RecordingSink) -> ResolverHandle {
    let registry = registry.clone();
    let builder = ConnectorResolverBuilder::new(
        "nacos",
        move |_target: &RegistryTarget| -> Result<ScriptedRegistry, anyhow::Error> {
            Ok(registry.clone())
        },
    );
    builder
        .build(&orders_target(), Box::new(sink.clone()))
        .expect("failed to build resolver session")
}

#[tokio::test]
async fn first_notification_reaches_the_sink_deduplicated_and_sorted() {
    // Steps:
    //  1. Build a resolver session against a scripted registry.
    //  2. Publish one notification with out-of-order and duplicate records.
    // What we want to test:
    //  The sink observes a single, deduplicated, canonically ordered list.

    // Arrange
    let registry = ScriptedRegistry::default();
    let sink = RecordingSink::default();
    let handle = spawn_pipeline(&registry, &sink);
    eventually(|| registry.subscribed(), "the registry subscription").await;

    // Act
    registry
        .publish(vec![
            Instance::new("10.0.0.2", 9000),
            Instance::new("10.0.0.1", 9000),
            Instance::new("10.0.0.2", 9000),
        ])
        .await;

    // Assert
    eventually(|| sink.push_count() == 1, "the first endpoint push").await;
    assert_eq!(
        sink.recorded(),
        vec![vec![addr("10.0.0.1:9000"), addr("10.0.0.2:9000")]]
    );

    handle.cancel();
}

#[tokio::test]
async fn a_malformed_registry_address_fails_the_build_before_anything_starts() {
    // Arrange
    let registry = ScriptedRegistry::default();
    let target = RegistryTarget::new("not-a-host-port", "orders", "DEFAULT_GROUP");
    let connector = registry.clone();
    let builder = ConnectorResolverBuilder::new(
        "nacos",
        move |_target: &RegistryTarget| -> Result<ScriptedRegistry, anyhow::Error> {
            Ok(connector.clone())
        },
    );

    // Act
    let err = builder
        .build(&target, Box::new(RecordingSink::default()))
        .unwrap_err();

    // Assert
    assert!(matches!(
        err,
        BuildError::Configuration(ConfigurationError::InvalidServerAddress(_))
    ));
    settle().await;
    assert_eq!(registry.subscribe_count(), 0);
}

#[tokio::test]
async fn a_malformed_target_fails_the_channel_builder() {
    let target = RegistryTarget::new("127.0.0.1:notaport", "orders", "DEFAULT_GROUP");

    let err = LoadBalancedChannel::builder(target)
        .registry(StaticRegistry::default())
        .channel()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BuildError::Configuration(ConfigurationError::InvalidPort(_))
    ));
}

#[tokio::test]
async fn a_repeated_instance_set_is_propagated_only_once() {
    // Steps:
    //  1. Publish a notification.
    //  2. Publish the same logical set again, in a different input order.
    // What we want to test:
    //  The second notification is a no-op for the sink.

    // Arrange
    let registry = ScriptedRegistry::default();
    let sink = RecordingSink::default();
    let handle = spawn_pipeline(&registry, &sink);
    eventually(|| registry.subscribed(), "the registry subscription").await;

    // Act
    registry
        .publish(vec![
            Instance::new("10.0.0.1", 9000),
            Instance::new("10.0.0.2", 9000),
        ])
        .await;
    eventually(|| sink.push_count() == 1, "the first endpoint push").await;
    registry
        .publish(vec![
            Instance::new("10.0.0.2", 9000),
            Instance::new("10.0.0.1", 9000),
        ])
        .await;
    settle().await;

    // Assert
    assert_eq!(
        sink.recorded(),
        vec![vec![addr("10.0.0.1:9000"), addr("10.0.0.2:9000")]]
    );

    handle.cancel();
}

#[tokio::test]
async fn an_empty_instance_list_is_a_propagatable_state() {
    // Zero live backends is a resolution result, not an error: the sink
    // must observe it.
    let registry = ScriptedRegistry::default();
    let sink = RecordingSink::default();
    let handle = spawn_pipeline(&registry, &sink);
    eventually(|| registry.subscribed(), "the registry subscription").await;

    registry.publish(Vec::new()).await;

    eventually(|| sink.push_count() == 1, "the empty endpoint push").await;
    assert_eq!(sink.recorded(), vec![Vec::<SocketAddr>::new()]);

    handle.cancel();
}

#[tokio::test]
async fn distinct_updates_reach_the_sink_in_notification_order() {
    // Arrange
    let registry = ScriptedRegistry::default();
    let sink = RecordingSink::default();
    let handle = spawn_pipeline(&registry, &sink);
    eventually(|| registry.subscribed(), "the registry subscription").await;

    // Act
    registry.publish(vec![Instance::new("10.0.0.1", 9000)]).await;
    registry
        .publish(vec![
            Instance::new("10.0.0.1", 9000),
            Instance::new("10.0.0.2", 9000),
        ])
        .await;
    registry.publish(vec![Instance::new("10.0.0.3", 9000)]).await;

    // Assert
    eventually(|| sink.push_count() == 3, "all three endpoint pushes").await;
    assert_eq!(
        sink.recorded(),
        vec![
            vec![addr("10.0.0.1:9000")],
            vec![addr("10.0.0.1:9000"), addr("10.0.0.2:9000")],
            vec![addr("10.0.0.3:9000")],
        ]
    );

    handle.cancel();
}

#[tokio::test]
async fn cancelling_stops_propagation_and_unsubscribes_exactly_once() {
    // Steps:
    //  1. Deliver one update, then cancel the handle (twice).
    //  2. Publish another notification after cancellation.
    // What we want to test:
    //  Teardown unsubscribes exactly once, and no update after cancel
    //  reaches the sink.

    // Arrange
    let registry = ScriptedRegistry::default();
    let sink = RecordingSink::default();
    let handle = spawn_pipeline(&registry, &sink);
    eventually(|| registry.subscribed(), "the registry subscription").await;
    registry.publish(vec![Instance::new("10.0.0.1", 9000)]).await;
    eventually(|| sink.push_count() == 1, "the first endpoint push").await;

    // Act
    handle.cancel();
    handle.cancel();
    eventually(|| registry.unsubscribe_count() == 1, "the unsubscribe").await;
    registry.try_publish(vec![Instance::new("10.0.0.9", 9000)]).await;
    settle().await;

    // Assert
    assert_eq!(registry.unsubscribe_count(), 1);
    assert_eq!(sink.push_count(), 1);
}

#[tokio::test]
async fn a_failed_subscription_leaves_the_session_broken_but_quiet() {
    // A subscribe failure is fatal for the session: no retry, no panic, no
    // pushes; the failure is observable through logs and staleness only.
    let registry = ScriptedRegistry::failing();
    let sink = RecordingSink::default();
    let handle = spawn_pipeline(&registry, &sink);

    settle().await;

    assert_eq!(sink.push_count(), 0);
    assert_eq!(registry.unsubscribe_count(), 0);
    handle.cancel();
}

#[tokio::test]
async fn a_registry_hang_up_tears_the_session_down_cleanly() {
    // Arrange
    let registry = ScriptedRegistry::default();
    let sink = RecordingSink::default();
    let handle = spawn_pipeline(&registry, &sink);
    eventually(|| registry.subscribed(), "the registry subscription").await;

    // Act: the registry client drops its notification sender.
    registry.hang_up();

    // Assert: the listener unwinds and unsubscribes on its way out.
    eventually(|| registry.unsubscribe_count() == 1, "the unsubscribe").await;
    handle.cancel();
}

#[tokio::test]
async fn a_failing_registry_connector_surfaces_the_cause() {
    let builder = ConnectorResolverBuilder::new(
        "nacos",
        |_target: &RegistryTarget| -> Result<StaticRegistry, anyhow::Error> {
            Err(anyhow!("connection refused"))
        },
    );

    let err = builder
        .build(&orders_target(), Box::new(RecordingSink::default()))
        .unwrap_err();

    match err {
        BuildError::RegistryConnect(cause) => {
            assert!(cause.to_string().contains("connection refused"));
        }
        other => panic!("expected RegistryConnect, got {other:?}"),
    }
}

#[tokio::test]
async fn resolver_registries_route_by_scheme() {
    // Arrange
    let mut schemes = ResolverRegistry::new();
    schemes.register(Arc::new(ConnectorResolverBuilder::new(
        "nacos",
        |_target: &RegistryTarget| -> Result<StaticRegistry, anyhow::Error> {
            Ok(StaticRegistry::default())
        },
    )));

    // Act + Assert: the registered scheme builds...
    let handle = schemes
        .build("nacos", &orders_target(), Box::new(RecordingSink::default()))
        .expect("the registered scheme should build");
    handle.cancel();

    // ...and an unregistered one is rejected.
    let err = schemes
        .build("consul", &orders_target(), Box::new(RecordingSink::default()))
        .unwrap_err();
    assert!(matches!(err, BuildError::UnknownScheme(scheme) if scheme == "consul"));
}

#[tokio::test]
async fn a_channel_can_be_built_against_a_static_registry() {
    // Smoke test for the tonic-facing surface: the build is non-blocking
    // and hands back a usable channel plus a cancellable handle.
    let target = orders_target().with_credentials("nacos", "nacos");

    let (channel, resolver) = LoadBalancedChannel::builder(target)
        .registry(StaticRegistry::new([Instance::new("10.0.0.1", 9000)]))
        .timeout(Duration::from_secs(5))
        .channel()
        .await
        .expect("failed to construct LoadBalancedChannel");

    let _channel: tonic::transport::Channel = channel.into();
    resolver.cancel();
    resolver.cancel();
}
