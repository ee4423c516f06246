//! Scheme-keyed resolver construction, for callers that route targets to
//! resolver implementations by connection-string scheme.

use crate::error::BuildError;
use crate::registry::ServiceRegistry;
use crate::sink::EndpointSink;
use crate::target::RegistryTarget;
use crate::watch::{spawn_session, ResolverHandle};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Constructs resolver sessions for targets of one scheme.
pub trait ResolverBuilder: Send + Sync {
    /// The connection-string scheme this builder serves, e.g. `nacos`.
    fn scheme(&self) -> &str;

    /// Start a resolver session that pushes endpoint updates for `target`
    /// into `sink`.
    ///
    /// On success the session is live and the first update arrives
    /// asynchronously; on failure nothing was spawned. Must be called within
    /// a tokio runtime.
    fn build(
        &self,
        target: &RegistryTarget,
        sink: Box<dyn EndpointSink>,
    ) -> Result<ResolverHandle, BuildError>;
}

/// An explicit registry of [`ResolverBuilder`]s keyed by scheme.
///
/// Deliberately not process-global: callers construct one and register
/// builders into it, which keeps resolver wiring visible and lets tests run
/// several registries side by side.
#[derive(Default)]
pub struct ResolverRegistry {
    builders: HashMap<String, Arc<dyn ResolverBuilder>>,
}

impl ResolverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `builder` under its scheme, replacing any builder previously
    /// registered for the same scheme.
    pub fn register(&mut self, builder: Arc<dyn ResolverBuilder>) {
        self.builders.insert(builder.scheme().to_string(), builder);
    }

    /// Look up the builder registered for `scheme`.
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn ResolverBuilder>> {
        self.builders.get(scheme).cloned()
    }

    /// Build a resolver session for `target` with the builder registered for
    /// `scheme`.
    pub fn build(
        &self,
        scheme: &str,
        target: &RegistryTarget,
        sink: Box<dyn EndpointSink>,
    ) -> Result<ResolverHandle, BuildError> {
        let builder = self
            .get(scheme)
            .ok_or_else(|| BuildError::UnknownScheme(scheme.to_string()))?;
        builder.build(target, sink)
    }
}

/// A [`ResolverBuilder`] that connects a fresh registry client for every
/// session.
///
/// The connector maps the target descriptor to a [`ServiceRegistry`]; a
/// connector failure surfaces as [`BuildError::RegistryConnect`], keeping the
/// underlying cause.
pub struct ConnectorResolverBuilder<C, R> {
    scheme: String,
    connect: C,
    registry: PhantomData<fn() -> R>,
}

impl<C, R> ConnectorResolverBuilder<C, R>
where
    C: Fn(&RegistryTarget) -> Result<R, anyhow::Error> + Send + Sync,
    R: ServiceRegistry,
{
    /// Serve `scheme` by connecting a registry client with `connect`.
    pub fn new(scheme: impl Into<String>, connect: C) -> Self {
        Self {
            scheme: scheme.into(),
            connect,
            registry: PhantomData,
        }
    }
}

impl<C, R> ResolverBuilder for ConnectorResolverBuilder<C, R>
where
    C: Fn(&RegistryTarget) -> Result<R, anyhow::Error> + Send + Sync,
    R: ServiceRegistry,
{
    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn build(
        &self,
        target: &RegistryTarget,
        sink: Box<dyn EndpointSink>,
    ) -> Result<ResolverHandle, BuildError> {
        target.validate()?;
        let registry = (self.connect)(target).map_err(BuildError::RegistryConnect)?;
        Ok(spawn_session(
            registry,
            target.service().to_string(),
            target.group().to_string(),
            sink,
        ))
    }
}
