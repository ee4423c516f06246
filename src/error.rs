//! Errors surfaced by the resolution pipeline.

use thiserror::Error;

/// A target descriptor that cannot be turned into a registry server
/// configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The registry address does not split into a host and a port.
    #[error("registry address `{0}` is not a valid `host:port` pair")]
    InvalidServerAddress(String),
    /// The port part of the registry address is not a 16-bit unsigned integer.
    #[error("registry port `{0}` is not a valid 16-bit unsigned integer")]
    InvalidPort(String),
    /// The service name is empty.
    #[error("service name is empty")]
    EmptyService,
    /// The group name is empty.
    #[error("group name is empty")]
    EmptyGroup,
}

/// Why a resolver session could not be built.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The target descriptor is malformed. Nothing was spawned.
    #[error("invalid registry target")]
    Configuration(#[from] ConfigurationError),
    /// The registry client could not be constructed for this target.
    #[error("could not connect to the service registry")]
    RegistryConnect(#[source] anyhow::Error),
    /// No [`ResolverBuilder`](crate::ResolverBuilder) is registered for the
    /// requested scheme.
    #[error("no resolver registered for scheme `{0}`")]
    UnknownScheme(String),
}

/// The connection-state sink is permanently gone.
///
/// Returned by [`EndpointSink::replace`](crate::EndpointSink::replace) once
/// the consumer of endpoint updates has shut down; the propagation loop
/// treats it as a signal to stop.
#[derive(Debug, Error)]
#[error("the connection-state sink is closed")]
pub struct SinkClosed;
