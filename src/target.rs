//! Describes which registry to talk to and which service to watch.

use crate::error::ConfigurationError;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Context path used when the target does not override it.
const DEFAULT_CONTEXT_PATH: &str = "/nacos";

/// Describes a service watched through a registry: the registry server to
/// subscribe against, the `(service, group)` pair to watch, and the client
/// options forwarded to the registry client.
///
/// A `RegistryTarget` is a plain value: it is not validated on construction.
/// Validation happens when a resolver session is built, so that a malformed
/// target surfaces as a [`ConfigurationError`] from the build call rather
/// than from wherever the connection string was parsed.
#[derive(Debug, Clone)]
pub struct RegistryTarget {
    server_addr: String,
    service: String,
    group: String,
    context_path: String,
    namespace: Option<String>,
    app_name: Option<String>,
    username: Option<String>,
    password: Option<String>,
    timeout: Option<Duration>,
    cache_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    log_level: Option<String>,
}

impl RegistryTarget {
    /// Create a target from the registry `host:port` address and the
    /// `(service, group)` pair to watch.
    pub fn new(
        server_addr: impl Into<String>,
        service: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            server_addr: server_addr.into(),
            service: service.into(),
            group: group.into(),
            context_path: DEFAULT_CONTEXT_PATH.to_string(),
            namespace: None,
            app_name: None,
            username: None,
            password: None,
            timeout: None,
            cache_dir: None,
            log_dir: None,
            log_level: None,
        }
    }

    /// Set the registry namespace to resolve in.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the application name shown on the registry side for this
    /// subscriber.
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Set the credentials the registry client authenticates with.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the registry client timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the registry server context path.
    pub fn with_context_path(mut self, context_path: impl Into<String>) -> Self {
        self.context_path = context_path.into();
        self
    }

    /// Set the directory the registry client may cache instance snapshots in.
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    /// Set the directory the registry client writes its own logs to.
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    /// Set the registry client log level.
    pub fn with_log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = Some(log_level.into());
        self
    }

    /// The raw `host:port` registry address.
    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    /// The watched service name.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The watched group name.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The registry namespace, if one was set.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The subscriber application name, if one was set.
    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    /// The registry username, if credentials were set.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// The registry password, if credentials were set.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// The registry client timeout, if one was set.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The registry client snapshot cache directory, if one was set.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// The registry client log directory, if one was set.
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    /// The registry client log level, if one was set.
    pub fn log_level(&self) -> Option<&str> {
        self.log_level.as_deref()
    }

    /// Derive the registry server configuration from the raw address.
    ///
    /// Fails if the address does not split into a host and a port, or if the
    /// port is not a 16-bit unsigned integer. Bracketed IPv6 addresses
    /// (`[::1]:8848`) are accepted.
    pub fn server_config(&self) -> Result<RegistryServer, ConfigurationError> {
        let (host, port) = split_host_port(&self.server_addr)
            .ok_or_else(|| ConfigurationError::InvalidServerAddress(self.server_addr.clone()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| ConfigurationError::InvalidPort(port.to_string()))?;
        Ok(RegistryServer {
            host: host.to_string(),
            port,
            context_path: self.context_path.clone(),
        })
    }

    /// Full build-time validation: the descriptor invariants plus the
    /// derived server configuration.
    pub(crate) fn validate(&self) -> Result<RegistryServer, ConfigurationError> {
        if self.service.is_empty() {
            return Err(ConfigurationError::EmptyService);
        }
        if self.group.is_empty() {
            return Err(ConfigurationError::EmptyGroup);
        }
        self.server_config()
    }
}

/// Registry server configuration derived from a [`RegistryTarget`], ready to
/// hand to a registry client constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryServer {
    /// Registry host, without brackets for IPv6.
    pub host: String,
    /// Registry port.
    pub port: u16,
    /// Server context path, `/nacos` unless overridden on the target.
    pub context_path: String,
}

fn split_host_port(addr: &str) -> Option<(&str, &str)> {
    let (host, port) = addr.rsplit_once(':')?;
    if let Some(bracketed) = host.strip_prefix('[') {
        let host = bracketed.strip_suffix(']')?;
        if host.is_empty() {
            return None;
        }
        Some((host, port))
    } else if host.is_empty() || host.contains(':') {
        // A bare IPv6 address is ambiguous without brackets.
        None
    } else {
        Some((host, port))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn target(addr: &str) -> RegistryTarget {
        RegistryTarget::new(addr, "orders", "DEFAULT_GROUP")
    }

    #[test]
    fn derives_server_config_from_host_and_port() {
        let server = target("127.0.0.1:8848").server_config().unwrap();
        assert_eq!(server.host, "127.0.0.1");
        assert_eq!(server.port, 8848);
        assert_eq!(server.context_path, "/nacos");
    }

    #[test]
    fn accepts_bracketed_ipv6_addresses() {
        let server = target("[::1]:8848").server_config().unwrap();
        assert_eq!(server.host, "::1");
        assert_eq!(server.port, 8848);
    }

    #[test]
    fn rejects_an_address_without_a_port() {
        let err = target("not-a-host-port").server_config().unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidServerAddress(_)));
    }

    #[test]
    fn rejects_an_unbracketed_ipv6_address() {
        let err = target("::1:8848").server_config().unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidServerAddress(_)));
    }

    #[test]
    fn rejects_an_out_of_range_port() {
        let err = target("127.0.0.1:99999").server_config().unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidPort(_)));
    }

    #[test]
    fn rejects_an_empty_service_name() {
        let target = RegistryTarget::new("127.0.0.1:8848", "", "DEFAULT_GROUP");
        assert!(matches!(
            target.validate().unwrap_err(),
            ConfigurationError::EmptyService
        ));
    }

    #[test]
    fn rejects_an_empty_group_name() {
        let target = RegistryTarget::new("127.0.0.1:8848", "orders", "");
        assert!(matches!(
            target.validate().unwrap_err(),
            ConfigurationError::EmptyGroup
        ));
    }

    #[test]
    fn context_path_can_be_overridden() {
        let server = target("127.0.0.1:8848")
            .with_context_path("/registry")
            .server_config()
            .unwrap();
        assert_eq!(server.context_path, "/registry");
    }

    proptest::proptest! {
        #[test]
        fn any_u16_port_is_accepted(port in proptest::num::u16::ANY) {
            let server = target(&format!("registry.internal:{port}")).server_config().unwrap();
            proptest::prop_assert_eq!(server.port, port);
        }
    }
}
