//! Session registry: one long-lived connection per tool provider.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use mcp::{Connection, LaunchConfig};
use tokio::sync::RwLock;

use crate::tools::ToolProvider;
use crate::{Error, Result};

/// A provider connection and the id it was registered under.
#[derive(Debug)]
pub struct ToolConnection<P> {
    pub id: String,
    pub provider: P,
}

impl<P> ToolConnection<P> {
    pub fn new(id: impl Into<String>, provider: P) -> Self {
        Self {
            id: id.into(),
            provider,
        }
    }
}

/// The live provider connections, in acquisition order.
///
/// Connections are created once at startup and released once at
/// [`Registry::stop`]; they are never recreated mid-run.
pub struct Registry<P> {
    connections: RwLock<Vec<Arc<ToolConnection<P>>>>,
}

impl Registry<Connection> {
    /// Spawn and handshake every configured provider, in order.
    pub async fn start(configs: Vec<LaunchConfig>) -> Result<Self> {
        let specs = configs
            .into_iter()
            .map(|config| (config.name.clone(), config))
            .collect();
        Self::start_with(specs, Connection::connect).await
    }
}

impl<P: ToolProvider> Registry<P> {
    /// A registry over already-connected providers.
    pub fn from_connections(connections: Vec<ToolConnection<P>>) -> Self {
        Self {
            connections: RwLock::new(connections.into_iter().map(Arc::new).collect()),
        }
    }

    /// Connect providers one by one with `connect`.
    ///
    /// Fails fast: the first provider that cannot be started aborts startup,
    /// and the providers already started are released in reverse order.
    pub async fn start_with<S, F, Fut, E>(specs: Vec<(String, S)>, mut connect: F) -> Result<Self>
    where
        F: FnMut(S) -> Fut,
        Fut: Future<Output = std::result::Result<P, E>>,
        E: Display,
    {
        let mut started = Vec::with_capacity(specs.len());

        for (id, spec) in specs {
            match connect(spec).await {
                Ok(provider) => {
                    tracing::info!(provider = %id, "provider connected");
                    started.push(ToolConnection::new(id, provider));
                }
                Err(e) => {
                    tracing::error!(provider = %id, error = %e, "provider failed to start");
                    Self::from_connections(started).stop().await;
                    return Err(Error::Startup {
                        provider: id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(Self::from_connections(started))
    }

    /// The current connections, in registration order.
    pub async fn snapshot(&self) -> Vec<Arc<ToolConnection<P>>> {
        self.connections.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Release every connection in reverse acquisition order.
    ///
    /// In-flight invocations are not awaited: a connection still borrowed by
    /// a request is detached here and closed when its last user drops it.
    /// Calling `stop` more than once is harmless.
    pub async fn stop(&self) {
        let connections = std::mem::take(&mut *self.connections.write().await);

        for connection in connections.into_iter().rev() {
            match Arc::try_unwrap(connection) {
                Ok(connection) => {
                    tracing::info!(provider = %connection.id, "stopping provider");
                    connection.provider.shutdown().await;
                }
                Err(shared) => {
                    tracing::warn!(provider = %shared.id, "provider busy, detaching without waiting");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProvider, tool};
    use std::sync::Mutex;

    #[tokio::test]
    async fn start_keeps_acquisition_order() {
        let specs = vec![
            ("flightsearch".to_string(), vec!["search_flights"]),
            ("flightbooking".to_string(), vec!["book_flight"]),
        ];
        let registry = Registry::start_with(specs, |tools: Vec<&str>| async move {
            Ok::<_, String>(FakeProvider::new(tools.into_iter().map(tool).collect()))
        })
        .await
        .unwrap();

        let ids: Vec<_> = registry
            .snapshot()
            .await
            .iter()
            .map(|c| c.id.clone())
            .collect();
        assert_eq!(ids, ["flightsearch", "flightbooking"]);
    }

    #[tokio::test]
    async fn failed_start_rolls_back_in_reverse_order() {
        let shutdowns = Arc::new(Mutex::new(Vec::new()));
        let specs = vec![
            ("a".to_string(), Some("a")),
            ("b".to_string(), Some("b")),
            ("c".to_string(), None),
            ("d".to_string(), Some("d")),
        ];

        let attempted = Arc::new(Mutex::new(Vec::new()));
        let result = Registry::start_with(specs, |spec: Option<&'static str>| {
            let shutdowns = shutdowns.clone();
            let attempted = attempted.clone();
            async move {
                attempted.lock().unwrap().push(spec);
                match spec {
                    Some(name) => Ok(FakeProvider::new(Vec::new()).on_shutdown(name, shutdowns)),
                    None => Err("handshake failed"),
                }
            }
        })
        .await;

        match result {
            Err(Error::Startup { provider, reason }) => {
                assert_eq!(provider, "c");
                assert_eq!(reason, "handshake failed");
            }
            _ => panic!("expected startup failure"),
        }
        assert_eq!(*shutdowns.lock().unwrap(), ["b", "a"]);
        assert_eq!(attempted.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn stop_releases_in_reverse_and_is_idempotent() {
        let shutdowns = Arc::new(Mutex::new(Vec::new()));
        let registry = Registry::from_connections(vec![
            ToolConnection::new(
                "first",
                FakeProvider::new(Vec::new()).on_shutdown("first", shutdowns.clone()),
            ),
            ToolConnection::new(
                "second",
                FakeProvider::new(Vec::new()).on_shutdown("second", shutdowns.clone()),
            ),
        ]);

        registry.stop().await;
        registry.stop().await;

        assert_eq!(*shutdowns.lock().unwrap(), ["second", "first"]);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn stop_does_not_wait_for_borrowed_connections() {
        let shutdowns = Arc::new(Mutex::new(Vec::new()));
        let registry = Registry::from_connections(vec![ToolConnection::new(
            "busy",
            FakeProvider::new(Vec::new()).on_shutdown("busy", shutdowns.clone()),
        )]);

        let in_flight = registry.snapshot().await;
        registry.stop().await;

        assert!(shutdowns.lock().unwrap().is_empty());
        assert_eq!(in_flight[0].id, "busy");
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn start_reports_missing_provider_binary() {
        let config = LaunchConfig::new("ghost", "gangway-no-such-provider-binary");
        match Registry::start(vec![config]).await {
            Err(Error::Startup { provider, .. }) => assert_eq!(provider, "ghost"),
            _ => panic!("expected startup failure"),
        }
    }
}
