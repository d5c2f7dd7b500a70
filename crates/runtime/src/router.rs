//! Tool routing by live catalog lookup.

use std::sync::Arc;

use crate::registry::ToolConnection;
use crate::tools::{ToolDescriptor, ToolError, ToolProvider};

/// Finds the connection that owns a tool.
///
/// Every lookup asks each provider for its current catalog; nothing is
/// cached between calls. Names match exactly and case-sensitively. When two
/// providers list the same name, the first-registered provider wins.
pub struct Router<'a, P> {
    connections: &'a [Arc<ToolConnection<P>>],
}

impl<'a, P: ToolProvider> Router<'a, P> {
    pub fn new(connections: &'a [Arc<ToolConnection<P>>]) -> Self {
        Self { connections }
    }

    /// Resolve `tool` to its owning connection.
    ///
    /// A provider whose catalog cannot be listed is skipped.
    pub async fn resolve(&self, tool: &str) -> Result<Arc<ToolConnection<P>>, ToolError> {
        for connection in self.connections {
            match connection.provider.list_tools().await {
                Ok(tools) if tools.iter().any(|t| t.name == tool) => {
                    tracing::debug!(tool, provider = %connection.id, "tool resolved");
                    return Ok(connection.clone());
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(provider = %connection.id, error = %e, "catalog lookup failed");
                }
            }
        }
        Err(ToolError::NotFound(tool.to_string()))
    }

    /// The combined catalog of every provider, in registration order.
    pub async fn catalog(&self) -> Vec<ToolDescriptor> {
        let mut catalog = Vec::new();
        for connection in self.connections {
            match connection.provider.list_tools().await {
                Ok(tools) => catalog.extend(tools),
                Err(e) => {
                    tracing::warn!(provider = %connection.id, error = %e, "catalog lookup failed");
                }
            }
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProvider, tool};

    fn connections(
        providers: Vec<(&str, FakeProvider)>,
    ) -> Vec<Arc<ToolConnection<FakeProvider>>> {
        providers
            .into_iter()
            .map(|(id, p)| Arc::new(ToolConnection::new(id, p)))
            .collect()
    }

    #[tokio::test]
    async fn resolves_tool_listed_by_exactly_one_provider() {
        let conns = connections(vec![
            ("flightsearch", FakeProvider::new(vec![tool("search_flights")])),
            (
                "flightbooking",
                FakeProvider::new(vec![
                    tool("book_flight"),
                    tool("get_booking_details"),
                    tool("get_user_bookings"),
                ]),
            ),
        ]);
        let router = Router::new(&conns);

        for (name, owner) in [
            ("search_flights", "flightsearch"),
            ("book_flight", "flightbooking"),
            ("get_booking_details", "flightbooking"),
            ("get_user_bookings", "flightbooking"),
        ] {
            assert_eq!(router.resolve(name).await.unwrap().id, owner);
        }
    }

    #[tokio::test]
    async fn unknown_tools_are_not_found() {
        let conns = connections(vec![(
            "flightsearch",
            FakeProvider::new(vec![tool("search_flights")]),
        )]);
        let router = Router::new(&conns);

        for name in ["cancel_booking", "Search_Flights", "search_flight", ""] {
            assert!(matches!(
                router.resolve(name).await,
                Err(ToolError::NotFound(n)) if n == name
            ));
        }
    }

    #[tokio::test]
    async fn duplicate_names_resolve_to_first_registered() {
        let conns = connections(vec![
            ("primary", FakeProvider::new(vec![tool("search_flights")])),
            ("secondary", FakeProvider::new(vec![tool("search_flights")])),
        ]);
        let router = Router::new(&conns);
        assert_eq!(router.resolve("search_flights").await.unwrap().id, "primary");
    }

    #[tokio::test]
    async fn catalog_is_fetched_live() {
        let provider = FakeProvider::new(vec![tool("search_flights")]);
        let conns = connections(vec![("flightsearch", provider)]);
        let router = Router::new(&conns);

        assert!(router.resolve("book_flight").await.is_err());
        conns[0].provider.set_tools(vec![tool("search_flights"), tool("book_flight")]);
        assert_eq!(router.resolve("book_flight").await.unwrap().id, "flightsearch");
        assert_eq!(conns[0].provider.list_count(), 2);
    }

    #[tokio::test]
    async fn unreachable_provider_is_skipped() {
        let conns = connections(vec![
            ("down", FakeProvider::new(vec![tool("search_flights")]).unreachable()),
            ("up", FakeProvider::new(vec![tool("search_flights")])),
        ]);
        let router = Router::new(&conns);

        assert_eq!(router.resolve("search_flights").await.unwrap().id, "up");
        assert_eq!(router.catalog().await.len(), 1);
    }
}
