//! Opening connections to a bus.

use async_trait::async_trait;

use crate::Result;
use crate::bus::EventBus;

/// Something services connect to at start-up.
///
/// Each participant opens its own connection and closes it at shutdown.
#[async_trait]
pub trait BusConnector: Send + Sync {
    type Connection: EventBus + Clone + 'static;

    /// Name of the exchange connections publish to.
    fn exchange(&self) -> &str;

    /// Opens a new connection.
    async fn connect(&self) -> Result<Self::Connection>;
}
