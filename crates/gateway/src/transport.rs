//! Transport trait seams
//!
//! The exchange websocket/REST transports and the FIX session engine are
//! external collaborators; the gateway consumes them exclusively through
//! these traits. Trait objects keep the engine testable with channel-backed
//! doubles.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::messages::exchange::{
    BookLevel, ExchangeEvent, OrderCommand, OrderState, SubscriptionId, SubscriptionRequest,
    TradeFill,
};
use crate::messages::fix::FixMessage;

/// One authenticated websocket connection to the exchange
///
/// Calls that establish or tear down state (connect, credentials,
/// subscribe, unsubscribe) are awaited with bounded deadlines by the
/// gateway; implementations should not block indefinitely either.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Open the connection; the receiver carries every inbound typed event,
    /// starting with the authentication result once credentials are sent
    async fn connect(&self) -> Result<mpsc::Receiver<ExchangeEvent>, TransportError>;

    /// Submit API credentials over the open connection
    async fn credentials(
        &self,
        api_key: &str,
        api_secret: &str,
        nonce: u64,
    ) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    async fn close(&self) -> Result<(), TransportError>;

    async fn subscribe(
        &self,
        request: SubscriptionRequest,
    ) -> Result<SubscriptionId, TransportError>;

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError>;

    /// Fire-and-forget order command; errors are the caller's signal to
    /// synthesize an immediate FIX reject
    async fn send(&self, command: OrderCommand) -> Result<(), TransportError>;
}

/// REST-style synchronous queries against the exchange
#[async_trait]
pub trait ExchangeQuery: Send + Sync {
    async fn order_status(&self, order_id: i64) -> Result<OrderState, TransportError>;

    async fn order_trades(
        &self,
        symbol: &str,
        order_id: i64,
    ) -> Result<Vec<TradeFill>, TransportError>;

    async fn book_snapshot(
        &self,
        symbol: &str,
        precision: &str,
        length: u32,
    ) -> Result<Vec<BookLevel>, TransportError>;
}

/// Session-addressed message delivery into the external FIX engine
pub trait FixSink: Send + Sync {
    fn send(&self, session_id: &str, message: FixMessage) -> Result<(), TransportError>;
}
