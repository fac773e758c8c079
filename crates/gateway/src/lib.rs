//! Iris Gateway
//!
//! Per-session protocol-translation engine between FIX trading clients and
//! a crypto exchange speaking an authenticated, asynchronous websocket/REST
//! protocol. Provides:
//! - Peer (session) lifecycle management with authentication handoff
//! - The order-identity cache: the only place order truth lives
//! - FIX <-> exchange translators that synthesize complete execution
//!   reports from an event stream that frequently omits fields
//! - A market-data subscription multiplexer mapping request ids across
//!   both protocols
//!
//! ## Architecture
//!
//! ```text
//! FIX engine (external)              Exchange transport (external)
//!      │ on_logon / on_app_message        │ typed event stream
//! ┌────▼─────────────────────────────────▼────┐
//! │ Gateway                                   │
//! │   PeerManager ── Peer ── OrderCache       │
//! │   translators   │        SubscriptionMap  │
//! │                 └── per-peer listener ──┐ │
//! │   run_dispatch ◄── shared event queue ◄─┘ │
//! └───────────────────────────────────────────┘
//! ```
//!
//! FIX handlers and the dispatch loop run concurrently; every per-peer
//! structure is safe under both writers.

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod messages;
pub mod nonce;
pub mod peer;
pub mod subscriptions;
pub mod symbology;
pub mod translate;
pub mod transport;

// Re-export commonly used types
pub use cache::{CachedCancel, NewOrder, OrderCache, OrderView};
pub use config::GatewayConfig;
pub use dispatch::run_dispatch;
pub use error::{CacheError, GatewayError, TransportError};
pub use gateway::Gateway;
pub use messages::{
    exchange::{ExchangeEvent, OrderCommand, SubscriptionRequest},
    fix::{FieldMap, FixMessage, MsgType},
};
pub use peer::{ExchangeHandles, HandleFactory, Peer, PeerEvent, PeerManager};
pub use subscriptions::{SubscriptionIds, SubscriptionMap};
pub use symbology::{PassthroughSymbology, TableSymbology};
pub use transport::{ExchangeClient, ExchangeQuery, FixSink};
