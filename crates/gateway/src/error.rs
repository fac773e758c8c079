//! Error types for the gateway crate

use thiserror::Error;

use crate::messages::fix::FieldError;

/// Transport-level errors (exchange connection and FIX delivery)
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Subscription failed: {0}")]
    Subscribe(String),

    #[error("Unsubscribe failed: {0}")]
    Unsubscribe(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Timeout waiting for response")]
    Timeout,
}

/// Order-identity cache lookup failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("No order with exchange id {0}")]
    OrderIdNotFound(i64),

    #[error("Cancel not found: {0}")]
    CancelNotFound(String),
}

/// Gateway-level errors, one variant per class of failure that aborts
/// message handling. Client mistakes (validation, duplicate requests)
/// answer with synthetic FIX rejects instead of surfacing here, and
/// unrecoverable internal inconsistencies panic at the detection site.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),
}
