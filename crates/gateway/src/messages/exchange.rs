//! Exchange wire types
//!
//! Typed forms of the exchange's websocket/REST protocol: outbound order
//! commands and subscription requests, and the inbound event taxonomy the
//! dispatch loop fans out. The exchange is order-identity-agnostic on the
//! wire -- acknowledgements frequently omit the client order id, original
//! price and flags, which is why the order cache exists.

use chrono::{DateTime, Utc};
use iris_core::{OrderFlags, OrderStatus, OrderType, TimeInForce};
use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Exchange-assigned channel/subscription identifier
pub type SubscriptionId = i64;

/// New order submission payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPayload {
    /// Client id echoed back on acknowledgements; the ClOrdID when it
    /// parses as an integer, otherwise a generated nonce
    pub cid: i64,
    pub symbol: String,
    /// Signed quantity: positive buys, negative sells
    pub amount: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub trail_offset: Option<Decimal>,
    /// Exchange order-type string, e.g. "LIMIT" (margin) or "EXCHANGE LIMIT"
    pub order_type: String,
    pub flags: OrderFlags,
    pub tif: TimeInForce,
    pub tif_expiration: Option<DateTime<Utc>>,
    pub leverage: Option<u32>,
}

/// Order modification payload; the exchange addresses it by order id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacePayload {
    pub order_id: i64,
    pub price: Option<Decimal>,
    /// Signed quantity, when changed
    pub amount: Option<Decimal>,
    pub leverage: Option<u32>,
    pub flags: Option<OrderFlags>,
}

/// Outbound authenticated order commands
#[derive(Debug, Clone, PartialEq)]
pub enum OrderCommand {
    Submit(OrderPayload),
    Cancel { order_id: i64 },
    Update(ReplacePayload),
}

/// Market-data stream subscription requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionRequest {
    Book {
        symbol: String,
        precision: String,
        length: u32,
    },
    Trades {
        symbol: String,
    },
}

impl SubscriptionRequest {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Book { symbol, .. } | Self::Trades { symbol } => symbol,
        }
    }
}

/// Order state as the exchange reports it
///
/// Sparse by design: `cid`, flags and prices may be absent on asynchronous
/// acknowledgements. `status` is the composite free-text field, e.g.
/// "EXECUTED @ 1662.9(0.05): was PARTIALLY FILLED @ 1661.5(0.05)".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderState {
    pub order_id: i64,
    pub cid: Option<i64>,
    pub symbol: String,
    /// Signed remaining quantity
    pub amount: Decimal,
    /// Signed original quantity
    pub amount_orig: Decimal,
    pub price: Decimal,
    pub order_type: String,
    pub status: String,
    pub flags: Option<u32>,
}

/// One fill reported by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeFill {
    pub exec_id: i64,
    pub order_id: i64,
    pub symbol: String,
    pub exec_price: Decimal,
    /// Signed fill quantity
    pub exec_amount: Decimal,
    pub fee: Option<Decimal>,
    pub fee_currency: Option<String>,
    pub cid: Option<i64>,
}

/// One price level of the order book; positive amounts are bids, negative
/// amounts are offers, and a count of zero removes the level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub count: u32,
    pub amount: Decimal,
}

/// One public trade on a trade stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PublicTrade {
    pub trade_id: i64,
    pub price: Decimal,
    /// Signed: positive for buyer-initiated
    pub amount: Decimal,
}

/// Wallet balance snapshot/update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub wallet_type: String,
    pub currency: String,
    pub balance: Decimal,
    pub available: Option<Decimal>,
}

/// Position snapshot/update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub symbol: String,
    /// Signed: positive long, negative short
    pub amount: Decimal,
    pub base_price: Decimal,
}

/// Which request a notification acknowledges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    OrderNew,
    OrderCancel,
    OrderUpdate,
}

/// Outcome carried by a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    Success,
    Error,
    Info,
}

/// Asynchronous acknowledgement wrapping an order outcome with status/text
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub status: NotificationStatus,
    pub text: String,
    pub order: OrderState,
}

/// The typed inbound event stream from one exchange connection
///
/// Matched exhaustively in the dispatch loop; kinds the gateway has no
/// business reaction to are logged, never dropped silently.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeEvent {
    AuthResult {
        success: bool,
        user_id: Option<String>,
        text: Option<String>,
    },
    Info {
        code: i64,
        text: String,
    },
    OrderNew(OrderState),
    /// Terminal cancel confirmation
    OrderCancel(OrderState),
    OrderUpdate(OrderState),
    OrderSnapshot(Vec<OrderState>),
    Notification(Notification),
    TradeExecution(TradeFill),
    BookSnapshot {
        sub_id: SubscriptionId,
        symbol: String,
        levels: Vec<BookLevel>,
    },
    BookUpdate {
        sub_id: SubscriptionId,
        symbol: String,
        level: BookLevel,
    },
    Trade {
        sub_id: SubscriptionId,
        symbol: String,
        trade: PublicTrade,
    },
    TradeSnapshot {
        sub_id: SubscriptionId,
        symbol: String,
        trades: Vec<PublicTrade>,
    },
    WalletSnapshot(Vec<Wallet>),
    WalletUpdate(Wallet),
    PositionSnapshot(Vec<PositionState>),
    PositionUpdate(PositionState),
    /// Emitted once when the connection closes
    Disconnected,
}

/// Classify the exchange's composite status string.
///
/// The exchange folds the terminal state and the prior state into one
/// free-text field; the substring checks below are an ordered priority
/// list and the order is a correctness-critical tie-break:
/// "EXECUTED @ X: was PARTIALLY FILLED @ Y" must classify as Filled.
pub fn classify_status(status: &str) -> OrderStatus {
    if status.contains("EXECUTED") {
        OrderStatus::Filled
    } else if status.contains("PARTIALLY FILLED") {
        OrderStatus::PartiallyFilled
    } else if status.contains("CANCELED") {
        OrderStatus::Canceled
    } else {
        if !status.is_empty() && !status.contains("ACTIVE") {
            warn!("Unrecognized exchange order status {status:?}, defaulting to New");
        }
        OrderStatus::New
    }
}

/// Parse the exchange order-type string back to the domain type.
/// Margin orders are unprefixed; non-margin ones carry "EXCHANGE ".
pub fn parse_exchange_order_type(value: &str) -> (OrderType, bool) {
    let is_margin = !value.starts_with("EXCHANGE");
    let body = value.strip_prefix("EXCHANGE ").unwrap_or(value);
    let order_type = match body {
        "MARKET" => OrderType::Market,
        "STOP LIMIT" => OrderType::StopLimit,
        "STOP" => OrderType::Stop,
        "TRAILING STOP" => OrderType::TrailingStop,
        _ => OrderType::Limit,
    };
    (order_type, is_margin)
}

/// Render the domain order type as the exchange's type string
pub fn exchange_order_type(order_type: OrderType, is_margin: bool) -> String {
    let body = match order_type {
        OrderType::Market => "MARKET",
        OrderType::Limit => "LIMIT",
        OrderType::Stop => "STOP",
        OrderType::StopLimit => "STOP LIMIT",
        OrderType::TrailingStop => "TRAILING STOP",
    };
    if is_margin {
        body.to_string()
    } else {
        format!("EXCHANGE {body}")
    }
}
