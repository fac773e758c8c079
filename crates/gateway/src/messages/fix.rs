//! FIX field-map abstraction and message types
//!
//! The FIX session engine (sequencing, framing, persistence, heartbeats) is
//! an external collaborator. It hands inbound application messages to the
//! gateway as a typed [`FixMessage`] and renders outbound ones onto the wire;
//! this module only models the field map and the tag vocabulary the gateway
//! consumes and produces.

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, NaiveDateTime, Utc};
use iris_core::{OrderStatus, OrderType, Side, TimeInForce};
use rust_decimal::Decimal;
use thiserror::Error;

/// Standard FIX tag numbers consumed or produced by the gateway
pub mod tags {
    pub const ACCOUNT: u32 = 1;
    pub const AVG_PX: u32 = 6;
    pub const CL_ORD_ID: u32 = 11;
    pub const COMMISSION: u32 = 12;
    pub const CUM_QTY: u32 = 14;
    pub const EXEC_ID: u32 = 17;
    pub const EXEC_INST: u32 = 18;
    pub const LAST_PX: u32 = 31;
    pub const LAST_QTY: u32 = 32;
    pub const MSG_TYPE: u32 = 35;
    pub const ORDER_ID: u32 = 37;
    pub const ORDER_QTY: u32 = 38;
    pub const ORD_STATUS: u32 = 39;
    pub const ORD_TYPE: u32 = 40;
    pub const ORIG_CL_ORD_ID: u32 = 41;
    pub const PRICE: u32 = 44;
    pub const SIDE: u32 = 54;
    pub const SYMBOL: u32 = 55;
    pub const TEXT: u32 = 58;
    pub const TIME_IN_FORCE: u32 = 59;
    pub const TRANSACT_TIME: u32 = 60;
    pub const STOP_PX: u32 = 99;
    pub const CXL_REJ_REASON: u32 = 102;
    pub const EXPIRE_TIME: u32 = 126;
    pub const NO_RELATED_SYM: u32 = 146;
    pub const EXEC_TYPE: u32 = 150;
    pub const LEAVES_QTY: u32 = 151;
    pub const MAX_SHOW: u32 = 210;
    pub const PEG_OFFSET_VALUE: u32 = 211;
    pub const MD_REQ_ID: u32 = 262;
    pub const SUBSCRIPTION_REQUEST_TYPE: u32 = 263;
    pub const MARKET_DEPTH: u32 = 264;
    pub const NO_MD_ENTRIES: u32 = 268;
    pub const MD_ENTRY_TYPE: u32 = 269;
    pub const MD_ENTRY_PX: u32 = 270;
    pub const MD_ENTRY_SIZE: u32 = 271;
    pub const MD_UPDATE_ACTION: u32 = 279;
    pub const MD_REQ_REJ_REASON: u32 = 281;
    pub const CXL_REJ_RESPONSE_TO: u32 = 434;
    pub const LONG_QTY: u32 = 704;
    pub const SHORT_QTY: u32 = 705;
    pub const POS_MAINT_RPT_ID: u32 = 721;
    pub const SETTL_PRICE: u32 = 730;
}

/// Custom tags carried on Logon, order and market-data messages
pub mod custom_tags {
    /// Exchange API key (Logon, required)
    pub const API_KEY: u32 = 20000;
    /// Exchange API secret (Logon, required)
    pub const API_SECRET: u32 = 20001;
    /// Exchange user identifier (Logon, required)
    pub const EXCHANGE_USER_ID: u32 = 20002;
    /// Cancel working orders when the session disconnects (Logon, optional)
    pub const CANCEL_ON_DISCONNECT: u32 = 20003;
    /// Requested order-book price precision (Market Data Request, optional)
    pub const BOOK_PRECISION: u32 = 20004;
    /// Integer leverage (New Order Single / Cancel Replace, optional)
    pub const LEVERAGE: u32 = 20005;
}

/// Sentinel OrderID mandated by FIX for rejects that reference no known order
pub const ORDER_ID_NONE: &str = "NONE";

const UTC_TIMESTAMP_FORMATS: [&str; 2] = ["%Y%m%d-%H:%M:%S%.3f", "%Y%m%d-%H:%M:%S"];

/// Field access failures on an inbound FIX message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("Missing required tag {0}")]
    Missing(u32),

    #[error("Cannot parse tag {tag} value {value:?}")]
    Parse { tag: u32, value: String },
}

/// Ordered tag -> value map with typed accessors
///
/// Values are kept in their FIX string form; typed getters parse on access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: BTreeMap<u32, String>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, tag: u32, value: impl Display) -> &mut Self {
        self.fields.insert(tag, value.to_string());
        self
    }

    pub fn has(&self, tag: u32) -> bool {
        self.fields.contains_key(&tag)
    }

    pub fn get_opt(&self, tag: u32) -> Option<&str> {
        self.fields.get(&tag).map(String::as_str)
    }

    pub fn get_str(&self, tag: u32) -> Result<&str, FieldError> {
        self.get_opt(tag).ok_or(FieldError::Missing(tag))
    }

    pub fn get_char(&self, tag: u32) -> Result<char, FieldError> {
        let value = self.get_str(tag)?;
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(FieldError::Parse {
                tag,
                value: value.to_string(),
            }),
        }
    }

    pub fn get_decimal(&self, tag: u32) -> Result<Decimal, FieldError> {
        let value = self.get_str(tag)?;
        value.parse().map_err(|_| FieldError::Parse {
            tag,
            value: value.to_string(),
        })
    }

    /// Optional decimal: absent tags are `None`, unparseable values are errors
    pub fn get_decimal_opt(&self, tag: u32) -> Result<Option<Decimal>, FieldError> {
        match self.get_opt(tag) {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| FieldError::Parse {
                    tag,
                    value: value.to_string(),
                }),
        }
    }

    pub fn get_i64(&self, tag: u32) -> Result<i64, FieldError> {
        let value = self.get_str(tag)?;
        value.parse().map_err(|_| FieldError::Parse {
            tag,
            value: value.to_string(),
        })
    }

    pub fn get_u32(&self, tag: u32) -> Result<u32, FieldError> {
        let value = self.get_str(tag)?;
        value.parse().map_err(|_| FieldError::Parse {
            tag,
            value: value.to_string(),
        })
    }

    /// FIX boolean: "Y" / "N"
    pub fn get_bool(&self, tag: u32) -> Result<bool, FieldError> {
        match self.get_str(tag)? {
            "Y" => Ok(true),
            "N" => Ok(false),
            other => Err(FieldError::Parse {
                tag,
                value: other.to_string(),
            }),
        }
    }

    /// FIX UTCTimestamp, with or without milliseconds
    pub fn get_utc_timestamp(&self, tag: u32) -> Result<DateTime<Utc>, FieldError> {
        let value = self.get_str(tag)?;
        for format in UTC_TIMESTAMP_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return Ok(naive.and_utc());
            }
        }
        Err(FieldError::Parse {
            tag,
            value: value.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &str)> {
        self.fields.iter().map(|(tag, value)| (tag, value.as_str()))
    }
}

/// FIX message types the gateway consumes and produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    Logon,
    Logout,
    NewOrderSingle,
    OrderCancelRequest,
    OrderCancelReplaceRequest,
    OrderStatusRequest,
    MarketDataRequest,
    ExecutionReport,
    OrderCancelReject,
    MarketDataSnapshotFullRefresh,
    MarketDataIncrementalRefresh,
    MarketDataRequestReject,
    PositionReport,
}

impl MsgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logon => "A",
            Self::Logout => "5",
            Self::NewOrderSingle => "D",
            Self::OrderCancelRequest => "F",
            Self::OrderCancelReplaceRequest => "G",
            Self::OrderStatusRequest => "H",
            Self::MarketDataRequest => "V",
            Self::ExecutionReport => "8",
            Self::OrderCancelReject => "9",
            Self::MarketDataSnapshotFullRefresh => "W",
            Self::MarketDataIncrementalRefresh => "X",
            Self::MarketDataRequestReject => "Y",
            Self::PositionReport => "AP",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "A" => Some(Self::Logon),
            "5" => Some(Self::Logout),
            "D" => Some(Self::NewOrderSingle),
            "F" => Some(Self::OrderCancelRequest),
            "G" => Some(Self::OrderCancelReplaceRequest),
            "H" => Some(Self::OrderStatusRequest),
            "V" => Some(Self::MarketDataRequest),
            "8" => Some(Self::ExecutionReport),
            "9" => Some(Self::OrderCancelReject),
            "W" => Some(Self::MarketDataSnapshotFullRefresh),
            "X" => Some(Self::MarketDataIncrementalRefresh),
            "Y" => Some(Self::MarketDataRequestReject),
            "AP" => Some(Self::PositionReport),
            _ => None,
        }
    }
}

/// One FIX message: a type, a flat field map and optional repeating-group
/// entries (market-data messages carry their NoMDEntries group here; the
/// external engine renders the group onto the wire)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixMessage {
    pub msg_type: MsgType,
    pub fields: FieldMap,
    pub groups: Vec<FieldMap>,
}

impl FixMessage {
    pub fn new(msg_type: MsgType) -> Self {
        Self {
            msg_type,
            fields: FieldMap::new(),
            groups: Vec::new(),
        }
    }

    pub fn set(&mut self, tag: u32, value: impl Display) -> &mut Self {
        self.fields.set(tag, value);
        self
    }

    pub fn push_group(&mut self, entry: FieldMap) -> &mut Self {
        self.groups.push(entry);
        self
    }
}

/// ExecType (tag 150) values produced by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecType {
    New,
    PartialFill,
    Fill,
    Canceled,
    PendingCancel,
    Rejected,
    OrderStatus,
    Expired,
}

impl ExecType {
    pub fn as_char(&self) -> char {
        match self {
            Self::New => '0',
            Self::PartialFill => '1',
            Self::Fill => '2',
            Self::Canceled => '4',
            Self::PendingCancel => '6',
            Self::Rejected => '8',
            Self::OrderStatus => 'I',
            Self::Expired => 'C',
        }
    }
}

/// CxlRejReason (tag 102) values produced by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CxlRejReason {
    TooLateToCancel,
    UnknownOrder,
    Other,
}

impl CxlRejReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TooLateToCancel => "0",
            Self::UnknownOrder => "1",
            Self::Other => "99",
        }
    }
}

/// CxlRejResponseTo (tag 434) values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CxlRejResponseTo {
    CancelRequest,
    CancelReplace,
}

impl CxlRejResponseTo {
    pub fn as_char(&self) -> char {
        match self {
            Self::CancelRequest => '1',
            Self::CancelReplace => '2',
        }
    }
}

/// MDReqRejReason (tag 281) categories produced by the multiplexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MdRejReason {
    UnknownSymbol,
    DuplicateMdReqId,
    UnsupportedSubscriptionType,
}

impl MdRejReason {
    pub fn as_char(&self) -> char {
        match self {
            Self::UnknownSymbol => '0',
            Self::DuplicateMdReqId => '1',
            Self::UnsupportedSubscriptionType => '4',
        }
    }
}

/// SubscriptionRequestType (tag 263) values consumed on Market Data Requests
pub const SUBSCRIPTION_SNAPSHOT: char = '0';
pub const SUBSCRIPTION_SNAPSHOT_PLUS_UPDATES: char = '1';
pub const SUBSCRIPTION_DISABLE: char = '2';

pub fn side_to_char(side: Side) -> char {
    match side {
        Side::Buy => '1',
        Side::Sell => '2',
    }
}

pub fn side_from_char(c: char) -> Option<Side> {
    match c {
        '1' => Some(Side::Buy),
        '2' => Some(Side::Sell),
        _ => None,
    }
}

pub fn ord_type_to_char(order_type: OrderType) -> char {
    match order_type {
        OrderType::Market => '1',
        OrderType::Limit => '2',
        OrderType::Stop => '3',
        OrderType::StopLimit => '4',
        OrderType::TrailingStop => 'P',
    }
}

pub fn ord_type_from_char(c: char) -> Option<OrderType> {
    match c {
        '1' => Some(OrderType::Market),
        '2' => Some(OrderType::Limit),
        '3' => Some(OrderType::Stop),
        '4' => Some(OrderType::StopLimit),
        'P' => Some(OrderType::TrailingStop),
        _ => None,
    }
}

pub fn tif_to_char(tif: TimeInForce) -> char {
    match tif {
        TimeInForce::Day => '0',
        TimeInForce::GoodTillCancel => '1',
        TimeInForce::ImmediateOrCancel => '3',
        TimeInForce::FillOrKill => '4',
        TimeInForce::GoodTillDate => '6',
    }
}

pub fn tif_from_char(c: char) -> Option<TimeInForce> {
    match c {
        '0' => Some(TimeInForce::Day),
        '1' => Some(TimeInForce::GoodTillCancel),
        '3' => Some(TimeInForce::ImmediateOrCancel),
        '4' => Some(TimeInForce::FillOrKill),
        '6' => Some(TimeInForce::GoodTillDate),
        _ => None,
    }
}

pub fn ord_status_char(status: OrderStatus) -> char {
    match status {
        OrderStatus::New => '0',
        OrderStatus::PartiallyFilled => '1',
        OrderStatus::Filled => '2',
        OrderStatus::Canceled => '4',
        OrderStatus::Rejected => '8',
        OrderStatus::Expired => 'C',
    }
}

/// Current time in FIX UTCTimestamp form (millisecond precision)
pub fn utc_timestamp_now() -> String {
    Utc::now().format("%Y%m%d-%H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_typed_getters() {
        let mut map = FieldMap::new();
        map.set(tags::CL_ORD_ID, "555");
        map.set(tags::PRICE, "12000.5");
        map.set(tags::SIDE, "1");
        map.set(custom_tags::CANCEL_ON_DISCONNECT, "Y");

        assert_eq!(map.get_str(tags::CL_ORD_ID).unwrap(), "555");
        assert_eq!(map.get_i64(tags::CL_ORD_ID).unwrap(), 555);
        assert_eq!(map.get_decimal(tags::PRICE).unwrap(), dec!(12000.5));
        assert_eq!(map.get_char(tags::SIDE).unwrap(), '1');
        assert!(map.get_bool(custom_tags::CANCEL_ON_DISCONNECT).unwrap());
    }

    #[test]
    fn test_missing_and_parse_errors() {
        let mut map = FieldMap::new();
        map.set(tags::ORDER_QTY, "not-a-number");

        assert_eq!(
            map.get_str(tags::SYMBOL).unwrap_err(),
            FieldError::Missing(tags::SYMBOL)
        );
        assert!(matches!(
            map.get_decimal(tags::ORDER_QTY).unwrap_err(),
            FieldError::Parse { tag, .. } if tag == tags::ORDER_QTY
        ));
    }

    #[test]
    fn test_optional_decimal() {
        let mut map = FieldMap::new();
        map.set(tags::STOP_PX, "105.25");

        assert_eq!(map.get_decimal_opt(tags::PRICE).unwrap(), None);
        assert_eq!(
            map.get_decimal_opt(tags::STOP_PX).unwrap(),
            Some(dec!(105.25))
        );
    }

    #[test]
    fn test_utc_timestamp_both_precisions() {
        let mut map = FieldMap::new();
        map.set(tags::EXPIRE_TIME, "20260827-15:30:00");
        assert!(map.get_utc_timestamp(tags::EXPIRE_TIME).is_ok());

        map.set(tags::EXPIRE_TIME, "20260827-15:30:00.123");
        assert!(map.get_utc_timestamp(tags::EXPIRE_TIME).is_ok());
    }

    #[test]
    fn test_msg_type_round_trip() {
        for msg_type in [
            MsgType::Logon,
            MsgType::NewOrderSingle,
            MsgType::ExecutionReport,
            MsgType::PositionReport,
        ] {
            assert_eq!(MsgType::from_wire(msg_type.as_str()), Some(msg_type));
        }
        assert_eq!(MsgType::from_wire("ZZ"), None);
    }
}
