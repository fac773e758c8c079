//! FIX <-> exchange translation
//!
//! - `outbound`: FIX order requests -> exchange commands
//! - `inbound`: exchange events -> FIX execution reports / rejects
//! - `market_data`: Market Data Request handling and stream translation
//!
//! This module holds the shared FIX message builders. Every field that
//! describes an order (price, quantity, flags, time-in-force) is taken from
//! the cached [`OrderView`], never recomputed from the triggering event.

pub(crate) mod inbound;
pub(crate) mod market_data;
pub(crate) mod outbound;

use iris_core::OrderStatus;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::cache::OrderView;
use crate::messages::fix::{
    CxlRejReason, CxlRejResponseTo, ExecType, FixMessage, MdRejReason, MsgType, ORDER_ID_NONE,
    ord_status_char, ord_type_to_char, side_to_char, tags, tif_to_char, utc_timestamp_now,
};

/// Per-report fields not derivable from the cached order
#[derive(Debug, Default)]
pub(crate) struct ReportExtras {
    pub exec_id: Option<String>,
    pub last_px: Option<Decimal>,
    pub last_qty: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub text: Option<String>,
}

/// Build an ExecutionReport from a cached order snapshot.
///
/// `display_symbol` is the counterparty-side symbol, already translated.
pub(crate) fn exec_report(
    view: &OrderView,
    display_symbol: &str,
    exec_type: ExecType,
    ord_status: OrderStatus,
    extras: ReportExtras,
) -> FixMessage {
    let mut message = FixMessage::new(MsgType::ExecutionReport);
    message
        .set(tags::CL_ORD_ID, &view.cl_ord_id)
        .set(
            tags::ORDER_ID,
            view.order_id
                .map_or_else(|| ORDER_ID_NONE.to_string(), |id| id.to_string()),
        )
        .set(
            tags::EXEC_ID,
            extras
                .exec_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        )
        .set(tags::SYMBOL, display_symbol)
        .set(tags::ACCOUNT, &view.account)
        .set(tags::SIDE, side_to_char(view.side))
        .set(tags::ORD_TYPE, ord_type_to_char(view.order_type))
        .set(tags::ORDER_QTY, view.qty)
        .set(tags::TIME_IN_FORCE, tif_to_char(view.tif))
        .set(tags::EXEC_TYPE, exec_type.as_char())
        .set(tags::ORD_STATUS, ord_status_char(ord_status))
        .set(tags::CUM_QTY, view.filled_qty)
        .set(tags::AVG_PX, view.avg_px)
        .set(tags::TRANSACT_TIME, utc_timestamp_now());
    let leaves = if ord_status.is_terminal() {
        Decimal::ZERO
    } else {
        view.leaves_qty()
    };
    message.set(tags::LEAVES_QTY, leaves);
    if view.order_type.requires_price() {
        message.set(tags::PRICE, view.price);
    }
    if view.order_type.requires_stop_price() {
        message.set(tags::STOP_PX, view.stop_price);
    }
    if view.order_type.requires_trail_offset() {
        message.set(tags::PEG_OFFSET_VALUE, view.trail_offset);
    }
    if let Some(expiration) = view.tif_expiration {
        message.set(
            tags::EXPIRE_TIME,
            expiration.format("%Y%m%d-%H:%M:%S%.3f"),
        );
    }
    if let Some(last_px) = extras.last_px {
        message.set(tags::LAST_PX, last_px);
    }
    if let Some(last_qty) = extras.last_qty {
        message.set(tags::LAST_QTY, last_qty);
    }
    if let Some(commission) = extras.commission {
        message.set(tags::COMMISSION, commission);
    }
    if let Some(text) = extras.text {
        message.set(tags::TEXT, text);
    }
    message
}

/// Rejection report for a request that never reached the exchange
pub(crate) fn synthetic_reject(cl_ord_id: &str, symbol: Option<&str>, text: &str) -> FixMessage {
    let mut message = FixMessage::new(MsgType::ExecutionReport);
    message
        .set(tags::CL_ORD_ID, cl_ord_id)
        .set(tags::ORDER_ID, ORDER_ID_NONE)
        .set(tags::EXEC_ID, Uuid::new_v4().to_string())
        .set(tags::EXEC_TYPE, ExecType::Rejected.as_char())
        .set(tags::ORD_STATUS, ord_status_char(OrderStatus::Rejected))
        .set(tags::LEAVES_QTY, Decimal::ZERO)
        .set(tags::CUM_QTY, Decimal::ZERO)
        .set(tags::AVG_PX, Decimal::ZERO)
        .set(tags::TEXT, text)
        .set(tags::TRANSACT_TIME, utc_timestamp_now());
    if let Some(symbol) = symbol {
        message.set(tags::SYMBOL, symbol);
    }
    message
}

/// OrderCancelReject (35=9)
pub(crate) fn cancel_reject(
    cl_ord_id: &str,
    orig_cl_ord_id: &str,
    order_id: &str,
    reason: CxlRejReason,
    response_to: CxlRejResponseTo,
    ord_status: OrderStatus,
    text: Option<&str>,
) -> FixMessage {
    let mut message = FixMessage::new(MsgType::OrderCancelReject);
    message
        .set(tags::CL_ORD_ID, cl_ord_id)
        .set(tags::ORIG_CL_ORD_ID, orig_cl_ord_id)
        .set(tags::ORDER_ID, order_id)
        .set(tags::CXL_REJ_REASON, reason.as_str())
        .set(tags::CXL_REJ_RESPONSE_TO, response_to.as_char())
        .set(tags::ORD_STATUS, ord_status_char(ord_status))
        .set(tags::TRANSACT_TIME, utc_timestamp_now());
    if let Some(text) = text {
        message.set(tags::TEXT, text);
    }
    message
}

/// MarketDataRequestReject (35=Y)
pub(crate) fn md_reject(md_req_id: &str, reason: MdRejReason, text: &str) -> FixMessage {
    let mut message = FixMessage::new(MsgType::MarketDataRequestReject);
    message
        .set(tags::MD_REQ_ID, md_req_id)
        .set(tags::MD_REQ_REJ_REASON, reason.as_char())
        .set(tags::TEXT, text);
    message
}

/// Logout (35=5) with a reason text
pub(crate) fn logout(text: &str) -> FixMessage {
    let mut message = FixMessage::new(MsgType::Logout);
    message.set(tags::TEXT, text);
    message
}

/// PositionReport (35=AP) carrying a signed position or wallet balance
pub(crate) fn position_report(
    account: &str,
    symbol: &str,
    amount: Decimal,
    settl_price: Option<Decimal>,
) -> FixMessage {
    let mut message = FixMessage::new(MsgType::PositionReport);
    message
        .set(tags::POS_MAINT_RPT_ID, Uuid::new_v4().to_string())
        .set(tags::ACCOUNT, account)
        .set(tags::SYMBOL, symbol);
    if amount.is_sign_negative() {
        message.set(tags::SHORT_QTY, amount.abs());
    } else {
        message.set(tags::LONG_QTY, amount);
    }
    if let Some(settl_price) = settl_price {
        message.set(tags::SETTL_PRICE, settl_price);
    }
    message
}
