//! FIX order requests -> exchange commands
//!
//! Every handler follows the same shape: validate the FIX request, consult
//! the per-peer order cache, then hand a typed command to the exchange
//! transport. Requests that fail validation or cannot be resolved locally
//! are answered with a synthetic reject and never reach the exchange. The
//! order is cached *before* the submit is sent so an acknowledgement racing
//! the submit call always finds it.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rust_decimal::Decimal;

use iris_core::{OrderFlags, OrderStatus, OrderType, Side, TimeInForce};

use crate::cache::{CachedCancel, NewOrder};
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::messages::exchange::{
    OrderCommand, OrderPayload, ReplacePayload, exchange_order_type,
};
use crate::messages::fix::{
    CxlRejReason, CxlRejResponseTo, ExecType, FixMessage, MsgType, ORDER_ID_NONE, custom_tags,
    ord_status_char, ord_type_from_char, side_from_char, tags, tif_from_char, utc_timestamp_now,
};
use crate::peer::Peer;
use crate::symbology::resolve_to_exchange;
use crate::translate::{ReportExtras, cancel_reject, exec_report, synthetic_reject};

/// Validated NewOrderSingle fields
struct ParsedOrder {
    symbol: String,
    account: String,
    side: Side,
    order_type: OrderType,
    qty: Decimal,
    price: Decimal,
    stop_price: Decimal,
    trail_offset: Decimal,
    tif: TimeInForce,
    tif_expiration: Option<DateTime<Utc>>,
    flags: OrderFlags,
    leverage: Option<u32>,
}

fn parse_new_order(message: &FixMessage) -> Result<ParsedOrder, String> {
    let fields = &message.fields;
    let symbol = fields
        .get_str(tags::SYMBOL)
        .map_err(|_| "Symbol required".to_string())?
        .to_string();
    let side = fields
        .get_char(tags::SIDE)
        .ok()
        .and_then(side_from_char)
        .ok_or_else(|| "Side must be buy or sell".to_string())?;
    let order_type = fields
        .get_char(tags::ORD_TYPE)
        .ok()
        .and_then(ord_type_from_char)
        .ok_or_else(|| "Unsupported order type".to_string())?;
    let qty = fields
        .get_decimal(tags::ORDER_QTY)
        .map_err(|_| "OrderQty required".to_string())?;
    if qty <= Decimal::ZERO {
        return Err("OrderQty must be positive".to_string());
    }

    let price = match fields.get_decimal_opt(tags::PRICE) {
        Ok(price) => price,
        Err(e) => return Err(e.to_string()),
    };
    if order_type.requires_price() && price.is_none() {
        return Err(format!("Price required for {order_type:?} order"));
    }
    let stop_price = match fields.get_decimal_opt(tags::STOP_PX) {
        Ok(stop) => stop,
        Err(e) => return Err(e.to_string()),
    };
    if order_type.requires_stop_price() && stop_price.is_none() {
        return Err(format!("StopPx required for {order_type:?} order"));
    }
    let trail_offset = match fields.get_decimal_opt(tags::PEG_OFFSET_VALUE) {
        Ok(offset) => offset,
        Err(e) => return Err(e.to_string()),
    };
    if order_type.requires_trail_offset() && trail_offset.is_none() {
        return Err("PegOffsetValue required for trailing stop".to_string());
    }

    let tif = fields
        .get_char(tags::TIME_IN_FORCE)
        .ok()
        .map_or(Some(TimeInForce::GoodTillCancel), tif_from_char)
        .ok_or_else(|| "Unsupported time in force".to_string())?;
    let tif_expiration = if tif.requires_expiration() {
        Some(
            fields
                .get_utc_timestamp(tags::EXPIRE_TIME)
                .map_err(|_| "ExpireTime required for GTD order".to_string())?,
        )
    } else {
        None
    };

    let mut flags = OrderFlags::NONE;
    if fields
        .get_decimal_opt(tags::MAX_SHOW)
        .ok()
        .flatten()
        .is_some_and(|max_show| max_show.is_zero())
    {
        flags.insert(OrderFlags::HIDDEN);
    }
    if fields
        .get_opt(tags::EXEC_INST)
        .is_some_and(|inst| inst.split(' ').any(|part| part == "6"))
    {
        flags.insert(OrderFlags::POST_ONLY);
    }

    let leverage = fields.get_u32(custom_tags::LEVERAGE).ok().filter(|l| *l > 0);

    Ok(ParsedOrder {
        symbol,
        account: fields.get_opt(tags::ACCOUNT).unwrap_or_default().to_string(),
        side,
        order_type,
        qty,
        price: price.unwrap_or_default(),
        stop_price: stop_price.unwrap_or_default(),
        trail_offset: trail_offset.unwrap_or_default(),
        tif,
        tif_expiration,
        flags,
        leverage,
    })
}

fn signed_amount(side: Side, qty: Decimal) -> Decimal {
    match side {
        Side::Buy => qty,
        Side::Sell => -qty,
    }
}

pub(crate) async fn handle_new_order_single(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    message: &FixMessage,
) -> Result<(), GatewayError> {
    let cl_ord_id = message.fields.get_str(tags::CL_ORD_ID)?.to_string();

    let parsed = match parse_new_order(message) {
        Ok(parsed) => parsed,
        Err(reason) => {
            let symbol = message.fields.get_opt(tags::SYMBOL);
            warn!("Rejecting order {cl_ord_id} on {session_id}: {reason}");
            gateway
                .fix()
                .send(session_id, synthetic_reject(&cl_ord_id, symbol, &reason))?;
            return Ok(());
        }
    };

    let exchange_symbol = resolve_to_exchange(
        gateway.symbology(),
        &parsed.symbol,
        &gateway.config().counterparty,
    );
    let is_margin = parsed.leverage.is_some();
    // ClOrdIDs that are already integers pass through as the exchange client
    // id; anything else gets a generated one.
    let cid = cl_ord_id
        .parse::<i64>()
        .unwrap_or_else(|_| gateway.nonces().next() as i64);

    let view = peer.orders().add_order(NewOrder {
        cl_ord_id: cl_ord_id.clone(),
        symbol: parsed.symbol.clone(),
        account: parsed.account,
        side: parsed.side,
        order_type: parsed.order_type,
        qty: parsed.qty,
        price: parsed.price,
        stop_price: parsed.stop_price,
        trail_offset: parsed.trail_offset,
        is_margin,
        tif: parsed.tif,
        tif_expiration: parsed.tif_expiration,
        flags: parsed.flags,
    });

    let payload = OrderPayload {
        cid,
        symbol: exchange_symbol,
        amount: signed_amount(parsed.side, parsed.qty),
        price: (!parsed.price.is_zero()).then_some(parsed.price),
        stop_price: (!parsed.stop_price.is_zero()).then_some(parsed.stop_price),
        trail_offset: (!parsed.trail_offset.is_zero()).then_some(parsed.trail_offset),
        order_type: exchange_order_type(parsed.order_type, is_margin),
        flags: parsed.flags,
        tif: parsed.tif,
        tif_expiration: parsed.tif_expiration,
        leverage: parsed.leverage,
    };

    debug!("Submitting order {cl_ord_id} (cid {cid}) on {session_id}");
    if let Err(e) = peer.client().send(OrderCommand::Submit(payload)).await {
        warn!("Submit failed for {cl_ord_id}: {e}");
        gateway.fix().send(
            session_id,
            exec_report(
                &view,
                &view.symbol,
                ExecType::Rejected,
                OrderStatus::Rejected,
                ReportExtras {
                    text: Some(e.to_string()),
                    ..Default::default()
                },
            ),
        )?;
    }
    Ok(())
}

pub(crate) async fn handle_cancel_request(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    message: &FixMessage,
) -> Result<(), GatewayError> {
    let cl_ord_id = message.fields.get_str(tags::CL_ORD_ID)?.to_string();
    let orig_cl_ord_id = message
        .fields
        .get_opt(tags::ORIG_CL_ORD_ID)
        .unwrap_or_default()
        .to_string();

    // Exchange order id: taken from tag 37 when the client supplies it,
    // otherwise resolved through the cache by the original ClOrdID.
    let order_id = match message.fields.get_i64(tags::ORDER_ID) {
        Ok(order_id) => Some(order_id),
        Err(_) => peer
            .orders()
            .lookup_by_cl_ord_id(&orig_cl_ord_id)
            .ok()
            .and_then(|view| view.order_id),
    };

    let Some(order_id) = order_id else {
        // Nothing to address the cancel by; reject locally without touching
        // the exchange.
        warn!("Cancel {cl_ord_id} on {session_id} references unknown order {orig_cl_ord_id}");
        gateway.fix().send(
            session_id,
            cancel_reject(
                &cl_ord_id,
                &orig_cl_ord_id,
                ORDER_ID_NONE,
                CxlRejReason::UnknownOrder,
                CxlRejResponseTo::CancelRequest,
                OrderStatus::Rejected,
                Some("Order not found"),
            ),
        )?;
        return Ok(());
    };

    let (symbol, account) = peer
        .orders()
        .lookup_by_cl_ord_id(&orig_cl_ord_id)
        .map(|view| (view.symbol, view.account))
        .unwrap_or_else(|_| {
            (
                message.fields.get_opt(tags::SYMBOL).unwrap_or_default().to_string(),
                message.fields.get_opt(tags::ACCOUNT).unwrap_or_default().to_string(),
            )
        });
    peer.orders().add_cancel(CachedCancel {
        cl_ord_id: cl_ord_id.clone(),
        orig_cl_ord_id: orig_cl_ord_id.clone(),
        symbol,
        account,
    });

    if let Err(e) = peer.client().send(OrderCommand::Cancel { order_id }).await {
        warn!("Cancel send failed for {cl_ord_id}: {e}");
        gateway.fix().send(
            session_id,
            cancel_reject(
                &cl_ord_id,
                &orig_cl_ord_id,
                &order_id.to_string(),
                CxlRejReason::Other,
                CxlRejResponseTo::CancelRequest,
                OrderStatus::Rejected,
                Some(&e.to_string()),
            ),
        )?;
    }
    Ok(())
}

pub(crate) async fn handle_cancel_replace(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    message: &FixMessage,
) -> Result<(), GatewayError> {
    let cl_ord_id = message.fields.get_str(tags::CL_ORD_ID)?.to_string();
    let orig_cl_ord_id = message
        .fields
        .get_opt(tags::ORIG_CL_ORD_ID)
        .unwrap_or_default()
        .to_string();

    let original = match message.fields.get_i64(tags::ORDER_ID) {
        Ok(order_id) => peer.orders().lookup_by_order_id(order_id).ok(),
        Err(_) => peer.orders().lookup_by_cl_ord_id(&orig_cl_ord_id).ok(),
    };
    let Some(original) = original else {
        gateway.fix().send(
            session_id,
            cancel_reject(
                &cl_ord_id,
                &orig_cl_ord_id,
                ORDER_ID_NONE,
                CxlRejReason::UnknownOrder,
                CxlRejResponseTo::CancelReplace,
                OrderStatus::Rejected,
                Some("Order not found"),
            ),
        )?;
        return Ok(());
    };
    let Some(order_id) = original.order_id else {
        // Not yet acknowledged by the exchange; there is no id to address
        // the replace by.
        gateway.fix().send(
            session_id,
            cancel_reject(
                &cl_ord_id,
                &orig_cl_ord_id,
                ORDER_ID_NONE,
                CxlRejReason::TooLateToCancel,
                CxlRejResponseTo::CancelReplace,
                OrderStatus::Rejected,
                Some("Order not yet acknowledged by exchange"),
            ),
        )?;
        return Ok(());
    };

    // Absent fields carry forward from the working order.
    let new_qty = message
        .fields
        .get_decimal_opt(tags::ORDER_QTY)?
        .unwrap_or(original.qty);
    let new_price = message
        .fields
        .get_decimal_opt(tags::PRICE)?
        .unwrap_or(original.price);
    let leverage = message
        .fields
        .get_u32(custom_tags::LEVERAGE)
        .ok()
        .filter(|l| *l > 0);

    // The replacement inherits the exchange order id under its new ClOrdID
    // so subsequent fills and cancels resolve to the new identity.
    peer.orders().add_order(NewOrder {
        cl_ord_id: cl_ord_id.clone(),
        symbol: original.symbol.clone(),
        account: original.account.clone(),
        side: original.side,
        order_type: original.order_type,
        qty: new_qty,
        price: new_price,
        stop_price: original.stop_price,
        trail_offset: original.trail_offset,
        is_margin: original.is_margin,
        tif: original.tif,
        tif_expiration: original.tif_expiration,
        flags: original.flags,
    });
    // The record was inserted one statement ago; losing it here means the
    // cache is corrupt and continuing would misroute fills.
    peer.orders()
        .update_order(&cl_ord_id, order_id)
        .expect("replace target vanished from order cache");

    let payload = ReplacePayload {
        order_id,
        price: Some(new_price),
        amount: Some(signed_amount(original.side, new_qty)),
        leverage,
        flags: None,
    };
    if let Err(e) = peer.client().send(OrderCommand::Update(payload)).await {
        warn!("Replace send failed for {cl_ord_id}: {e}");
        gateway.fix().send(
            session_id,
            cancel_reject(
                &cl_ord_id,
                &orig_cl_ord_id,
                &order_id.to_string(),
                CxlRejReason::Other,
                CxlRejResponseTo::CancelReplace,
                OrderStatus::Rejected,
                Some(&e.to_string()),
            ),
        )?;
    }
    Ok(())
}

pub(crate) fn handle_order_status_request(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    message: &FixMessage,
) -> Result<(), GatewayError> {
    let cl_ord_id = message.fields.get_str(tags::CL_ORD_ID)?.to_string();

    let view = match message.fields.get_i64(tags::ORDER_ID) {
        Ok(order_id) => peer.orders().lookup_by_order_id(order_id).ok(),
        Err(_) => peer.orders().lookup_by_cl_ord_id(&cl_ord_id).ok(),
    };
    match view {
        Some(view) => {
            let status = view.derived_status();
            let symbol = view.symbol.clone();
            gateway.fix().send(
                session_id,
                exec_report(&view, &symbol, ExecType::OrderStatus, status, ReportExtras::default()),
            )?;
        }
        None => {
            let mut report = FixMessage::new(MsgType::ExecutionReport);
            report
                .set(tags::CL_ORD_ID, &cl_ord_id)
                .set(tags::ORDER_ID, ORDER_ID_NONE)
                .set(tags::EXEC_ID, uuid::Uuid::new_v4().to_string())
                .set(tags::EXEC_TYPE, ExecType::OrderStatus.as_char())
                .set(tags::ORD_STATUS, ord_status_char(OrderStatus::Rejected))
                .set(tags::LEAVES_QTY, Decimal::ZERO)
                .set(tags::CUM_QTY, Decimal::ZERO)
                .set(tags::AVG_PX, Decimal::ZERO)
                .set(tags::TEXT, "Order not found")
                .set(tags::TRANSACT_TIME, utc_timestamp_now());
            gateway.fix().send(session_id, report)?;
        }
    }
    Ok(())
}
