//! Exchange events -> FIX messages
//!
//! All report fields are read back from the order cache. When an event
//! references an order the cache has never seen (gateway restart, order
//! placed out of band) the handler reconstructs a cache entry from the
//! event's own fields before reporting, falling back to a REST-style query
//! for trade executions.

use log::{debug, error, info, warn};
use rust_decimal::Decimal;

use iris_core::{Execution, OrderFlags, OrderStatus, TimeInForce};

use crate::cache::{NewOrder, OrderView};
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::messages::exchange::{
    Notification, NotificationKind, NotificationStatus, OrderState, PositionState, TradeFill,
    Wallet, classify_status, parse_exchange_order_type,
};
use crate::messages::fix::{
    CxlRejReason, CxlRejResponseTo, ExecType, ORDER_ID_NONE, tags,
};
use crate::peer::Peer;
use crate::symbology::resolve_from_exchange;
use crate::translate::{
    ReportExtras, cancel_reject, exec_report, position_report, synthetic_reject,
};

fn peer_account(peer: &Peer) -> String {
    peer.user_id().unwrap_or_default()
}

/// Find the cached order for an exchange-reported state, reconstructing the
/// entry from the event's fields when the cache has never seen it
fn ensure_cached(
    gateway: &Gateway,
    peer: &Peer,
    state: &OrderState,
) -> Result<OrderView, GatewayError> {
    if let Ok(view) = peer.orders().lookup_by_order_id(state.order_id) {
        return Ok(view);
    }
    // ClOrdIDs round-trip through the exchange client id when numeric; an
    // order the gateway never submitted keys under its exchange id.
    let cl_ord_id = state
        .cid
        .map_or_else(|| state.order_id.to_string(), |cid| cid.to_string());
    if let Ok(view) = peer.orders().lookup_by_cl_ord_id(&cl_ord_id) {
        if view.order_id.is_none() {
            return Ok(peer.orders().update_order(&cl_ord_id, state.order_id)?);
        }
        return Ok(view);
    }

    info!(
        "Repopulating cache for order {} (ClOrdID {cl_ord_id})",
        state.order_id
    );
    let symbol = resolve_from_exchange(
        gateway.symbology(),
        &state.symbol,
        &gateway.config().counterparty,
    );
    let (order_type, is_margin) = parse_exchange_order_type(&state.order_type);
    let side = if state.amount_orig.is_sign_negative() {
        iris_core::Side::Sell
    } else {
        iris_core::Side::Buy
    };
    peer.orders().add_order(NewOrder {
        cl_ord_id: cl_ord_id.clone(),
        symbol,
        account: peer_account(peer),
        side,
        order_type,
        qty: state.amount_orig.abs(),
        price: state.price,
        stop_price: Decimal::ZERO,
        trail_offset: Decimal::ZERO,
        is_margin,
        tif: TimeInForce::GoodTillCancel,
        tif_expiration: None,
        flags: state.flags.map_or(OrderFlags::NONE, OrderFlags::new),
    });
    Ok(peer.orders().update_order(&cl_ord_id, state.order_id)?)
}

pub(crate) fn on_notification(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    notification: &Notification,
) -> Result<(), GatewayError> {
    match (notification.kind, notification.status) {
        (NotificationKind::OrderNew, NotificationStatus::Success) => {
            order_accepted(gateway, peer, session_id, &notification.order)
        }
        (NotificationKind::OrderNew, NotificationStatus::Error) => {
            order_submit_rejected(gateway, peer, session_id, notification)
        }
        (NotificationKind::OrderCancel, NotificationStatus::Success) => {
            cancel_acknowledged(gateway, peer, session_id, &notification.order)
        }
        (NotificationKind::OrderCancel, NotificationStatus::Error) => cancel_rejected(
            gateway,
            peer,
            session_id,
            notification,
            CxlRejResponseTo::CancelRequest,
        ),
        (NotificationKind::OrderUpdate, NotificationStatus::Error) => cancel_rejected(
            gateway,
            peer,
            session_id,
            notification,
            CxlRejResponseTo::CancelReplace,
        ),
        (kind, status) => {
            debug!("Ignoring notification {kind:?}/{status:?}: {}", notification.text);
            Ok(())
        }
    }
}

/// Exchange accepted the submit: bind the exchange order id and report New
fn order_accepted(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    state: &OrderState,
) -> Result<(), GatewayError> {
    let view = ensure_cached(gateway, peer, state)?;
    let view = peer.orders().update_order(&view.cl_ord_id, state.order_id)?;
    let symbol = view.symbol.clone();
    gateway.fix().send(
        session_id,
        exec_report(
            &view,
            &symbol,
            ExecType::New,
            OrderStatus::New,
            ReportExtras::default(),
        ),
    )?;
    Ok(())
}

/// Exchange refused the submit: Rejected report carrying the exchange text
fn order_submit_rejected(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    notification: &Notification,
) -> Result<(), GatewayError> {
    let state = &notification.order;
    let cl_ord_id = state
        .cid
        .map_or_else(|| state.order_id.to_string(), |cid| cid.to_string());
    warn!("Order {cl_ord_id} rejected by exchange: {}", notification.text);
    let message = match peer.orders().lookup_by_cl_ord_id(&cl_ord_id) {
        Ok(view) => {
            let symbol = view.symbol.clone();
            exec_report(
                &view,
                &symbol,
                ExecType::Rejected,
                OrderStatus::Rejected,
                ReportExtras {
                    text: Some(notification.text.clone()),
                    ..Default::default()
                },
            )
        }
        Err(_) => {
            let symbol = resolve_from_exchange(
                gateway.symbology(),
                &state.symbol,
                &gateway.config().counterparty,
            );
            synthetic_reject(&cl_ord_id, Some(&symbol), &notification.text)
        }
    };
    gateway.fix().send(session_id, message)?;
    Ok(())
}

/// Exchange accepted the cancel request: PendingCancel under the cancel's
/// own ClOrdID, with the original's identity in OrigClOrdID
fn cancel_acknowledged(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    state: &OrderState,
) -> Result<(), GatewayError> {
    let view = ensure_cached(gateway, peer, state)?;
    let symbol = view.symbol.clone();
    let mut report = exec_report(
        &view,
        &symbol,
        ExecType::PendingCancel,
        view.derived_status(),
        ReportExtras::default(),
    );
    if let Ok(cancel) = peer.orders().lookup_cancel_by_orig_cl_ord_id(&view.cl_ord_id) {
        report.set(tags::CL_ORD_ID, &cancel.cl_ord_id);
        report.set(tags::ORIG_CL_ORD_ID, &view.cl_ord_id);
    }
    gateway.fix().send(session_id, report)?;
    Ok(())
}

/// Exchange refused a cancel or replace: OrderCancelReject.
///
/// An unknown-order refusal reports OrderID "NONE"; the exchange id the
/// client referenced does not correspond to anything.
fn cancel_rejected(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    notification: &Notification,
    response_to: CxlRejResponseTo,
) -> Result<(), GatewayError> {
    let state = &notification.order;
    let orig_cl_ord_id = peer
        .orders()
        .lookup_by_order_id(state.order_id)
        .map(|view| view.cl_ord_id)
        .unwrap_or_else(|_| {
            state
                .cid
                .map_or_else(|| state.order_id.to_string(), |cid| cid.to_string())
        });
    let cl_ord_id = peer
        .orders()
        .lookup_cancel_by_orig_cl_ord_id(&orig_cl_ord_id)
        .map(|cancel| cancel.cl_ord_id)
        .unwrap_or_else(|_| orig_cl_ord_id.clone());

    let unknown = notification.text.contains("Order not found");
    let (reason, order_id) = if unknown {
        (CxlRejReason::UnknownOrder, ORDER_ID_NONE.to_string())
    } else {
        (CxlRejReason::Other, state.order_id.to_string())
    };
    warn!(
        "Cancel/replace rejected for {orig_cl_ord_id}: {}",
        notification.text
    );
    gateway.fix().send(
        session_id,
        cancel_reject(
            &cl_ord_id,
            &orig_cl_ord_id,
            &order_id,
            reason,
            response_to,
            OrderStatus::Rejected,
            Some(&notification.text),
        ),
    )?;
    Ok(())
}

/// Live order stream acknowledgement ("order new" event)
pub(crate) fn on_order_new(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    state: &OrderState,
) -> Result<(), GatewayError> {
    order_accepted(gateway, peer, session_id, state)
}

/// Terminal cancel confirmation.
///
/// Suppressed when the event's composite status classifies as filled or
/// partially filled: the trade-execution event carries the authoritative
/// fill information and a trailing report here would double-report it.
pub(crate) fn on_order_canceled(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    state: &OrderState,
) -> Result<(), GatewayError> {
    let view = ensure_cached(gateway, peer, state)?;
    if classify_status(&state.status).has_fills() {
        debug!(
            "Suppressing canceled report for {} ({})",
            view.cl_ord_id, state.status
        );
        return Ok(());
    }
    let symbol = view.symbol.clone();
    let mut report = exec_report(
        &view,
        &symbol,
        ExecType::Canceled,
        OrderStatus::Canceled,
        ReportExtras::default(),
    );
    if let Ok(cancel) = peer.orders().lookup_cancel_by_orig_cl_ord_id(&view.cl_ord_id) {
        report.set(tags::CL_ORD_ID, &cancel.cl_ord_id);
        report.set(tags::ORIG_CL_ORD_ID, &view.cl_ord_id);
    }
    gateway.fix().send(session_id, report)?;
    Ok(())
}

/// Working-order update: fold new price/quantity into the cache, then
/// report according to the composite status
pub(crate) fn on_order_updated(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    state: &OrderState,
) -> Result<(), GatewayError> {
    ensure_cached(gateway, peer, state)?;
    let view = peer.orders().apply_update(
        state.order_id,
        Some(state.price),
        Some(state.amount_orig),
    )?;
    match classify_status(&state.status) {
        OrderStatus::Canceled => on_order_canceled(gateway, peer, session_id, state),
        OrderStatus::Filled | OrderStatus::PartiallyFilled => {
            // Fill reporting is driven by trade executions, which carry the
            // per-fill price and quantity this event lacks.
            debug!("Skipping fill-status update for {}", view.cl_ord_id);
            Ok(())
        }
        _ => {
            let symbol = view.symbol.clone();
            gateway.fix().send(
                session_id,
                exec_report(
                    &view,
                    &symbol,
                    ExecType::New,
                    view.derived_status(),
                    ReportExtras::default(),
                ),
            )?;
            Ok(())
        }
    }
}

/// Working-orders snapshot after authentication: repopulate the cache so
/// status requests and later events resolve, without emitting reports.
/// Fill history is rebuilt from the trade-history query; execution-id
/// dedupe makes replays harmless.
pub(crate) async fn on_order_snapshot(
    gateway: &Gateway,
    peer: &Peer,
    orders: &[OrderState],
) -> Result<(), GatewayError> {
    for state in orders {
        ensure_cached(gateway, peer, state)?;
        match peer.query().order_trades(&state.symbol, state.order_id).await {
            Ok(fills) => {
                for fill in fills {
                    let execution =
                        Execution::new(fill.exec_id, fill.exec_price, fill.exec_amount.abs());
                    if let Err(e) = peer.orders().add_execution(state.order_id, execution) {
                        warn!("Skipping historical fill for {}: {e}", state.order_id);
                    }
                }
            }
            Err(e) => debug!("No trade history for {}: {e}", state.order_id),
        }
    }
    info!("Repopulated {} working orders", orders.len());
    Ok(())
}

/// One fill: append to the order's executions and report the aggregates
pub(crate) async fn on_trade_execution(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    fill: &TradeFill,
) -> Result<(), GatewayError> {
    if peer.orders().lookup_by_order_id(fill.order_id).is_err() {
        // Unknown order id: ask the exchange for the order before giving up.
        match peer.query().order_status(fill.order_id).await {
            Ok(state) => {
                ensure_cached(gateway, peer, &state)?;
            }
            Err(e) => {
                error!(
                    "Dropping execution {} for unknown order {}: {e}",
                    fill.exec_id, fill.order_id
                );
                return Ok(());
            }
        }
    }

    let execution = Execution::new(fill.exec_id, fill.exec_price, fill.exec_amount.abs());
    let (filled_qty, _, view) = peer.orders().add_execution(fill.order_id, execution)?;
    let (exec_type, status) = if !view.qty.is_zero() && filled_qty >= view.qty {
        (ExecType::Fill, OrderStatus::Filled)
    } else {
        (ExecType::PartialFill, OrderStatus::PartiallyFilled)
    };
    let symbol = view.symbol.clone();
    gateway.fix().send(
        session_id,
        exec_report(
            &view,
            &symbol,
            exec_type,
            status,
            ReportExtras {
                exec_id: Some(fill.exec_id.to_string()),
                last_px: Some(fill.exec_price),
                last_qty: Some(fill.exec_amount.abs()),
                commission: fill.fee,
                text: None,
            },
        ),
    )?;
    Ok(())
}

pub(crate) fn on_wallet(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    wallet: &Wallet,
) -> Result<(), GatewayError> {
    gateway.fix().send(
        session_id,
        position_report(&peer_account(peer), &wallet.currency, wallet.balance, None),
    )?;
    Ok(())
}

pub(crate) fn on_position(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    position: &PositionState,
) -> Result<(), GatewayError> {
    let symbol = resolve_from_exchange(
        gateway.symbology(),
        &position.symbol,
        &gateway.config().counterparty,
    );
    gateway.fix().send(
        session_id,
        position_report(
            &peer_account(peer),
            &symbol,
            position.amount,
            Some(position.base_price),
        ),
    )?;
    Ok(())
}
