//! Exchange event dispatch loop
//!
//! Single consumer of the shared peer-event queue. Events dequeue in
//! arrival order per peer and each one resolves its peer fresh; a session
//! torn down mid-flight drops its remaining events here rather than racing
//! a dead FIX session. Handler errors are logged and never stop the loop.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::messages::exchange::ExchangeEvent;
use crate::peer::{Peer, PeerEvent};
use crate::translate::{inbound, market_data};

/// Drain the queue until every sender (peer forwarder) is gone
pub async fn run_dispatch(gateway: Arc<Gateway>, mut events: mpsc::Receiver<PeerEvent>) {
    info!("Dispatch loop started");
    while let Some(PeerEvent { session_id, event }) = events.recv().await {
        let Some(peer) = gateway.find_peer(&session_id) else {
            debug!("Dropping event for departed session {session_id}");
            continue;
        };
        if let Err(e) = handle_event(&gateway, &peer, &session_id, event).await {
            error!("Dispatch error on {session_id}: {e}");
        }
    }
    info!("Dispatch loop stopped");
}

async fn handle_event(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    event: ExchangeEvent,
) -> Result<(), GatewayError> {
    match event {
        ExchangeEvent::Notification(notification) => {
            inbound::on_notification(gateway, peer, session_id, &notification)
        }
        ExchangeEvent::OrderNew(state) => inbound::on_order_new(gateway, peer, session_id, &state),
        ExchangeEvent::OrderCancel(state) => {
            inbound::on_order_canceled(gateway, peer, session_id, &state)
        }
        ExchangeEvent::OrderUpdate(state) => {
            inbound::on_order_updated(gateway, peer, session_id, &state)
        }
        ExchangeEvent::OrderSnapshot(orders) => {
            inbound::on_order_snapshot(gateway, peer, &orders).await
        }
        ExchangeEvent::TradeExecution(fill) => {
            inbound::on_trade_execution(gateway, peer, session_id, &fill).await
        }
        ExchangeEvent::BookSnapshot {
            sub_id,
            symbol,
            levels,
        } => market_data::on_book_snapshot(gateway, peer, session_id, sub_id, &symbol, &levels),
        ExchangeEvent::BookUpdate {
            sub_id,
            symbol,
            level,
        } => market_data::on_book_update(gateway, peer, session_id, sub_id, &symbol, &level),
        ExchangeEvent::Trade {
            sub_id,
            symbol,
            trade,
        } => market_data::on_trade(gateway, peer, session_id, sub_id, &symbol, &trade),
        ExchangeEvent::TradeSnapshot { sub_id, symbol, trades } => {
            // Historical trades are not replayed to the FIX side; the
            // subscription starts reporting from the next live trade.
            debug!(
                "Ignoring trade snapshot of {} for {symbol} (sub {sub_id})",
                trades.len()
            );
            Ok(())
        }
        ExchangeEvent::WalletSnapshot(wallets) => {
            for wallet in &wallets {
                inbound::on_wallet(gateway, peer, session_id, wallet)?;
            }
            Ok(())
        }
        ExchangeEvent::WalletUpdate(wallet) => {
            inbound::on_wallet(gateway, peer, session_id, &wallet)
        }
        ExchangeEvent::PositionSnapshot(positions) => {
            for position in &positions {
                inbound::on_position(gateway, peer, session_id, position)?;
            }
            Ok(())
        }
        ExchangeEvent::PositionUpdate(position) => {
            inbound::on_position(gateway, peer, session_id, &position)
        }
        ExchangeEvent::AuthResult { success, .. } => {
            warn!("Unexpected auth result (success={success}) for live session {session_id}");
            Ok(())
        }
        ExchangeEvent::Info { code, text } => {
            info!("Exchange info {code} for {session_id}: {text}");
            Ok(())
        }
        ExchangeEvent::Disconnected => {
            info!("Exchange reported disconnect for {session_id}");
            Ok(())
        }
    }
}
