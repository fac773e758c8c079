//! Market Data Request handling and stream translation
//!
//! One FIX Market Data Request covers both the order book and the trade
//! stream for a symbol, so a streaming subscribe opens two exchange
//! subscriptions and the MDReqID maps to the pair. Inbound stream events
//! resolve their MDReqID through the per-peer subscription map, first by
//! symbol and then by raw subscription id.

use log::{debug, warn};
use tokio::time::timeout;

use crate::error::{GatewayError, TransportError};
use crate::gateway::Gateway;
use crate::messages::exchange::{BookLevel, PublicTrade, SubscriptionId, SubscriptionRequest};
use crate::messages::fix::{
    FieldMap, FixMessage, MdRejReason, MsgType, SUBSCRIPTION_DISABLE, SUBSCRIPTION_SNAPSHOT,
    SUBSCRIPTION_SNAPSHOT_PLUS_UPDATES, custom_tags, tags,
};
use crate::peer::Peer;
use crate::subscriptions::SubscriptionIds;
use crate::symbology::{resolve_from_exchange, resolve_to_exchange};
use crate::translate::md_reject;
use crate::transport::ExchangeClient;

const MD_ENTRY_BID: char = '0';
const MD_ENTRY_OFFER: char = '1';
const MD_ENTRY_TRADE: char = '2';
const MD_ACTION_NEW: char = '0';
const MD_ACTION_DELETE: char = '2';

async fn subscribe_bounded(
    client: &dyn ExchangeClient,
    request: SubscriptionRequest,
    wait: std::time::Duration,
) -> Result<SubscriptionId, TransportError> {
    match timeout(wait, client.subscribe(request)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout),
    }
}

fn book_entry(level: &BookLevel, action: Option<char>) -> FieldMap {
    let mut entry = FieldMap::new();
    if let Some(action) = action {
        entry.set(tags::MD_UPDATE_ACTION, action);
    }
    let entry_type = if level.amount.is_sign_negative() {
        MD_ENTRY_OFFER
    } else {
        MD_ENTRY_BID
    };
    entry.set(tags::MD_ENTRY_TYPE, entry_type);
    entry.set(tags::MD_ENTRY_PX, level.price);
    // A zero count deletes the level; size is meaningless there.
    if level.count > 0 {
        entry.set(tags::MD_ENTRY_SIZE, level.amount.abs());
    }
    entry
}

fn snapshot_message(md_req_id: &str, symbol: &str, levels: &[BookLevel]) -> FixMessage {
    let mut message = FixMessage::new(MsgType::MarketDataSnapshotFullRefresh);
    message
        .set(tags::MD_REQ_ID, md_req_id)
        .set(tags::SYMBOL, symbol)
        .set(tags::NO_MD_ENTRIES, levels.len());
    for level in levels {
        message.push_group(book_entry(level, None));
    }
    message
}

pub(crate) async fn handle_market_data_request(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    message: &FixMessage,
) -> Result<(), GatewayError> {
    let md_req_id = message.fields.get_str(tags::MD_REQ_ID)?.to_string();
    let sub_type = message.fields.get_char(tags::SUBSCRIPTION_REQUEST_TYPE)?;

    let symbol = match message.fields.get_str(tags::SYMBOL) {
        Ok(symbol) => symbol.to_string(),
        Err(_) => {
            gateway.fix().send(
                session_id,
                md_reject(&md_req_id, MdRejReason::UnknownSymbol, "Symbol required"),
            )?;
            return Ok(());
        }
    };
    let exchange_symbol = resolve_to_exchange(
        gateway.symbology(),
        &symbol,
        &gateway.config().counterparty,
    );
    let precision = message
        .fields
        .get_opt(custom_tags::BOOK_PRECISION)
        .unwrap_or(&gateway.config().book_precision)
        .to_string();
    let length = message
        .fields
        .get_u32(tags::MARKET_DEPTH)
        .ok()
        .filter(|depth| *depth > 0)
        .unwrap_or(gateway.config().book_length);

    // An MDReqID backing a live subscription cannot be reused by any new
    // request; a disable is the one request type that must reference it.
    if sub_type != SUBSCRIPTION_DISABLE && peer.subscriptions().request_id_exists(&md_req_id) {
        gateway.fix().send(
            session_id,
            md_reject(
                &md_req_id,
                MdRejReason::DuplicateMdReqId,
                "duplicate MDReqID",
            ),
        )?;
        return Ok(());
    }

    match sub_type {
        SUBSCRIPTION_SNAPSHOT => {
            match peer
                .query()
                .book_snapshot(&exchange_symbol, &precision, length)
                .await
            {
                Ok(levels) => {
                    gateway
                        .fix()
                        .send(session_id, snapshot_message(&md_req_id, &symbol, &levels))?;
                }
                Err(e) => {
                    warn!("Book snapshot failed for {exchange_symbol}: {e}");
                    gateway.fix().send(
                        session_id,
                        md_reject(&md_req_id, MdRejReason::UnknownSymbol, &e.to_string()),
                    )?;
                }
            }
        }
        SUBSCRIPTION_SNAPSHOT_PLUS_UPDATES => {
            if let Some(existing) = peer.subscriptions().request_for_symbol(&exchange_symbol) {
                gateway.fix().send(
                    session_id,
                    md_reject(
                        &md_req_id,
                        MdRejReason::DuplicateMdReqId,
                        &format!("already subscribed to {symbol} under {existing}"),
                    ),
                )?;
                return Ok(());
            }

            let wait = gateway.config().subscribe_timeout();
            let book = match subscribe_bounded(
                peer.client(),
                SubscriptionRequest::Book {
                    symbol: exchange_symbol.clone(),
                    precision,
                    length,
                },
                wait,
            )
            .await
            {
                Ok(book) => book,
                Err(e) => {
                    warn!("Book subscribe failed for {exchange_symbol}: {e}");
                    gateway.fix().send(
                        session_id,
                        md_reject(&md_req_id, MdRejReason::UnknownSymbol, &e.to_string()),
                    )?;
                    return Ok(());
                }
            };
            let trades = match subscribe_bounded(
                peer.client(),
                SubscriptionRequest::Trades {
                    symbol: exchange_symbol.clone(),
                },
                wait,
            )
            .await
            {
                Ok(trades) => trades,
                Err(e) => {
                    warn!("Trades subscribe failed for {exchange_symbol}: {e}");
                    // The book half is live; tear it back down so the
                    // request fails atomically.
                    if let Err(unsub) = peer.client().unsubscribe(book).await {
                        warn!("Book rollback failed for {exchange_symbol}: {unsub}");
                    }
                    gateway.fix().send(
                        session_id,
                        md_reject(&md_req_id, MdRejReason::UnknownSymbol, &e.to_string()),
                    )?;
                    return Ok(());
                }
            };

            peer.subscriptions().map_symbol(&exchange_symbol, &md_req_id);
            peer.subscriptions()
                .map_subscription_ids(&md_req_id, SubscriptionIds { book, trades });
            debug!("Subscribed {md_req_id} to {exchange_symbol} (book {book}, trades {trades})");
        }
        SUBSCRIPTION_DISABLE => {
            let Some(ids) = peer.subscriptions().lookup_subscription_ids(&md_req_id) else {
                gateway.fix().send(
                    session_id,
                    md_reject(
                        &md_req_id,
                        MdRejReason::UnknownSymbol,
                        "could not find subscription",
                    ),
                )?;
                return Ok(());
            };
            if let Err(e) = peer.client().unsubscribe(ids.book).await {
                warn!("Book unsubscribe failed for {md_req_id}: {e}");
            }
            if let Err(e) = peer.client().unsubscribe(ids.trades).await {
                warn!("Trades unsubscribe failed for {md_req_id}: {e}");
            }
            peer.subscriptions().remove(&md_req_id);
        }
        other => {
            gateway.fix().send(
                session_id,
                md_reject(
                    &md_req_id,
                    MdRejReason::UnsupportedSubscriptionType,
                    &format!("unsupported SubscriptionRequestType {other}"),
                ),
            )?;
        }
    }
    Ok(())
}

fn request_id_for(peer: &Peer, symbol: &str, sub_id: SubscriptionId) -> Option<String> {
    peer.subscriptions()
        .request_for_symbol(symbol)
        .or_else(|| peer.subscriptions().reverse_lookup(sub_id))
}

pub(crate) fn on_book_snapshot(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    sub_id: SubscriptionId,
    symbol: &str,
    levels: &[BookLevel],
) -> Result<(), GatewayError> {
    let Some(md_req_id) = request_id_for(peer, symbol, sub_id) else {
        debug!("Dropping book snapshot for unmapped subscription {sub_id}");
        return Ok(());
    };
    let display = resolve_from_exchange(gateway.symbology(), symbol, &gateway.config().counterparty);
    gateway
        .fix()
        .send(session_id, snapshot_message(&md_req_id, &display, levels))?;
    Ok(())
}

pub(crate) fn on_book_update(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    sub_id: SubscriptionId,
    symbol: &str,
    level: &BookLevel,
) -> Result<(), GatewayError> {
    let Some(md_req_id) = request_id_for(peer, symbol, sub_id) else {
        debug!("Dropping book update for unmapped subscription {sub_id}");
        return Ok(());
    };
    let display = resolve_from_exchange(gateway.symbology(), symbol, &gateway.config().counterparty);
    let action = if level.count == 0 {
        MD_ACTION_DELETE
    } else {
        MD_ACTION_NEW
    };
    let mut message = FixMessage::new(MsgType::MarketDataIncrementalRefresh);
    message
        .set(tags::MD_REQ_ID, &md_req_id)
        .set(tags::SYMBOL, display)
        .set(tags::NO_MD_ENTRIES, 1);
    message.push_group(book_entry(level, Some(action)));
    gateway.fix().send(session_id, message)?;
    Ok(())
}

pub(crate) fn on_trade(
    gateway: &Gateway,
    peer: &Peer,
    session_id: &str,
    sub_id: SubscriptionId,
    symbol: &str,
    trade: &PublicTrade,
) -> Result<(), GatewayError> {
    let Some(md_req_id) = request_id_for(peer, symbol, sub_id) else {
        debug!("Dropping trade for unmapped subscription {sub_id}");
        return Ok(());
    };
    let display = resolve_from_exchange(gateway.symbology(), symbol, &gateway.config().counterparty);
    let mut entry = FieldMap::new();
    entry.set(tags::MD_UPDATE_ACTION, MD_ACTION_NEW);
    entry.set(tags::MD_ENTRY_TYPE, MD_ENTRY_TRADE);
    entry.set(tags::MD_ENTRY_PX, trade.price);
    entry.set(tags::MD_ENTRY_SIZE, trade.amount.abs());
    let mut message = FixMessage::new(MsgType::MarketDataIncrementalRefresh);
    message
        .set(tags::MD_REQ_ID, &md_req_id)
        .set(tags::SYMBOL, display)
        .set(tags::NO_MD_ENTRIES, 1);
    message.push_group(entry);
    gateway.fix().send(session_id, message)?;
    Ok(())
}
