//! Gateway orchestrator
//!
//! Owns the peer registry and the shared service handles (FIX sink,
//! symbology, nonce source, configuration) and reacts to FIX session
//! lifecycle callbacks:
//!
//! - session created  -> register a peer with fresh exchange handles
//! - Logon            -> authenticate the peer's exchange connection
//! - application msg  -> route to the order or market-data translators
//! - Logout           -> tear the peer down
//!
//! Inbound exchange traffic is consumed separately by `dispatch::run_dispatch`
//! off the queue returned by [`Gateway::new`].

use std::sync::Arc;

use iris_ports::{NonceProvider, Symbology};
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::messages::fix::{FixMessage, MsgType, custom_tags};
use crate::peer::{HandleFactory, Peer, PeerEvent, PeerManager};
use crate::translate;
use crate::translate::{market_data, outbound};
use crate::transport::FixSink;

/// Capacity of the shared exchange-event queue
const EVENT_QUEUE_CAPACITY: usize = 1024;

pub struct Gateway {
    peers: PeerManager,
    fix: Arc<dyn FixSink>,
    symbology: Arc<dyn Symbology>,
    nonces: Arc<dyn NonceProvider>,
    config: GatewayConfig,
}

impl Gateway {
    /// Build the gateway and the queue end consumed by the dispatch loop
    pub fn new(
        factory: HandleFactory,
        fix: Arc<dyn FixSink>,
        symbology: Arc<dyn Symbology>,
        nonces: Arc<dyn NonceProvider>,
        config: GatewayConfig,
    ) -> (Arc<Self>, mpsc::Receiver<PeerEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let peers = PeerManager::new(factory, event_tx, config.auth_timeout());
        (
            Arc::new(Self {
                peers,
                fix,
                symbology,
                nonces,
                config,
            }),
            event_rx,
        )
    }

    pub(crate) fn fix(&self) -> &dyn FixSink {
        self.fix.as_ref()
    }

    pub(crate) fn symbology(&self) -> &dyn Symbology {
        self.symbology.as_ref()
    }

    pub(crate) fn nonces(&self) -> &dyn NonceProvider {
        self.nonces.as_ref()
    }

    pub(crate) fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn find_peer(&self, session_id: &str) -> Option<Arc<Peer>> {
        self.peers.find_peer(session_id)
    }

    /// FIX engine callback: a session came up, register its peer
    pub fn on_session_created(&self, session_id: &str) {
        info!("Session created: {session_id}");
        self.peers.add_peer(session_id);
    }

    /// FIX engine callback: inbound Logon carrying exchange credentials.
    ///
    /// Missing credentials or a failed exchange handshake force a Logout
    /// back to the counterparty; the session never trades unauthenticated.
    pub async fn on_logon(self: &Arc<Self>, session_id: &str, message: &FixMessage) {
        let api_key = message.fields.get_opt(custom_tags::API_KEY);
        let api_secret = message.fields.get_opt(custom_tags::API_SECRET);
        let user_id = message.fields.get_opt(custom_tags::EXCHANGE_USER_ID);
        let (api_key, api_secret, user_id) = match (api_key, api_secret, user_id) {
            (Some(key), Some(secret), Some(user)) => {
                (key.to_string(), secret.to_string(), user.to_string())
            }
            _ => {
                warn!("Logon for {session_id} missing API credentials");
                self.force_logout(session_id, "API credentials required on Logon");
                return;
            }
        };
        let cancel_on_disconnect = message
            .fields
            .get_bool(custom_tags::CANCEL_ON_DISCONNECT)
            .unwrap_or(false);

        if self.peers.find_peer(session_id).is_none() {
            self.peers.add_peer(session_id);
        }

        let nonce = self.nonces.next();
        let done_rx = match self
            .peers
            .logon(
                session_id,
                &api_key,
                &api_secret,
                &user_id,
                cancel_on_disconnect,
                nonce,
            )
            .await
        {
            Ok(done_rx) => done_rx,
            Err(e) => {
                warn!("Exchange logon failed for {session_id}: {e}");
                self.force_logout(session_id, &format!("exchange logon failed: {e}"));
                self.peers.remove_peer(session_id).await;
                return;
            }
        };

        // Watch for the exchange event stream ending out from under a live
        // FIX session.
        let gateway = Arc::clone(self);
        let session = session_id.to_string();
        tokio::spawn(async move {
            if done_rx.await.is_ok() {
                if let Some(peer) = gateway.peers.find_peer(&session) {
                    warn!("Exchange connection lost for session {session}");
                    if peer.cancel_on_disconnect() {
                        gateway.force_logout(&session, "exchange connection lost");
                    }
                    gateway.peers.remove_peer(&session).await;
                }
            }
        });
    }

    /// FIX engine callback: session logged out, tear the peer down
    pub async fn on_logout(&self, session_id: &str) {
        info!("Session logout: {session_id}");
        self.peers.remove_peer(session_id).await;
    }

    /// FIX engine callback: route an inbound application message
    pub async fn on_app_message(
        self: &Arc<Self>,
        session_id: &str,
        message: &FixMessage,
    ) -> Result<(), GatewayError> {
        let peer = self
            .peers
            .find_peer(session_id)
            .ok_or_else(|| GatewayError::UnknownSession(session_id.to_string()))?;
        match message.msg_type {
            MsgType::NewOrderSingle => {
                outbound::handle_new_order_single(self, &peer, session_id, message).await
            }
            MsgType::OrderCancelRequest => {
                outbound::handle_cancel_request(self, &peer, session_id, message).await
            }
            MsgType::OrderCancelReplaceRequest => {
                outbound::handle_cancel_replace(self, &peer, session_id, message).await
            }
            MsgType::OrderStatusRequest => {
                outbound::handle_order_status_request(self, &peer, session_id, message)
            }
            MsgType::MarketDataRequest => {
                market_data::handle_market_data_request(self, &peer, session_id, message).await
            }
            other => {
                debug!("Ignoring unsupported inbound message type {other:?} on {session_id}");
                Ok(())
            }
        }
    }

    /// Close every peer's exchange connection
    pub async fn shutdown(&self) {
        info!("Gateway shutting down, closing all peers");
        self.peers.close_all().await;
    }

    fn force_logout(&self, session_id: &str, reason: &str) {
        if let Err(e) = self.fix.send(session_id, translate::logout(reason)) {
            warn!("Failed to send Logout to {session_id}: {e}");
        }
    }
}
