//! Per-session Peer state and the PeerManager registry
//!
//! Each FIX session owns exactly one `Peer`: one authenticated exchange
//! connection, one order cache and one market-data subscription map. The
//! `PeerManager` keys peers by session id and funnels every exchange event,
//! tagged with its originating session, into a single shared queue consumed
//! by the dispatch loop.

use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, timeout_at};

use crate::cache::OrderCache;
use crate::error::{GatewayError, TransportError};
use crate::messages::exchange::ExchangeEvent;
use crate::subscriptions::SubscriptionMap;
use crate::transport::{ExchangeClient, ExchangeQuery};

/// Transport handles for one peer's exchange connection
pub struct ExchangeHandles {
    pub client: Arc<dyn ExchangeClient>,
    pub query: Arc<dyn ExchangeQuery>,
}

/// Builds fresh transport handles for a new session
pub type HandleFactory = Box<dyn Fn(&str) -> ExchangeHandles + Send + Sync>;

/// An exchange event tagged with the session it belongs to
#[derive(Debug)]
pub struct PeerEvent {
    pub session_id: String,
    pub event: ExchangeEvent,
}

/// State owned by one FIX session
pub struct Peer {
    session_id: String,
    user_id: RwLock<Option<String>>,
    cancel_on_disconnect: AtomicBool,
    client: Arc<dyn ExchangeClient>,
    query: Arc<dyn ExchangeQuery>,
    orders: OrderCache,
    subscriptions: SubscriptionMap,
}

impl Peer {
    fn new(session_id: &str, handles: ExchangeHandles) -> Self {
        Self {
            session_id: session_id.to_string(),
            user_id: RwLock::new(None),
            cancel_on_disconnect: AtomicBool::new(false),
            client: handles.client,
            query: handles.query,
            orders: OrderCache::new(),
            subscriptions: SubscriptionMap::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Exchange-side user id, available once authenticated
    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().ok().and_then(|guard| guard.clone())
    }

    fn set_user_id(&self, user_id: String) {
        if let Ok(mut guard) = self.user_id.write() {
            *guard = Some(user_id);
        }
    }

    pub fn cancel_on_disconnect(&self) -> bool {
        self.cancel_on_disconnect.load(Ordering::Relaxed)
    }

    pub fn set_cancel_on_disconnect(&self, enabled: bool) {
        self.cancel_on_disconnect.store(enabled, Ordering::Relaxed);
    }

    pub fn client(&self) -> &dyn ExchangeClient {
        self.client.as_ref()
    }

    pub fn query(&self) -> &dyn ExchangeQuery {
        self.query.as_ref()
    }

    pub fn orders(&self) -> &OrderCache {
        &self.orders
    }

    pub fn subscriptions(&self) -> &SubscriptionMap {
        &self.subscriptions
    }
}

/// Registry of peers keyed by FIX session id
pub struct PeerManager {
    peers: DashMap<String, Arc<Peer>>,
    event_tx: mpsc::Sender<PeerEvent>,
    factory: HandleFactory,
    auth_timeout: Duration,
}

impl PeerManager {
    pub fn new(
        factory: HandleFactory,
        event_tx: mpsc::Sender<PeerEvent>,
        auth_timeout: Duration,
    ) -> Self {
        Self {
            peers: DashMap::new(),
            event_tx,
            factory,
            auth_timeout,
        }
    }

    /// Register a peer for the session, replacing any stale one
    pub fn add_peer(&self, session_id: &str) -> Arc<Peer> {
        let handles = (self.factory)(session_id);
        let peer = Arc::new(Peer::new(session_id, handles));
        if self.peers.insert(session_id.to_string(), peer.clone()).is_some() {
            warn!("Replaced existing peer for session {session_id}");
        }
        peer
    }

    pub fn find_peer(&self, session_id: &str) -> Option<Arc<Peer>> {
        self.peers.get(session_id).map(|entry| entry.value().clone())
    }

    /// Close the peer's exchange connection and deregister it
    pub async fn remove_peer(&self, session_id: &str) {
        if let Some((_, peer)) = self.peers.remove(session_id) {
            if let Err(e) = peer.client.close().await {
                debug!("Close for session {session_id} returned {e}");
            }
            info!("Removed peer for session {session_id}");
        }
    }

    pub async fn close_all(&self) {
        let sessions: Vec<String> = self.peers.iter().map(|entry| entry.key().clone()).collect();
        for session_id in sessions {
            self.remove_peer(&session_id).await;
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Connect and authenticate the peer's exchange session.
    ///
    /// Blocks until the exchange answers the credential handshake or the
    /// auth timeout elapses. On success a background task forwards every
    /// subsequent exchange event into the shared queue; the returned
    /// receiver fires once when that event stream ends.
    pub async fn logon(
        &self,
        session_id: &str,
        api_key: &str,
        api_secret: &str,
        expected_user_id: &str,
        cancel_on_disconnect: bool,
        nonce: u64,
    ) -> Result<oneshot::Receiver<()>, GatewayError> {
        let peer = self
            .find_peer(session_id)
            .ok_or_else(|| GatewayError::UnknownSession(session_id.to_string()))?;
        peer.set_cancel_on_disconnect(cancel_on_disconnect);

        let mut events = peer.client.connect().await?;
        peer.client.credentials(api_key, api_secret, nonce).await?;

        let deadline = Instant::now() + self.auth_timeout;
        loop {
            let event = match timeout_at(deadline, events.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => return Err(TransportError::ChannelClosed.into()),
                Err(_) => return Err(TransportError::Timeout.into()),
            };
            match event {
                ExchangeEvent::AuthResult {
                    success: true,
                    user_id,
                    ..
                } => {
                    if let Some(user_id) = user_id {
                        if !expected_user_id.is_empty() && user_id != expected_user_id {
                            warn!(
                                "Session {session_id} authenticated as {user_id}, \
                                 expected {expected_user_id}"
                            );
                        }
                        peer.set_user_id(user_id);
                    } else {
                        peer.set_user_id(expected_user_id.to_string());
                    }
                    info!("Session {session_id} authenticated");
                    break;
                }
                ExchangeEvent::AuthResult { text, .. } => {
                    let reason = text.unwrap_or_else(|| "authentication rejected".to_string());
                    return Err(GatewayError::Exchange(reason));
                }
                other => {
                    // Pre-auth traffic (info events, heartbeats) still flows
                    // through the shared queue.
                    let _ = self
                        .event_tx
                        .send(PeerEvent {
                            session_id: session_id.to_string(),
                            event: other,
                        })
                        .await;
                }
            }
        }

        let (done_tx, done_rx) = oneshot::channel();
        let event_tx = self.event_tx.clone();
        let session = session_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if event_tx
                    .send(PeerEvent {
                        session_id: session.clone(),
                        event,
                    })
                    .await
                    .is_err()
                {
                    debug!("Event queue closed, stopping forwarder for {session}");
                    return;
                }
            }
            debug!("Exchange event stream ended for {session}");
            let _ = done_tx.send(());
        });

        Ok(done_rx)
    }
}
