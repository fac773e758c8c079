//! Market-Data Subscription Map
//!
//! Per-peer bidirectional map between a FIX MDReqID and the underlying
//! exchange subscription ids (one for the book stream, one for the trade
//! stream), plus a symbol -> request-id index enforcing one live
//! subscription per symbol per peer.

use dashmap::DashMap;

use crate::messages::exchange::SubscriptionId;

/// The two exchange stream ids backing one FIX market-data request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionIds {
    pub book: SubscriptionId,
    pub trades: SubscriptionId,
}

#[derive(Default)]
pub struct SubscriptionMap {
    /// MDReqID -> exchange stream ids
    by_req_id: DashMap<String, SubscriptionIds>,
    /// Exchange symbol -> MDReqID
    symbol_index: DashMap<String, String>,
}

impl SubscriptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `symbol`'s live subscription belongs to `req_id`
    pub fn map_symbol(&self, symbol: &str, req_id: &str) {
        self.symbol_index
            .insert(symbol.to_string(), req_id.to_string());
    }

    /// Duplicate-id rejection: scans the symbol index for the request id
    pub fn request_id_exists(&self, req_id: &str) -> bool {
        self.symbol_index
            .iter()
            .any(|entry| entry.value() == req_id)
    }

    /// The request id currently holding `symbol`'s subscription, if any
    pub fn request_for_symbol(&self, symbol: &str) -> Option<String> {
        self.symbol_index.get(symbol).map(|entry| entry.value().clone())
    }

    pub fn map_subscription_ids(&self, req_id: &str, ids: SubscriptionIds) {
        self.by_req_id.insert(req_id.to_string(), ids);
    }

    pub fn lookup_subscription_ids(&self, req_id: &str) -> Option<SubscriptionIds> {
        self.by_req_id.get(req_id).map(|entry| *entry.value())
    }

    /// Map an exchange stream id back to the FIX request that opened it
    pub fn reverse_lookup(&self, sub_id: SubscriptionId) -> Option<String> {
        self.by_req_id
            .iter()
            .find(|entry| entry.value().book == sub_id || entry.value().trades == sub_id)
            .map(|entry| entry.key().clone())
    }

    /// Drop a request's mappings (unsubscribe path), returning the stream
    /// ids so the caller can close them
    pub fn remove(&self, req_id: &str) -> Option<SubscriptionIds> {
        let removed = self.by_req_id.remove(req_id).map(|(_, ids)| ids);
        self.symbol_index.retain(|_, mapped| mapped != req_id);
        removed
    }
}
