//! Order Identity Cache
//!
//! Per-peer store of in-flight/working orders and cancels. This is the only
//! place order truth lives: the exchange's acknowledgements frequently omit
//! fields the FIX client needs (original price, flags, time-in-force), so
//! every read that participates in a FIX response is taken from here, never
//! recomputed from the triggering event.
//!
//! Two producers mutate the cache concurrently -- inbound FIX handlers and
//! the exchange-event dispatch loop. The map itself is a sharded concurrent
//! map; each order additionally carries its own lock so aggregate
//! computation (filled quantity, average price) never races an execution
//! append, and unrelated orders never serialize behind one another.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use iris_core::{Execution, OrderFlags, OrderStatus, OrderType, Side, TimeInForce, avg_price, total_qty};
use rust_decimal::Decimal;

use crate::error::CacheError;

/// Parameters for registering a new order
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub cl_ord_id: String,
    pub symbol: String,
    pub account: String,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: Decimal,
    pub price: Decimal,
    pub stop_price: Decimal,
    pub trail_offset: Decimal,
    pub is_margin: bool,
    pub tif: TimeInForce,
    pub tif_expiration: Option<DateTime<Utc>>,
    pub flags: OrderFlags,
}

/// A pending cancel request
///
/// The exchange's cancel acknowledgement echoes only the *original* order's
/// identity, never the cancel request's own ClOrdID; this record lets the
/// gateway reverse-map to answer with the correct reject identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCancel {
    /// The cancel request's own ClOrdID
    pub cl_ord_id: String,
    /// ClOrdID of the order being canceled
    pub orig_cl_ord_id: String,
    pub symbol: String,
    pub account: String,
}

/// Mutable per-order state, guarded by the order's own lock
#[derive(Debug, Clone)]
struct CachedOrder {
    cl_ord_id: String,
    order_id: Option<i64>,
    symbol: String,
    account: String,
    side: Side,
    order_type: OrderType,
    qty: Decimal,
    price: Decimal,
    stop_price: Decimal,
    trail_offset: Decimal,
    is_margin: bool,
    tif: TimeInForce,
    tif_expiration: Option<DateTime<Utc>>,
    flags: OrderFlags,
    executions: Vec<Execution>,
}

/// Point-in-time snapshot of a cached order, with derived aggregates
///
/// Handed out instead of lock guards so callers never hold an order's lock
/// across FIX or transport calls.
#[derive(Debug, Clone)]
pub struct OrderView {
    pub cl_ord_id: String,
    pub order_id: Option<i64>,
    pub symbol: String,
    pub account: String,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: Decimal,
    pub price: Decimal,
    pub stop_price: Decimal,
    pub trail_offset: Decimal,
    pub is_margin: bool,
    pub tif: TimeInForce,
    pub tif_expiration: Option<DateTime<Utc>>,
    pub flags: OrderFlags,
    /// Sum of execution quantities
    pub filled_qty: Decimal,
    /// Quantity-weighted mean of execution prices, zero when unfilled
    pub avg_px: Decimal,
}

impl OrderView {
    pub fn leaves_qty(&self) -> Decimal {
        let leaves = self.qty - self.filled_qty;
        if leaves.is_sign_negative() {
            Decimal::ZERO
        } else {
            leaves
        }
    }

    /// Status derived purely from fill state; cancellation and rejection
    /// are reported from the triggering event, not from here
    pub fn derived_status(&self) -> OrderStatus {
        if !self.qty.is_zero() && self.filled_qty >= self.qty {
            OrderStatus::Filled
        } else if self.filled_qty > Decimal::ZERO {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::New
        }
    }
}

impl CachedOrder {
    fn view(&self) -> OrderView {
        OrderView {
            cl_ord_id: self.cl_ord_id.clone(),
            order_id: self.order_id,
            symbol: self.symbol.clone(),
            account: self.account.clone(),
            side: self.side,
            order_type: self.order_type,
            qty: self.qty,
            price: self.price,
            stop_price: self.stop_price,
            trail_offset: self.trail_offset,
            is_margin: self.is_margin,
            tif: self.tif,
            tif_expiration: self.tif_expiration,
            flags: self.flags,
            filled_qty: total_qty(&self.executions),
            avg_px: avg_price(&self.executions),
        }
    }
}

/// Per-peer order and cancel store; peers never share caches
#[derive(Default)]
pub struct OrderCache {
    /// Primary index: ClOrdID -> order (per-order lock inside)
    orders: DashMap<String, Arc<Mutex<CachedOrder>>>,
    /// Secondary index: exchange order id -> ClOrdID
    order_ids: DashMap<i64, String>,
    /// Pending cancels by the cancel's own ClOrdID
    cancels: DashMap<String, CachedCancel>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an order. Quantity and prices are normalized to magnitudes;
    /// direction is carried only by `side`. Records are retained for the
    /// life of the peer to answer late status requests and keep duplicate
    /// events idempotent.
    pub fn add_order(&self, new_order: NewOrder) -> OrderView {
        let order = CachedOrder {
            cl_ord_id: new_order.cl_ord_id.clone(),
            order_id: None,
            symbol: new_order.symbol,
            account: new_order.account,
            side: new_order.side,
            order_type: new_order.order_type,
            qty: new_order.qty.abs(),
            price: new_order.price.abs(),
            stop_price: new_order.stop_price.abs(),
            trail_offset: new_order.trail_offset.abs(),
            is_margin: new_order.is_margin,
            tif: new_order.tif,
            tif_expiration: new_order.tif_expiration,
            flags: new_order.flags,
            executions: Vec::new(),
        };
        let view = order.view();
        self.orders
            .insert(new_order.cl_ord_id, Arc::new(Mutex::new(order)));
        view
    }

    /// Bind the exchange-assigned order id. Idempotent: rebinding the same
    /// id leaves the cache in the same observable state.
    pub fn update_order(&self, cl_ord_id: &str, order_id: i64) -> Result<OrderView, CacheError> {
        let entry = self
            .orders
            .get(cl_ord_id)
            .ok_or_else(|| CacheError::OrderNotFound(cl_ord_id.to_string()))?;
        let mut order = entry.lock().expect("order lock poisoned");
        order.order_id = Some(order_id);
        let view = order.view();
        drop(order);
        self.order_ids.insert(order_id, cl_ord_id.to_string());
        Ok(view)
    }

    /// Append an execution and return the order's updated aggregates
    /// (total filled quantity, average fill price) computed under the
    /// order's lock. A replayed execution id is ignored.
    pub fn add_execution(
        &self,
        order_id: i64,
        execution: Execution,
    ) -> Result<(Decimal, Decimal, OrderView), CacheError> {
        let cl_ord_id = self.cl_ord_id_for_order_id(order_id)?;
        let entry = self
            .orders
            .get(&cl_ord_id)
            .ok_or(CacheError::OrderIdNotFound(order_id))?;
        let mut order = entry.lock().expect("order lock poisoned");
        if !order.executions.iter().any(|e| e.exec_id == execution.exec_id) {
            order.executions.push(execution);
        }
        let view = order.view();
        Ok((view.filled_qty, view.avg_px, view))
    }

    /// Fold replace acknowledgement fields into the cached order
    pub fn apply_update(
        &self,
        order_id: i64,
        price: Option<Decimal>,
        qty: Option<Decimal>,
    ) -> Result<OrderView, CacheError> {
        let cl_ord_id = self.cl_ord_id_for_order_id(order_id)?;
        let entry = self
            .orders
            .get(&cl_ord_id)
            .ok_or(CacheError::OrderIdNotFound(order_id))?;
        let mut order = entry.lock().expect("order lock poisoned");
        if let Some(price) = price {
            order.price = price.abs();
        }
        if let Some(qty) = qty {
            order.qty = qty.abs();
        }
        Ok(order.view())
    }

    pub fn lookup_by_cl_ord_id(&self, cl_ord_id: &str) -> Result<OrderView, CacheError> {
        let entry = self
            .orders
            .get(cl_ord_id)
            .ok_or_else(|| CacheError::OrderNotFound(cl_ord_id.to_string()))?;
        let order = entry.lock().expect("order lock poisoned");
        Ok(order.view())
    }

    pub fn lookup_by_order_id(&self, order_id: i64) -> Result<OrderView, CacheError> {
        let cl_ord_id = self.cl_ord_id_for_order_id(order_id)?;
        self.lookup_by_cl_ord_id(&cl_ord_id)
    }

    pub fn cl_ord_id_for_order_id(&self, order_id: i64) -> Result<String, CacheError> {
        self.order_ids
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .ok_or(CacheError::OrderIdNotFound(order_id))
    }

    pub fn add_cancel(&self, cancel: CachedCancel) {
        self.cancels.insert(cancel.cl_ord_id.clone(), cancel);
    }

    pub fn lookup_cancel_by_cl_ord_id(&self, cl_ord_id: &str) -> Result<CachedCancel, CacheError> {
        self.cancels
            .get(cl_ord_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CacheError::CancelNotFound(cl_ord_id.to_string()))
    }

    /// Reverse lookup: the exchange's cancel ack references only the
    /// original order, so the pending cancel is found by that identity
    pub fn lookup_cancel_by_orig_cl_ord_id(
        &self,
        orig_cl_ord_id: &str,
    ) -> Result<CachedCancel, CacheError> {
        self.cancels
            .iter()
            .find(|entry| entry.value().orig_cl_ord_id == orig_cl_ord_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CacheError::CancelNotFound(orig_cl_ord_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limit_buy(cl_ord_id: &str, qty: Decimal, price: Decimal) -> NewOrder {
        NewOrder {
            cl_ord_id: cl_ord_id.to_string(),
            symbol: "tBTCUSD".to_string(),
            account: "acct-1".to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            qty,
            price,
            stop_price: Decimal::ZERO,
            trail_offset: Decimal::ZERO,
            is_margin: false,
            tif: TimeInForce::GoodTillCancel,
            tif_expiration: None,
            flags: OrderFlags::NONE,
        }
    }

    #[test]
    fn test_add_order_normalizes_quantity() {
        let cache = OrderCache::new();
        let view = cache.add_order(limit_buy("1", dec!(-2.5), dec!(100)));
        assert_eq!(view.qty, dec!(2.5));
        assert_eq!(view.side, Side::Buy);
    }

    #[test]
    fn test_update_order_idempotent() {
        let cache = OrderCache::new();
        cache.add_order(limit_buy("1", dec!(1), dec!(100)));

        let first = cache.update_order("1", 4711).unwrap();
        let second = cache.update_order("1", 4711).unwrap();

        assert_eq!(first.order_id, Some(4711));
        assert_eq!(second.order_id, Some(4711));
        assert_eq!(cache.cl_ord_id_for_order_id(4711).unwrap(), "1");
        assert_eq!(cache.lookup_by_order_id(4711).unwrap().cl_ord_id, "1");
    }

    #[test]
    fn test_update_order_unknown() {
        let cache = OrderCache::new();
        assert!(matches!(
            cache.update_order("missing", 1),
            Err(CacheError::OrderNotFound(_))
        ));
    }

    #[test]
    fn test_execution_aggregates() {
        let cache = OrderCache::new();
        cache.add_order(limit_buy("1", dec!(2), dec!(1700)));
        cache.update_order("1", 99).unwrap();

        cache
            .add_execution(99, Execution::new(1, dec!(1600), dec!(0.1)))
            .unwrap();
        cache
            .add_execution(99, Execution::new(2, dec!(1650), dec!(0.5)))
            .unwrap();
        let (filled, avg, view) = cache
            .add_execution(99, Execution::new(3, dec!(1675), dec!(1.2)))
            .unwrap();

        assert_eq!(filled, dec!(1.8));
        // 2995 / 1.8 = 1663.888...
        assert!(avg > dec!(1663.88) && avg < dec!(1663.90));
        assert_eq!(view.leaves_qty(), dec!(0.2));
        assert_eq!(view.derived_status(), OrderStatus::PartiallyFilled);
    }

    #[test]
    fn test_execution_replay_is_idempotent() {
        let cache = OrderCache::new();
        cache.add_order(limit_buy("1", dec!(1), dec!(100)));
        cache.update_order("1", 7).unwrap();

        cache
            .add_execution(7, Execution::new(42, dec!(100), dec!(0.4)))
            .unwrap();
        let (filled, _, _) = cache
            .add_execution(7, Execution::new(42, dec!(100), dec!(0.4)))
            .unwrap();

        assert_eq!(filled, dec!(0.4));
    }

    #[test]
    fn test_execution_for_unknown_order_id() {
        let cache = OrderCache::new();
        assert!(matches!(
            cache.add_execution(1, Execution::new(1, dec!(1), dec!(1))),
            Err(CacheError::OrderIdNotFound(1))
        ));
    }

    #[test]
    fn test_derived_status_filled() {
        let cache = OrderCache::new();
        cache.add_order(limit_buy("1", dec!(1), dec!(100)));
        cache.update_order("1", 7).unwrap();
        let (_, _, view) = cache
            .add_execution(7, Execution::new(1, dec!(100), dec!(1)))
            .unwrap();
        assert_eq!(view.derived_status(), OrderStatus::Filled);
        assert_eq!(view.leaves_qty(), Decimal::ZERO);
    }

    #[test]
    fn test_cancel_reverse_lookup() {
        let cache = OrderCache::new();
        cache.add_cancel(CachedCancel {
            cl_ord_id: "cxl-9".to_string(),
            orig_cl_ord_id: "555".to_string(),
            symbol: "tBTCUSD".to_string(),
            account: "acct-1".to_string(),
        });

        let by_own = cache.lookup_cancel_by_cl_ord_id("cxl-9").unwrap();
        let by_orig = cache.lookup_cancel_by_orig_cl_ord_id("555").unwrap();
        assert_eq!(by_own, by_orig);

        assert!(cache.lookup_cancel_by_orig_cl_ord_id("777").is_err());
    }

    #[test]
    fn test_concurrent_writers() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(OrderCache::new());
        cache.add_order(limit_buy("1", dec!(100), dec!(10)));
        cache.update_order("1", 7).unwrap();

        let mut handles = Vec::new();
        for worker in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..25 {
                    let exec_id = worker * 100 + i;
                    cache
                        .add_execution(7, Execution::new(exec_id, dec!(10), dec!(0.5)))
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let view = cache.lookup_by_order_id(7).unwrap();
        assert_eq!(view.filled_qty, dec!(50));
        assert_eq!(view.avg_px, dec!(10));
    }
}
