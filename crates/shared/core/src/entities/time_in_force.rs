use serde::{Deserialize, Serialize};

/// Time-in-force instructions for order validity
///
/// The expiration timestamp for `GoodTillDate` is carried separately
/// alongside the order (it is a cache attribute, not part of the variant),
/// matching the sparse way the exchange echoes it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Day order: automatically canceled at end of trading day
    Day,
    /// Good Till Canceled: order remains active until explicitly canceled
    GoodTillCancel,
    /// Immediate or Cancel: execute immediately and cancel unfilled portion
    ImmediateOrCancel,
    /// Fill or Kill: execute immediately and completely, or cancel entirely
    FillOrKill,
    /// Good Till Date: order remains active until the supplied expiration
    GoodTillDate,
}

impl TimeInForce {
    /// Returns true if this instruction needs an expiration timestamp
    pub fn requires_expiration(&self) -> bool {
        matches!(self, TimeInForce::GoodTillDate)
    }
}
