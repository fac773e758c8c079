use serde::{Deserialize, Serialize};

/// Order types supported by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Execute at current market price
    Market,
    /// Execute at specified price or better
    Limit,
    /// Market order triggered when price reaches stop price
    Stop,
    /// Limit order triggered when price reaches stop price
    StopLimit,
    /// Stop order whose trigger trails the market by a fixed offset
    TrailingStop,
}

impl OrderType {
    /// A limit price is required to submit this order type
    pub fn requires_price(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }

    /// A stop/trigger price is required to submit this order type
    pub fn requires_stop_price(&self) -> bool {
        matches!(self, OrderType::Stop | OrderType::StopLimit)
    }

    /// A trailing offset is required to submit this order type
    pub fn requires_trail_offset(&self) -> bool {
        matches!(self, OrderType::TrailingStop)
    }
}
