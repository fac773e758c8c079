//! Iris Core Domain
//!
//! Pure domain types for the Iris FIX gateway.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod entities;

// Re-export commonly used types at crate root
pub use entities::{
    Execution, OrderFlags, OrderStatus, OrderType, Side, TimeInForce, avg_price, total_qty,
};
