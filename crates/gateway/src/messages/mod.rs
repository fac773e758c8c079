//! Wire message types for both sides of the gateway

pub mod exchange;
pub mod fix;
