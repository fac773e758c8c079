//! Iris Ports
//!
//! Port definitions (traits) for the Iris FIX gateway.
//! These define the boundaries between translation logic and the
//! process-wide services injected into it.

mod nonce;
mod symbology;

pub use nonce::NonceProvider;
pub use symbology::{Symbology, SymbologyError};
