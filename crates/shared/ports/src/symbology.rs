use thiserror::Error;

/// Symbology translation failures
///
/// These are advisory: every call site falls back to the untranslated
/// symbol and logs a warning. Translation failure is non-fatal by design.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbologyError {
    #[error("Unknown counterparty: {0}")]
    UnknownCounterparty(String),

    #[error("No mapping for symbol {symbol} (counterparty {counterparty})")]
    UnmappedSymbol { symbol: String, counterparty: String },
}

/// Exchange symbol <-> counterparty symbol translation
///
/// Polymorphic over a table-driven implementation and a trivial identity
/// implementation. The resolver is process-wide, read-mostly and loaded once.
pub trait Symbology: Send + Sync {
    /// Translate a counterparty-facing symbol to the exchange's symbol
    fn to_exchange(&self, symbol: &str, counterparty: &str) -> Result<String, SymbologyError>;

    /// Translate an exchange symbol to the counterparty-facing symbol
    fn from_exchange(&self, symbol: &str, counterparty: &str) -> Result<String, SymbologyError>;
}
