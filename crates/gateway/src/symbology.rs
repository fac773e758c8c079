//! Symbology Resolver implementations
//!
//! Translates exchange symbols <-> counterparty-specific symbols, either as
//! a trivial passthrough or from a per-counterparty key/value table loaded
//! once from a flat JSON file. Process-wide and read-mostly.

use std::collections::HashMap;
use std::path::Path;

use iris_ports::{Symbology, SymbologyError};
use log::warn;

use crate::config::ConfigError;

/// Identity translation in both directions
pub struct PassthroughSymbology;

impl Symbology for PassthroughSymbology {
    fn to_exchange(&self, symbol: &str, _counterparty: &str) -> Result<String, SymbologyError> {
        Ok(symbol.to_string())
    }

    fn from_exchange(&self, symbol: &str, _counterparty: &str) -> Result<String, SymbologyError> {
        Ok(symbol.to_string())
    }
}

struct CounterpartyTable {
    to_exchange: HashMap<String, String>,
    from_exchange: HashMap<String, String>,
}

/// Table-driven translation with an optional passthrough fallback
pub struct TableSymbology {
    tables: HashMap<String, CounterpartyTable>,
    passthrough: bool,
}

impl TableSymbology {
    /// Build from counterparty -> (counterparty symbol -> exchange symbol)
    pub fn new(tables: HashMap<String, HashMap<String, String>>, passthrough: bool) -> Self {
        let tables = tables
            .into_iter()
            .map(|(counterparty, mapping)| {
                let from_exchange = mapping
                    .iter()
                    .map(|(theirs, ours)| (ours.clone(), theirs.clone()))
                    .collect();
                (
                    counterparty,
                    CounterpartyTable {
                        to_exchange: mapping,
                        from_exchange,
                    },
                )
            })
            .collect();
        Self {
            tables,
            passthrough,
        }
    }

    /// Load the flat JSON table: `{"counterparty": {"their symbol": "exchange symbol"}}`
    pub fn load<P: AsRef<Path>>(path: P, passthrough: bool) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let tables: HashMap<String, HashMap<String, String>> = serde_json::from_str(&content)?;
        Ok(Self::new(tables, passthrough))
    }

    fn resolve(
        &self,
        symbol: &str,
        counterparty: &str,
        outbound: bool,
    ) -> Result<String, SymbologyError> {
        let table = match self.tables.get(counterparty) {
            Some(table) => table,
            None if self.passthrough => return Ok(symbol.to_string()),
            None => {
                return Err(SymbologyError::UnknownCounterparty(
                    counterparty.to_string(),
                ));
            }
        };
        let mapping = if outbound {
            &table.to_exchange
        } else {
            &table.from_exchange
        };
        match mapping.get(symbol) {
            Some(mapped) => Ok(mapped.clone()),
            None if self.passthrough => Ok(symbol.to_string()),
            None => Err(SymbologyError::UnmappedSymbol {
                symbol: symbol.to_string(),
                counterparty: counterparty.to_string(),
            }),
        }
    }
}

impl Symbology for TableSymbology {
    fn to_exchange(&self, symbol: &str, counterparty: &str) -> Result<String, SymbologyError> {
        self.resolve(symbol, counterparty, true)
    }

    fn from_exchange(&self, symbol: &str, counterparty: &str) -> Result<String, SymbologyError> {
        self.resolve(symbol, counterparty, false)
    }
}

/// Resolve toward the exchange, falling back to the untranslated symbol.
/// Translation failure is non-fatal by design.
pub(crate) fn resolve_to_exchange(
    symbology: &dyn Symbology,
    symbol: &str,
    counterparty: &str,
) -> String {
    match symbology.to_exchange(symbol, counterparty) {
        Ok(mapped) => mapped,
        Err(e) => {
            warn!("Symbology to_exchange failed for {symbol}: {e}, using untranslated symbol");
            symbol.to_string()
        }
    }
}

/// Resolve toward the counterparty, falling back to the untranslated symbol
pub(crate) fn resolve_from_exchange(
    symbology: &dyn Symbology,
    symbol: &str,
    counterparty: &str,
) -> String {
    match symbology.from_exchange(symbol, counterparty) {
        Ok(mapped) => mapped,
        Err(e) => {
            warn!("Symbology from_exchange failed for {symbol}: {e}, using untranslated symbol");
            symbol.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableSymbology {
        let mut acme = HashMap::new();
        acme.insert("BTC/USD".to_string(), "tBTCUSD".to_string());
        acme.insert("ETH/USD".to_string(), "tETHUSD".to_string());
        let mut tables = HashMap::new();
        tables.insert("acme".to_string(), acme);
        TableSymbology::new(tables, false)
    }

    #[test]
    fn test_passthrough_identity() {
        let symbology = PassthroughSymbology;
        assert_eq!(symbology.to_exchange("tBTCUSD", "any").unwrap(), "tBTCUSD");
        assert_eq!(
            symbology.from_exchange("tBTCUSD", "any").unwrap(),
            "tBTCUSD"
        );
    }

    #[test]
    fn test_table_both_directions() {
        let symbology = table();
        assert_eq!(symbology.to_exchange("BTC/USD", "acme").unwrap(), "tBTCUSD");
        assert_eq!(
            symbology.from_exchange("tBTCUSD", "acme").unwrap(),
            "BTC/USD"
        );
    }

    #[test]
    fn test_strict_table_errors() {
        let symbology = table();
        assert!(matches!(
            symbology.to_exchange("XRP/USD", "acme"),
            Err(SymbologyError::UnmappedSymbol { .. })
        ));
        assert!(matches!(
            symbology.to_exchange("BTC/USD", "unknown"),
            Err(SymbologyError::UnknownCounterparty(_))
        ));
    }

    #[test]
    fn test_passthrough_fallback_flag() {
        let mut tables = HashMap::new();
        tables.insert("acme".to_string(), HashMap::new());
        let symbology = TableSymbology::new(tables, true);
        assert_eq!(symbology.to_exchange("XRP/USD", "acme").unwrap(), "XRP/USD");
        assert_eq!(symbology.to_exchange("XRP/USD", "other").unwrap(), "XRP/USD");
    }

    #[test]
    fn test_resolve_helper_falls_back() {
        let symbology = table();
        assert_eq!(
            resolve_to_exchange(&symbology, "XRP/USD", "acme"),
            "XRP/USD"
        );
        assert_eq!(
            resolve_from_exchange(&symbology, "tXRPUSD", "unknown"),
            "tXRPUSD"
        );
    }
}
