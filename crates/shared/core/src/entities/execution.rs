use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One fill against an order
///
/// Immutable value. Quantity is stored as a non-negative magnitude; the
/// direction of the trade is carried exclusively by the order's `Side`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Exchange-assigned execution identifier
    pub exec_id: i64,
    /// Fill price
    pub price: Decimal,
    /// Fill quantity (magnitude)
    pub qty: Decimal,
}

impl Execution {
    /// Create an execution, normalizing quantity to a magnitude
    pub fn new(exec_id: i64, price: Decimal, qty: Decimal) -> Self {
        Self {
            exec_id,
            price,
            qty: qty.abs(),
        }
    }
}

/// Sum of execution quantities (magnitudes)
pub fn total_qty(executions: &[Execution]) -> Decimal {
    executions.iter().map(|e| e.qty).sum()
}

/// Quantity-weighted average fill price, zero when nothing has filled
pub fn avg_price(executions: &[Execution]) -> Decimal {
    let qty = total_qty(executions);
    if qty.is_zero() {
        return Decimal::ZERO;
    }
    let notional: Decimal = executions.iter().map(|e| e.price * e.qty).sum();
    notional / qty
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_qty_normalized_to_magnitude() {
        let exec = Execution::new(1, dec!(100), dec!(-0.5));
        assert_eq!(exec.qty, dec!(0.5));
    }

    #[test]
    fn test_weighted_average_price() {
        let executions = vec![
            Execution::new(1, dec!(1600), dec!(0.1)),
            Execution::new(2, dec!(1650), dec!(0.5)),
            Execution::new(3, dec!(1675), dec!(1.2)),
        ];

        assert_eq!(total_qty(&executions), dec!(1.8));

        // (1600*0.1 + 1650*0.5 + 1675*1.2) / 1.8 = 2995 / 1.8
        let avg = avg_price(&executions);
        assert!(avg > dec!(1663.88) && avg < dec!(1663.90));
    }

    #[test]
    fn test_avg_price_empty() {
        assert_eq!(avg_price(&[]), Decimal::ZERO);
    }
}
