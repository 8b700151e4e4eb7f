//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::Decimal;

/// Funds eligible for a new lend offer: available minus the protected
/// reserve, clamped at zero and floored to whole currency units (KuCoin
/// accepts whole-unit lend sizes).
pub fn lendable_amount(available: Decimal, reserved: Decimal) -> Decimal {
    (available - reserved).max(Decimal::ZERO).floor()
}
