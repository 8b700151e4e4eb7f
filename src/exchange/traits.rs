//! Venue-agnostic capability trait for margin lending.
//!
//! The lending cycle controller only ever talks to a venue through this
//! trait, so tests can drive the state machine against a mocked venue and
//! other exchanges could be slotted in behind the same five operations.

use crate::exchange::types::{
    ActiveLendOrder, Paginated, VenueError, CODE_ALREADY_FILLED, CODE_ORDER_NOT_FOUND,
    CODE_SUCCESS,
};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Classified outcome of a cancel request.
///
/// KuCoin reports the result through the envelope code rather than an HTTP
/// status; only `Cancelled` and `AlreadyFilled` resolve the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The order was cancelled ("200000").
    Cancelled,
    /// The order filled before the cancel landed ("210010").
    AlreadyFilled,
    /// The exchange does not know the order ("210005").
    NotFound,
    /// Any other result code.
    Other { code: String, msg: String },
}

impl CancelOutcome {
    /// Map a KuCoin cancel result code to an outcome.
    pub fn from_code(code: &str, msg: &str) -> Self {
        match code {
            CODE_SUCCESS => CancelOutcome::Cancelled,
            CODE_ALREADY_FILLED => CancelOutcome::AlreadyFilled,
            CODE_ORDER_NOT_FOUND => CancelOutcome::NotFound,
            _ => CancelOutcome::Other {
                code: code.to_string(),
                msg: msg.to_string(),
            },
        }
    }

    /// Whether the order is terminally resolved (filled or cancelled).
    pub fn is_resolved(&self) -> bool {
        matches!(self, CancelOutcome::Cancelled | CancelOutcome::AlreadyFilled)
    }
}

/// Operations a lending venue must provide to the cycle controller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LendingVenue: Send + Sync {
    /// Available balance of the lending currency in the main account.
    async fn available_balance(&self) -> Result<Decimal, VenueError>;

    /// Lowest currently-offered daily interest rate for the lending term.
    ///
    /// Fails with `VenueError::InvalidRate` when the best rate is below the
    /// plausibility epsilon rather than returning a useless near-zero rate.
    async fn min_daily_rate(&self) -> Result<Decimal, VenueError>;

    /// Submit a lend offer; returns the new order id.
    async fn create_lend_order(
        &self,
        amount: Decimal,
        rate: Decimal,
    ) -> Result<String, VenueError>;

    /// One page (size 50) of the account's outstanding lend orders.
    async fn active_lend_orders(
        &self,
        page: u32,
    ) -> Result<Paginated<ActiveLendOrder>, VenueError>;

    /// Attempt to cancel an outstanding lend order.
    async fn cancel_lend_order(&self, order_id: &str) -> Result<CancelOutcome, VenueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_outcome_from_code() {
        assert_eq!(
            CancelOutcome::from_code("200000", ""),
            CancelOutcome::Cancelled
        );
        assert_eq!(
            CancelOutcome::from_code("210010", ""),
            CancelOutcome::AlreadyFilled
        );
        assert_eq!(
            CancelOutcome::from_code("210005", ""),
            CancelOutcome::NotFound
        );
        let other = CancelOutcome::from_code("400100", "Invalid request");
        assert_eq!(
            other,
            CancelOutcome::Other {
                code: "400100".to_string(),
                msg: "Invalid request".to_string(),
            }
        );
    }

    #[test]
    fn test_only_cancelled_and_filled_resolve() {
        assert!(CancelOutcome::Cancelled.is_resolved());
        assert!(CancelOutcome::AlreadyFilled.is_resolved());
        assert!(!CancelOutcome::NotFound.is_resolved());
        assert!(!CancelOutcome::Other {
            code: "500000".to_string(),
            msg: String::new(),
        }
        .is_resolved());
    }
}
