//! Type definitions for KuCoin API responses.

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

/// KuCoin result code for a successful request.
pub const CODE_SUCCESS: &str = "200000";
/// Cancel result code: the order was already fully filled.
pub const CODE_ALREADY_FILLED: &str = "210010";
/// Cancel result code: the order no longer exists.
pub const CODE_ORDER_NOT_FOUND: &str = "210005";

/// Envelope wrapping every KuCoin REST response.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiEnvelope<T> {
    pub code: String,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
}

/// A single account entry from the accounts listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEntry {
    pub currency: String,
    #[serde(rename = "type")]
    pub account_type: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub available: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub holds: Decimal,
}

/// One rung of the margin lending market, sorted ascending by rate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginMarketEntry {
    #[serde(with = "rust_decimal::serde::str")]
    pub daily_int_rate: Decimal,
    pub term: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
}

/// Result of submitting a lend order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLendOrderResult {
    pub order_id: String,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub current_page: u32,
    pub page_size: u32,
    pub total_num: u32,
    pub total_page: u32,
    pub items: Vec<T>,
}

/// An outstanding (not yet fully filled) lend order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveLendOrder {
    pub order_id: String,
    pub currency: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub filled_size: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub daily_int_rate: Decimal,
    pub term: u32,
}

/// Errors surfaced by a lending venue.
///
/// The controller never distinguishes transport failures from semantic ones
/// (empty order id, implausible rate); both land on the same retry paths.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("kucoin api error {code}: {msg}")]
    Api { code: String, msg: String },

    #[error("unexpected response shape: {0}")]
    Decode(String),

    #[error("no main account found for {0}")]
    MissingAccount(String),

    #[error("lending market for {0} is empty")]
    EmptyMarket(String),

    #[error("daily rate {0} is implausibly small")]
    InvalidRate(Decimal),

    #[error("exchange returned an empty order id")]
    EmptyOrderId,

    #[error("active lend orders span {0} pages, expected a single page")]
    TooManyActiveOrders(u32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_envelope_without_data() {
        let envelope: ApiEnvelope<Vec<AccountEntry>> =
            serde_json::from_str(r#"{"code":"400100","msg":"Invalid request"}"#).unwrap();
        assert_eq!(envelope.code, "400100");
        assert_eq!(envelope.msg.as_deref(), Some("Invalid request"));
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_account_entry_string_decimals() {
        let json = r#"{
            "currency": "USDT",
            "type": "main",
            "balance": "120.5",
            "available": "100.5",
            "holds": "20"
        }"#;
        let entry: AccountEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.available, dec!(100.5));
        assert_eq!(entry.holds, dec!(20));
    }

    #[test]
    fn test_paginated_active_orders() {
        let json = r#"{
            "code": "200000",
            "data": {
                "currentPage": 1,
                "pageSize": 50,
                "totalNum": 1,
                "totalPage": 1,
                "items": [{
                    "orderId": "5da5a4f0f943c040c2f8501e",
                    "currency": "USDT",
                    "size": "80",
                    "filledSize": "20",
                    "dailyIntRate": "0.001",
                    "term": 7
                }]
            }
        }"#;
        let envelope: ApiEnvelope<Paginated<ActiveLendOrder>> =
            serde_json::from_str(json).unwrap();
        let page = envelope.data.unwrap();
        assert_eq!(page.total_page, 1);
        assert_eq!(page.items[0].daily_int_rate, dec!(0.001));
    }
}
