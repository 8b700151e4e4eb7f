//! KuCoin REST API client.

use crate::config::KucoinConfig;
use crate::exchange::traits::{CancelOutcome, LendingVenue};
use crate::exchange::types::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

/// The one asset this bot lends.
const LEND_CURRENCY: &str = "USDT";

/// Page size used when listing active lend orders.
const ACTIVE_ORDERS_PAGE_SIZE: u32 = 50;

/// Rates below this are treated as bogus market data, not usable quotes.
const RATE_EPSILON: Decimal = dec!(0.000000001);

/// KuCoin API client for margin lending (API key version 2 signing).
pub struct KucoinClient {
    http: Client,
    api_key: String,
    api_secret: String,
    api_passphrase: String,
    base_url: String,
    term_days: u32,
}

impl KucoinClient {
    /// Create a new KuCoin client from configuration.
    pub fn new(config: &KucoinConfig, term_days: u32) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            api_passphrase: config.api_passphrase.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            term_days,
        })
    }

    /// Generate a base64 HMAC-SHA256 signature for authenticated requests.
    fn sign(&self, payload: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    /// Get current timestamp in milliseconds.
    fn timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis() as u64
    }

    /// Send a signed request and decode the KuCoin response envelope.
    ///
    /// The prehash string is `timestamp + METHOD + path_with_query + body`,
    /// and the passphrase itself is HMAC-signed (key version 2).
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<serde_json::Value>,
    ) -> Result<ApiEnvelope<T>, VenueError> {
        let body_str = body.as_ref().map(|b| b.to_string()).unwrap_or_default();
        let timestamp = Self::timestamp().to_string();
        let prehash = format!("{timestamp}{method}{path_and_query}{body_str}");
        let signature = self.sign(&prehash);
        let passphrase = self.sign(&self.api_passphrase);

        let url = format!("{}{}", self.base_url, path_and_query);
        debug!(%method, %path_and_query, "sending kucoin request");

        let mut request = self
            .http
            .request(method, &url)
            .header("KC-API-KEY", &self.api_key)
            .header("KC-API-SIGN", signature)
            .header("KC-API-TIMESTAMP", timestamp)
            .header("KC-API-PASSPHRASE", passphrase)
            .header("KC-API-KEY-VERSION", "2");

        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request.send().await?;
        Ok(response.json().await?)
    }
}

/// Unwrap the envelope, mapping non-success codes and a missing data field
/// to errors.
fn take_data<T>(envelope: ApiEnvelope<T>) -> Result<T, VenueError> {
    if envelope.code != CODE_SUCCESS {
        return Err(VenueError::Api {
            code: envelope.code,
            msg: envelope.msg.unwrap_or_default(),
        });
    }
    envelope
        .data
        .ok_or_else(|| VenueError::Decode("missing data field".to_string()))
}

#[async_trait]
impl LendingVenue for KucoinClient {
    #[instrument(skip(self))]
    async fn available_balance(&self) -> Result<Decimal, VenueError> {
        let path = format!(
            "/api/v1/accounts?currency={}&type=main",
            urlencoding::encode(LEND_CURRENCY)
        );
        let envelope = self.request::<Vec<AccountEntry>>(Method::GET, &path, None).await?;
        let accounts = take_data(envelope)?;

        let main = accounts
            .first()
            .ok_or_else(|| VenueError::MissingAccount(LEND_CURRENCY.to_string()))?;

        Ok(main.available)
    }

    #[instrument(skip(self))]
    async fn min_daily_rate(&self) -> Result<Decimal, VenueError> {
        let path = format!(
            "/api/v1/margin/market?currency={}&term={}",
            urlencoding::encode(LEND_CURRENCY),
            self.term_days
        );
        let envelope = self
            .request::<Vec<MarginMarketEntry>>(Method::GET, &path, None)
            .await?;
        let market = take_data(envelope)?;

        // The market listing is sorted ascending by rate.
        let best = market
            .first()
            .ok_or_else(|| VenueError::EmptyMarket(LEND_CURRENCY.to_string()))?;

        if best.daily_int_rate < RATE_EPSILON {
            return Err(VenueError::InvalidRate(best.daily_int_rate));
        }

        Ok(best.daily_int_rate)
    }

    #[instrument(skip(self))]
    async fn create_lend_order(
        &self,
        amount: Decimal,
        rate: Decimal,
    ) -> Result<String, VenueError> {
        let body = serde_json::json!({
            "currency": LEND_CURRENCY,
            "size": amount.to_string(),
            "dailyIntRate": rate.to_string(),
            "term": self.term_days.to_string(),
        });
        let envelope = self
            .request::<CreateLendOrderResult>(Method::POST, "/api/v1/margin/lend", Some(body))
            .await?;
        let result = take_data(envelope)?;

        if result.order_id.is_empty() {
            return Err(VenueError::EmptyOrderId);
        }

        Ok(result.order_id)
    }

    #[instrument(skip(self))]
    async fn active_lend_orders(
        &self,
        page: u32,
    ) -> Result<Paginated<ActiveLendOrder>, VenueError> {
        let path = format!(
            "/api/v1/margin/lend/active?currency={}&currentPage={}&pageSize={}",
            urlencoding::encode(LEND_CURRENCY),
            page,
            ACTIVE_ORDERS_PAGE_SIZE
        );
        let envelope = self.request(Method::GET, &path, None).await?;
        take_data(envelope)
    }

    #[instrument(skip(self))]
    async fn cancel_lend_order(&self, order_id: &str) -> Result<CancelOutcome, VenueError> {
        let path = format!("/api/v1/margin/lend/{}", urlencoding::encode(order_id));
        // The cancel result is carried in the envelope code itself, so no
        // data extraction here.
        let envelope: ApiEnvelope<serde_json::Value> =
            self.request(Method::DELETE, &path, None).await?;

        Ok(CancelOutcome::from_code(
            &envelope.code,
            envelope.msg.as_deref().unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> KucoinClient {
        KucoinClient::new(
            &KucoinConfig {
                api_key: "key".to_string(),
                api_secret: "secret".to_string(),
                api_passphrase: "phrase".to_string(),
                base_url: server.uri(),
            },
            7,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_available_balance_reads_main_account() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts"))
            .and(query_param("currency", "USDT"))
            .and(query_param("type", "main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "200000",
                "data": [{
                    "currency": "USDT",
                    "type": "main",
                    "balance": "120.5",
                    "available": "100.5",
                    "holds": "20"
                }]
            })))
            .mount(&server)
            .await;

        let balance = test_client(&server).available_balance().await.unwrap();
        assert_eq!(balance, dec!(100.5));
    }

    #[tokio::test]
    async fn test_available_balance_missing_account() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "200000",
                "data": []
            })))
            .mount(&server)
            .await;

        let err = test_client(&server).available_balance().await.unwrap_err();
        assert!(matches!(err, VenueError::MissingAccount(_)));
    }

    #[tokio::test]
    async fn test_api_error_code_is_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "400100",
                "msg": "Invalid request"
            })))
            .mount(&server)
            .await;

        let err = test_client(&server).available_balance().await.unwrap_err();
        match err {
            VenueError::Api { code, msg } => {
                assert_eq!(code, "400100");
                assert_eq!(msg, "Invalid request");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_min_daily_rate_takes_best_rung() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/margin/market"))
            .and(query_param("currency", "USDT"))
            .and(query_param("term", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "200000",
                "data": [
                    { "dailyIntRate": "0.0005", "term": 7, "size": "1000" },
                    { "dailyIntRate": "0.0008", "term": 7, "size": "500" }
                ]
            })))
            .mount(&server)
            .await;

        let rate = test_client(&server).min_daily_rate().await.unwrap();
        assert_eq!(rate, dec!(0.0005));
    }

    #[tokio::test]
    async fn test_min_daily_rate_rejects_implausible_rate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/margin/market"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "200000",
                "data": [{ "dailyIntRate": "0", "term": 7, "size": "1000" }]
            })))
            .mount(&server)
            .await;

        let err = test_client(&server).min_daily_rate().await.unwrap_err();
        assert!(matches!(err, VenueError::InvalidRate(_)));
    }

    #[tokio::test]
    async fn test_min_daily_rate_empty_market() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/margin/market"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "200000",
                "data": []
            })))
            .mount(&server)
            .await;

        let err = test_client(&server).min_daily_rate().await.unwrap_err();
        assert!(matches!(err, VenueError::EmptyMarket(_)));
    }

    #[tokio::test]
    async fn test_create_lend_order_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/margin/lend"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "200000",
                "data": { "orderId": "5da5a4f0f943c040c2f8501e" }
            })))
            .mount(&server)
            .await;

        let id = test_client(&server)
            .create_lend_order(dec!(80), dec!(0.001))
            .await
            .unwrap();
        assert_eq!(id, "5da5a4f0f943c040c2f8501e");
    }

    #[tokio::test]
    async fn test_create_lend_order_empty_id_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/margin/lend"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "200000",
                "data": { "orderId": "" }
            })))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .create_lend_order(dec!(80), dec!(0.001))
            .await
            .unwrap_err();
        assert!(matches!(err, VenueError::EmptyOrderId));
    }

    #[tokio::test]
    async fn test_active_lend_orders_requests_one_page_of_50() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/margin/lend/active"))
            .and(query_param("currentPage", "1"))
            .and(query_param("pageSize", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "200000",
                "data": {
                    "currentPage": 1,
                    "pageSize": 50,
                    "totalNum": 1,
                    "totalPage": 1,
                    "items": [{
                        "orderId": "abc",
                        "currency": "USDT",
                        "size": "80",
                        "filledSize": "0",
                        "dailyIntRate": "0.001",
                        "term": 7
                    }]
                }
            })))
            .mount(&server)
            .await;

        let page = test_client(&server).active_lend_orders(1).await.unwrap();
        assert_eq!(page.total_page, 1);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].order_id, "abc");
    }

    #[tokio::test]
    async fn test_cancel_outcomes_by_code() {
        for (code, expected) in [
            ("200000", CancelOutcome::Cancelled),
            ("210010", CancelOutcome::AlreadyFilled),
            ("210005", CancelOutcome::NotFound),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("DELETE"))
                .and(path("/api/v1/margin/lend/oid-1"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "code": code,
                    "data": {}
                })))
                .mount(&server)
                .await;

            let outcome = test_client(&server).cancel_lend_order("oid-1").await.unwrap();
            assert_eq!(outcome, expected);
        }
    }

    #[tokio::test]
    async fn test_cancel_unknown_code_is_other() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/margin/lend/oid-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "500000",
                "msg": "order in cancelling"
            })))
            .mount(&server)
            .await;

        let outcome = test_client(&server).cancel_lend_order("oid-1").await.unwrap();
        assert_eq!(
            outcome,
            CancelOutcome::Other {
                code: "500000".to_string(),
                msg: "order in cancelling".to_string(),
            }
        );
        assert!(!outcome.is_resolved());
    }
}
