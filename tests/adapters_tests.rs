//! End-to-end adapter tests against a mocked HTTP server: verifies each
//! marketplace adapter's request shape (auth header/body, paths) and
//! response parsing, plus the shared retry-on-transient behavior.

use std::sync::Arc;
use std::time::Duration;

use giftwatch::adapters::common::RateGate;
use giftwatch::adapters::{GetGemsAdapter, MrktAdapter, PortalsAdapter, TonnelAdapter};
use giftwatch::core::traits::MarketplaceAdapter;
use giftwatch::core::types::SortKey;
use rust_decimal::Decimal;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn portals_adapter_sends_tma_auth_header_and_parses_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nfts/search"))
        .and(header("Authorization", "tma test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [{"id": "abc", "collectionName": "PlushPepe", "price": 12.5}],
        })))
        .mount(&server)
        .await;

    let adapter = PortalsAdapter::new(server.uri(), "test-token".to_string(), Duration::from_secs(5), Decimal::from(1000));
    let items = adapter.list_newest(20, SortKey::Latest).await.unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], "abc");
}

#[tokio::test]
async fn portals_adapter_retries_on_503_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nfts/search"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/nfts/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})))
        .mount(&server)
        .await;

    let adapter = PortalsAdapter::new(server.uri(), "tok".to_string(), Duration::from_secs(5), Decimal::from(1000));
    let items = adapter.list_newest(10, SortKey::Latest).await.unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn portals_adapter_maps_401_to_auth_error_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nfts/search"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = PortalsAdapter::new(server.uri(), "tok".to_string(), Duration::from_secs(5), Decimal::from(1000));
    let err = adapter.list_newest(10, SortKey::Latest).await.unwrap_err();
    assert!(matches!(err, giftwatch::core::error::AdapterError::Auth { .. }));
}

#[tokio::test]
async fn tonnel_adapter_passes_auth_in_json_body_not_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gifts/search"))
        .and(body_json(
            serde_json::json!({"page": 1, "limit": 20, "sort": "listed_at", "authData": "secret"}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
        .mount(&server)
        .await;

    let rate_gate = RateGate::new(Duration::from_millis(1));
    let adapter = TonnelAdapter::new(
        server.uri(),
        "secret".to_string(),
        Duration::from_secs(5),
        rate_gate,
        Decimal::from(1000),
    );
    let items = adapter.list_newest(20, SortKey::Latest).await.unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn tonnel_adapter_parses_sales_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sales/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sales": [
                {"giftNum": "42", "price": 3.5, "soldAt": "2026-07-20T10:00:00Z"},
            ],
        })))
        .mount(&server)
        .await;

    let rate_gate = RateGate::new(Duration::from_millis(1));
    let adapter = TonnelAdapter::new(server.uri(), "tok".to_string(), Duration::from_secs(5), rate_gate, Decimal::from(1000));
    let sales = adapter
        .get_model_sales_history("PlushPepe", "Gold", 5)
        .await
        .unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].gift_number, "42");
}

#[tokio::test]
async fn mrkt_adapter_fetches_collection_floor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/PlushPepe/floor"))
        .and(header("Authorization", "tma mrkt-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"floor": "9.9"})))
        .mount(&server)
        .await;

    let adapter = MrktAdapter::new(server.uri(), "mrkt-token".to_string(), Duration::from_secs(5), Decimal::from(1000));
    let floor = adapter.get_gift_floor("PlushPepe").await.unwrap();
    assert!(floor.is_some());
}

#[tokio::test]
async fn getgems_adapter_uses_bearer_auth_and_query_sort() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nft/sale"))
        .and(query_param("sortBy", "priceAsc"))
        .and(header("Authorization", "Bearer gg-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
        .mount(&server)
        .await;

    let adapter = GetGemsAdapter::new(server.uri(), "gg-token".to_string(), Duration::from_secs(5), Decimal::from(1000));
    let items = adapter.list_newest(10, SortKey::PriceAsc).await.unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn getgems_sales_history_is_an_empty_stub() {
    let adapter = GetGemsAdapter::new("http://unused".to_string(), "tok".to_string(), Duration::from_secs(1), Decimal::from(1000));
    let sales = adapter.get_model_sales_history("X", "Y", 10).await.unwrap();
    assert!(sales.is_empty());
}
