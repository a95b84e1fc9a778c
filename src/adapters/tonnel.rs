//! Tonnel marketplace adapter — the price-history oracle (§2). Auth is
//! passed as a JSON field inside the request body rather than a header
//! (§6), and every outbound call goes through a shared process-wide rate
//! gate to avoid CloudFlare throttling (§4.1, §9).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;

use crate::core::error::AdapterError;
use crate::core::traits::{MarketplaceAdapter, RawItem};
use crate::core::types::{Marketplace, SaleRecord, SortKey};

use super::common::{normalize_price, parse_price_str, retry_transient, RateGate};

const NAME: &str = "tonnel";

pub struct TonnelAdapter {
    client: Client,
    base_url: String,
    auth_token: RwLock<String>,
    timeout: Duration,
    rate_gate: Arc<RateGate>,
    nano_ton_threshold: Decimal,
}

impl TonnelAdapter {
    pub fn new(
        base_url: String,
        auth_token: String,
        timeout: Duration,
        rate_gate: Arc<RateGate>,
        nano_ton_threshold: Decimal,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url,
            auth_token: RwLock::new(auth_token),
            timeout,
            rate_gate,
            nano_ton_threshold,
        }
    }

    fn native_sort(sort: SortKey) -> &'static str {
        match sort {
            SortKey::Latest => "listed_at",
            SortKey::PriceAsc => "price_asc",
            SortKey::PriceDesc => "price_desc",
            SortKey::GiftIdAsc => "gift_id_asc",
            SortKey::GiftIdDesc => "gift_id_desc",
            SortKey::ModelRarityAsc => "model_rarity_asc",
            SortKey::ModelRarityDesc => "model_rarity_desc",
        }
    }

    async fn post_json(
        &self,
        path: &str,
        mut body: serde_json::Value,
    ) -> Result<serde_json::Value, AdapterError> {
        self.rate_gate.wait_turn().await;

        if let serde_json::Value::Object(ref mut map) = body {
            map.insert("authData".to_string(), json!(self.auth_token.read().await.clone()));
        }

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    AdapterError::Transient {
                        marketplace: NAME.into(),
                        message: e.to_string(),
                    }
                } else {
                    AdapterError::Protocol {
                        marketplace: NAME.into(),
                        message: e.to_string(),
                    }
                }
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                return Err(AdapterError::Auth {
                    marketplace: NAME.into(),
                    message: "401 from Tonnel".into(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(AdapterError::Transient {
                    marketplace: NAME.into(),
                    message: "429 from Tonnel".into(),
                })
            }
            status if status.is_server_error() => {
                return Err(AdapterError::Transient {
                    marketplace: NAME.into(),
                    message: format!("{status} from Tonnel"),
                })
            }
            status if !status.is_success() => {
                return Err(AdapterError::Protocol {
                    marketplace: NAME.into(),
                    message: format!("unexpected status {status} from Tonnel"),
                })
            }
            _ => {}
        }

        response.json().await.map_err(|e| AdapterError::Protocol {
            marketplace: NAME.into(),
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TonnelSale {
    #[serde(alias = "giftNum", alias = "gift_num")]
    gift_number: Option<serde_json::Value>,
    price: serde_json::Value,
    #[serde(alias = "soldAt")]
    sold_at: Option<String>,
}

#[async_trait]
impl MarketplaceAdapter for TonnelAdapter {
    async fn list_newest(&self, limit: u32, sort: SortKey) -> Result<Vec<RawItem>, AdapterError> {
        let capped = limit.min(Marketplace::Tonnel.max_page_size());
        let body = json!({
            "page": 1,
            "limit": capped,
            "sort": Self::native_sort(sort),
        });
        retry_transient(NAME, 3, Duration::from_secs(1), || async {
            let response = self.post_json("/gifts/search", body.clone()).await?;
            let items = response
                .get("items")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            Ok(items)
        })
        .await
    }

    async fn get_by_id(&self, listing_id: &str) -> Result<Option<RawItem>, AdapterError> {
        let body = json!({ "gift_id": listing_id });
        retry_transient(NAME, 3, Duration::from_secs(1), || async {
            match self.post_json("/gifts/get", body.clone()).await {
                Ok(item) if item.is_null() => Ok(None),
                Ok(item) => Ok(Some(item)),
                Err(AdapterError::Protocol { .. }) => Ok(None),
                Err(other) => Err(other),
            }
        })
        .await
    }

    async fn get_gift_floor(&self, collection: &str) -> Result<Option<Decimal>, AdapterError> {
        let body = json!({ "collection": collection });
        retry_transient(NAME, 3, Duration::from_secs(1), || async {
            let response = self.post_json("/floor/gift", body.clone()).await?;
            Ok(extract_decimal(&response, "floor", self.nano_ton_threshold))
        })
        .await
    }

    async fn get_model_floor(
        &self,
        collection: &str,
        model: &str,
    ) -> Result<Option<Decimal>, AdapterError> {
        let body = json!({ "collection": collection, "model": model });
        retry_transient(NAME, 3, Duration::from_secs(1), || async {
            let response = self.post_json("/floor/model", body.clone()).await?;
            Ok(extract_decimal(&response, "floor", self.nano_ton_threshold))
        })
        .await
    }

    async fn get_model_sales_history(
        &self,
        collection: &str,
        model: &str,
        limit: u32,
    ) -> Result<Vec<SaleRecord>, AdapterError> {
        let body = json!({
            "collection": collection,
            "model": model,
            "limit": limit,
        });
        retry_transient(NAME, 3, Duration::from_secs(1), || async {
            let response = self.post_json("/sales/history", body.clone()).await?;
            let raw_sales: Vec<TonnelSale> = response
                .get("sales")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| AdapterError::Protocol {
                    marketplace: NAME.into(),
                    message: e.to_string(),
                })?
                .unwrap_or_default();

            let sales = raw_sales
                .into_iter()
                .filter_map(|sale| {
                    let price_ton = extract_decimal_value(&sale.price, self.nano_ton_threshold)?;
                    let gift_number = sale
                        .gift_number
                        .as_ref()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .or_else(|| sale.gift_number.as_ref().map(|v| v.to_string()))
                        .unwrap_or_else(|| crate::core::types::NOT_AVAILABLE.to_string());
                    let sold_at = sale
                        .sold_at
                        .as_deref()
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(Utc::now);
                    Some(SaleRecord {
                        marketplace: Marketplace::Tonnel,
                        gift_number,
                        price_ton,
                        sold_at,
                    })
                })
                .collect();
            Ok(sales)
        })
        .await
    }

    async fn refresh_auth(&self, token: String) {
        *self.auth_token.write().await = token;
    }
}

fn extract_decimal(body: &serde_json::Value, field: &str, nano_ton_threshold: Decimal) -> Option<Decimal> {
    body.get(field)
        .and_then(|v| extract_decimal_value(v, nano_ton_threshold))
}

fn extract_decimal_value(value: &serde_json::Value, nano_ton_threshold: Decimal) -> Option<Decimal> {
    let raw = match value {
        serde_json::Value::Number(n) => Decimal::try_from(n.as_f64().unwrap_or_default()).ok(),
        serde_json::Value::String(s) => parse_price_str(s),
        _ => None,
    }?;
    Some(normalize_price(raw, nano_ton_threshold))
}
