//! GetGems marketplace adapter. Auth is an ordinary `Bearer` key (§6).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::core::error::AdapterError;
use crate::core::traits::{MarketplaceAdapter, RawItem};
use crate::core::types::{Marketplace, SaleRecord, SortKey};

use super::common::{normalize_price, parse_price_str, retry_transient};

const NAME: &str = "getgems";

pub struct GetGemsAdapter {
    client: Client,
    base_url: String,
    auth_token: RwLock<String>,
    timeout: Duration,
    nano_ton_threshold: Decimal,
}

impl GetGemsAdapter {
    pub fn new(base_url: String, auth_token: String, timeout: Duration, nano_ton_threshold: Decimal) -> Self {
        Self {
            client: Client::new(),
            base_url,
            auth_token: RwLock::new(auth_token),
            timeout,
            nano_ton_threshold,
        }
    }

    fn native_sort(sort: SortKey) -> &'static str {
        match sort {
            SortKey::Latest => "listedAt",
            SortKey::PriceAsc => "priceAsc",
            SortKey::PriceDesc => "priceDesc",
            // GetGems lacks native gift-id/rarity sorts; the adapter sorts
            // client-side after fetch for these.
            SortKey::GiftIdAsc
            | SortKey::GiftIdDesc
            | SortKey::ModelRarityAsc
            | SortKey::ModelRarityDesc => "listedAt",
        }
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, AdapterError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&*self.auth_token.read().await)
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
                    message: "401 from GetGems".into(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(AdapterError::Transient {
                    marketplace: NAME.into(),
                    message: "429 from GetGems".into(),
                })
            }
            status if status.is_server_error() => {
                return Err(AdapterError::Transient {
                    marketplace: NAME.into(),
                    message: format!("{status} from GetGems"),
                })
            }
            status if !status.is_success() => {
                return Err(AdapterError::Protocol {
                    marketplace: NAME.into(),
                    message: format!("unexpected status {status} from GetGems"),
                })
            }
            _ => {}
        }

        response.json().await.map_err(|e| AdapterError::Protocol {
            marketplace: NAME.into(),
            message: e.to_string(),
        })
    }

    fn sort_client_side(items: &mut [serde_json::Value], sort: SortKey) {
        match sort {
            SortKey::GiftIdAsc | SortKey::GiftIdDesc => {
                items.sort_by_key(|item| {
                    item.get("number").and_then(|v| v.as_i64()).unwrap_or_default()
                });
                if sort == SortKey::GiftIdDesc {
                    items.reverse();
                }
            }
            SortKey::ModelRarityAsc | SortKey::ModelRarityDesc => {
                items.sort_by(|a, b| {
                    let ra = rarity_key(a);
                    let rb = rarity_key(b);
                    ra.cmp(&rb)
                });
                if sort == SortKey::ModelRarityDesc {
                    items.reverse();
                }
            }
            _ => {}
        }
    }
}

fn rarity_key(item: &serde_json::Value) -> String {
    item.get("rarity")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl MarketplaceAdapter for GetGemsAdapter {
    async fn list_newest(&self, limit: u32, sort: SortKey) -> Result<Vec<RawItem>, AdapterError> {
        let capped = limit.min(Marketplace::Getgems.max_page_size());
        let url = format!(
            "{}/nft/sale?sortBy={}&limit={}",
            self.base_url,
            Self::native_sort(sort),
            capped
        );
        retry_transient(NAME, 3, Duration::from_secs(1), || async {
            let body = self.get_json(&url).await?;
            let mut items: Vec<serde_json::Value> = body
                .get("items")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            Self::sort_client_side(&mut items, sort);
            Ok(items)
        })
        .await
    }

    async fn get_by_id(&self, listing_id: &str) -> Result<Option<RawItem>, AdapterError> {
        let url = format!("{}/nft/{}", self.base_url, listing_id);
        retry_transient(NAME, 3, Duration::from_secs(1), || async {
            match self.get_json(&url).await {
                Ok(body) => Ok(Some(body)),
                Err(AdapterError::Protocol { .. }) => Ok(None),
                Err(other) => Err(other),
            }
        })
        .await
    }

    async fn get_gift_floor(&self, collection: &str) -> Result<Option<Decimal>, AdapterError> {
        let url = format!("{}/collection/{}/stats", self.base_url, collection);
        retry_transient(NAME, 3, Duration::from_secs(1), || async {
            let body = self.get_json(&url).await?;
            Ok(extract_decimal(&body, "floorPrice", self.nano_ton_threshold))
        })
        .await
    }

    async fn get_model_floor(
        &self,
        collection: &str,
        model: &str,
    ) -> Result<Option<Decimal>, AdapterError> {
        let url = format!(
            "{}/collection/{}/attribute/{}/stats",
            self.base_url, collection, model
        );
        retry_transient(NAME, 3, Duration::from_secs(1), || async {
            let body = self.get_json(&url).await?;
            Ok(extract_decimal(&body, "floorPrice", self.nano_ton_threshold))
        })
        .await
    }

    async fn get_model_sales_history(
        &self,
        _collection: &str,
        _model: &str,
        _limit: u32,
    ) -> Result<Vec<SaleRecord>, AdapterError> {
        // Explicit stub (§9 Open Questions): GetGems never provides sales
        // history through this crate, matching the source system.
        Ok(Vec::new())
    }

    async fn refresh_auth(&self, token: String) {
        *self.auth_token.write().await = token;
    }
}

fn extract_decimal(body: &serde_json::Value, field: &str, nano_ton_threshold: Decimal) -> Option<Decimal> {
    let raw = match body.get(field) {
        Some(serde_json::Value::Number(n)) => Decimal::try_from(n.as_f64().unwrap_or_default()).ok(),
        Some(serde_json::Value::String(s)) => parse_price_str(s),
        _ => None,
    }?;
    Some(normalize_price(raw, nano_ton_threshold))
}
