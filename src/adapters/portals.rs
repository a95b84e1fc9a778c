//! Portals marketplace adapter. Auth is a `tma `-prefixed Telegram init-data
//! string passed in the `Authorization` header (§6).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::core::error::AdapterError;
use crate::core::traits::{MarketplaceAdapter, RawItem};
use crate::core::types::{Marketplace, SaleRecord, SortKey};

use super::common::{normalize_price, parse_price_str, retry_transient};

const NAME: &str = "portals";

pub struct PortalsAdapter {
    client: Client,
    base_url: String,
    auth_token: RwLock<String>,
    timeout: Duration,
    nano_ton_threshold: Decimal,
}

impl PortalsAdapter {
    pub fn new(base_url: String, auth_token: String, timeout: Duration, nano_ton_threshold: Decimal) -> Self {
        Self {
            client: Client::new(),
            base_url,
            auth_token: RwLock::new(auth_token),
            timeout,
            nano_ton_threshold,
        }
    }

    async fn auth_header(&self) -> String {
        format!("tma {}", &*self.auth_token.read().await)
    }

    fn native_sort(sort: SortKey) -> &'static str {
        match sort {
            SortKey::Latest => "listed_at",
            SortKey::PriceAsc => "price",
            SortKey::PriceDesc => "-price",
            SortKey::GiftIdAsc => "external_collection_number",
            SortKey::GiftIdDesc => "-external_collection_number",
            // Portals has no native rarity sort; the adapter sorts client-side.
            SortKey::ModelRarityAsc | SortKey::ModelRarityDesc => "listed_at",
        }
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, AdapterError> {
        let response = self
            .client
            .get(url)
            .header("Authorization", self.auth_header().await)
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
                    message: "401 from Portals".into(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(AdapterError::Transient {
                    marketplace: NAME.into(),
                    message: "429 from Portals".into(),
                })
            }
            status if status.is_server_error() => {
                return Err(AdapterError::Transient {
                    marketplace: NAME.into(),
                    message: format!("{status} from Portals"),
                })
            }
            status if !status.is_success() => {
                return Err(AdapterError::Protocol {
                    marketplace: NAME.into(),
                    message: format!("unexpected status {status} from Portals"),
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

#[async_trait]
impl MarketplaceAdapter for PortalsAdapter {
    async fn list_newest(&self, limit: u32, sort: SortKey) -> Result<Vec<RawItem>, AdapterError> {
        let capped = limit.min(Marketplace::Portals.max_page_size());
        let sort_field = Self::native_sort(sort);
        let url = format!(
            "{}/nfts/search?sort_by={}&limit={}",
            self.base_url, sort_field, capped
        );
        retry_transient(NAME, 3, Duration::from_secs(1), || async {
            let body = self.get_json(&url).await?;
            let items = body
                .get("results")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            Ok(items)
        })
        .await
    }

    async fn get_by_id(&self, listing_id: &str) -> Result<Option<RawItem>, AdapterError> {
        let url = format!("{}/nfts/{}", self.base_url, listing_id);
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
        let url = format!("{}/collections/{}/floor", self.base_url, collection);
        retry_transient(NAME, 3, Duration::from_secs(1), || async {
            let body = self.get_json(&url).await?;
            Ok(extract_floor(&body, "floor_price", self.nano_ton_threshold))
        })
        .await
    }

    async fn get_model_floor(
        &self,
        collection: &str,
        model: &str,
    ) -> Result<Option<Decimal>, AdapterError> {
        let url = format!(
            "{}/collections/{}/models/{}/floor",
            self.base_url, collection, model
        );
        retry_transient(NAME, 3, Duration::from_secs(1), || async {
            let body = self.get_json(&url).await?;
            Ok(extract_floor(&body, "floor_price", self.nano_ton_threshold))
        })
        .await
    }

    async fn get_model_sales_history(
        &self,
        _collection: &str,
        _model: &str,
        _limit: u32,
    ) -> Result<Vec<SaleRecord>, AdapterError> {
        // Only Tonnel is required to implement sales history (§4.1).
        Ok(Vec::new())
    }

    async fn refresh_auth(&self, token: String) {
        *self.auth_token.write().await = token;
    }
}

fn extract_floor(body: &serde_json::Value, field: &str, nano_ton_threshold: Decimal) -> Option<Decimal> {
    let raw = match body.get(field) {
        Some(serde_json::Value::Number(n)) => Decimal::try_from(n.as_f64().unwrap_or_default()).ok(),
        Some(serde_json::Value::String(s)) => parse_price_str(s),
        _ => None,
    }?;
    Some(normalize_price(raw, nano_ton_threshold))
}
