//! MRKT marketplace adapter. Auth is a `tma `-prefixed Telegram init-data
//! string (§6), and every item must be checked for a 32-hex `hash_32`
//! searching fields in priority order (§4.1).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::core::error::AdapterError;
use crate::core::traits::{MarketplaceAdapter, RawItem};
use crate::core::types::{Marketplace, SaleRecord, SortKey};

use super::common::{hash32_from_dashed, is_hash32, normalize_price, parse_price_str, retry_transient};

const NAME: &str = "mrkt";

/// Fields searched, in order, for a 32-hex-character hash (§4.1). `mrkt_hash`
/// and `id` are checked explicitly first; this list covers the remaining
/// fallbacks.
const HASH_FALLBACK_FIELDS: &[&str] = &["nft_hash", "token_hash", "hash"];

pub struct MrktAdapter {
    client: Client,
    base_url: String,
    auth_token: RwLock<String>,
    timeout: Duration,
    nano_ton_threshold: Decimal,
}

impl MrktAdapter {
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
            SortKey::Latest => "created_desc",
            SortKey::PriceAsc => "price_asc",
            SortKey::PriceDesc => "price_desc",
            SortKey::GiftIdAsc => "number_asc",
            SortKey::GiftIdDesc => "number_desc",
            // MRKT has no native rarity sort; the adapter sorts client-side.
            SortKey::ModelRarityAsc | SortKey::ModelRarityDesc => "created_desc",
        }
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, AdapterError> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("tma {}", &*self.auth_token.read().await))
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
                    message: "401 from MRKT".into(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(AdapterError::Transient {
                    marketplace: NAME.into(),
                    message: "429 from MRKT".into(),
                })
            }
            status if status.is_server_error() => {
                return Err(AdapterError::Transient {
                    marketplace: NAME.into(),
                    message: format!("{status} from MRKT"),
                })
            }
            status if !status.is_success() => {
                return Err(AdapterError::Protocol {
                    marketplace: NAME.into(),
                    message: format!("unexpected status {status} from MRKT"),
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
impl MarketplaceAdapter for MrktAdapter {
    async fn list_newest(&self, limit: u32, sort: SortKey) -> Result<Vec<RawItem>, AdapterError> {
        let capped = limit.min(Marketplace::Mrkt.max_page_size());
        let url = format!(
            "{}/items?sort={}&limit={}",
            self.base_url,
            Self::native_sort(sort),
            capped
        );
        retry_transient(NAME, 3, Duration::from_secs(1), || async {
            let body = self.get_json(&url).await?;
            let items = body
                .get("data")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            Ok(items)
        })
        .await
    }

    async fn get_by_id(&self, listing_id: &str) -> Result<Option<RawItem>, AdapterError> {
        let url = format!("{}/items/{}", self.base_url, listing_id);
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
            Ok(extract_decimal(&body, "floor", self.nano_ton_threshold))
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
            Ok(extract_decimal(&body, "floor", self.nano_ton_threshold))
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

/// Extracts a 32-hex hash from a raw MRKT item, searching fields in priority
/// order: `mrkt_hash`, then `id` if it is already a 32-hex (dashes
/// stripped), then the fallback field list (§4.1). Returns `None` if no
/// field qualifies.
pub fn extract_mrkt_hash(item: &serde_json::Value) -> Option<String> {
    if let Some(candidate) = item.get("mrkt_hash").and_then(|v| v.as_str()) {
        if is_hash32(candidate) {
            return Some(candidate.to_string());
        }
        if let Some(hash) = hash32_from_dashed(candidate) {
            return Some(hash);
        }
    }

    if let Some(id) = item.get("id").and_then(|v| v.as_str()) {
        if is_hash32(id) {
            return Some(id.to_string());
        }
        if let Some(hash) = hash32_from_dashed(id) {
            return Some(hash);
        }
    }

    for field in HASH_FALLBACK_FIELDS {
        if let Some(candidate) = item.get(*field).and_then(|v| v.as_str()) {
            if is_hash32(candidate) {
                return Some(candidate.to_string());
            }
            if let Some(hash) = hash32_from_dashed(candidate) {
                return Some(hash);
            }
        }
    }

    None
}

fn extract_decimal(body: &serde_json::Value, field: &str, nano_ton_threshold: Decimal) -> Option<Decimal> {
    let raw = match body.get(field) {
        Some(serde_json::Value::Number(n)) => Decimal::try_from(n.as_f64().unwrap_or_default()).ok(),
        Some(serde_json::Value::String(s)) => parse_price_str(s),
        _ => None,
    }?;
    Some(normalize_price(raw, nano_ton_threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_mrkt_hash_field() {
        let item = json!({ "mrkt_hash": "0123456789abcdef0123456789abcdef", "id": "not-a-hash" });
        assert_eq!(
            extract_mrkt_hash(&item),
            Some("0123456789abcdef0123456789abcdef".to_string())
        );
    }

    #[test]
    fn falls_back_to_dashed_id() {
        let item = json!({ "id": "01234567-89ab-cdef-0123-456789abcdef" });
        assert_eq!(
            extract_mrkt_hash(&item),
            Some("0123456789abcdef0123456789abcdef".to_string())
        );
    }

    #[test]
    fn falls_back_to_other_fields() {
        let item = json!({ "id": "not-a-hash", "token_hash": "abcdefabcdefabcdefabcdefabcdefab" });
        assert_eq!(
            extract_mrkt_hash(&item),
            Some("abcdefabcdefabcdefabcdefabcdefab".to_string())
        );
    }

    #[test]
    fn returns_none_when_nothing_qualifies() {
        let item = json!({ "id": "not-a-hash" });
        assert_eq!(extract_mrkt_hash(&item), None);
    }
}
