//! Listing Normalizer (§4.2) — the single place that owns field-aliasing
//! knowledge across the four marketplaces' heterogeneous JSON shapes.
//! Everything downstream of this module consumes only canonical `Listing`s.

use rust_decimal::Decimal;
use serde_json::Value;

use crate::adapters::mrkt::extract_mrkt_hash;
use crate::adapters::common::{normalize_price, parse_price_str};
use crate::core::types::{Listing, Marketplace, NOT_AVAILABLE};
use crate::links;

const COLLECTION_FIELDS: &[&str] = &["collectionName", "collection_name", "gift_name", "name"];
const MODEL_FIELDS: &[&str] = &["modelName", "model_name", "model"];
const BACKDROP_FIELDS: &[&str] = &["backdropName", "backdrop_name", "backdrop"];
const GIFT_NUMBER_FIELDS: &[&str] = &[
    "giftNumber",
    "gift_number",
    "number",
    "external_collection_number",
    "nftNumber",
];
const PHOTO_FIELDS: &[&str] = &["photoUrl", "photo_url", "image", "imageUrl"];
const PRICE_FIELDS: &[&str] = &["price", "priceTon", "price_ton", "amount"];

/// Converts one marketplace's raw item into a canonical `Listing`. Returns
/// `None` when the item can't become a Listing: empty collection name or
/// zero price (§4.2).
pub fn normalize(marketplace: Marketplace, raw: &Value, nano_ton_threshold: Decimal) -> Option<Listing> {
    let listing_id = extract_listing_id(raw)?;
    let collection_name = extract_string(raw, COLLECTION_FIELDS).unwrap_or_default();
    if collection_name.is_empty() {
        return None;
    }

    let price_ton = extract_price(raw, nano_ton_threshold)?;
    if price_ton <= Decimal::ZERO {
        return None;
    }

    let (mut model_name, mut backdrop_name) = extract_attributes(raw);
    if model_name.is_none() {
        model_name = extract_string(raw, MODEL_FIELDS);
    }
    if backdrop_name.is_none() {
        backdrop_name = extract_string(raw, BACKDROP_FIELDS);
    }
    let model_name = model_name.unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let gift_number = extract_string(raw, GIFT_NUMBER_FIELDS).unwrap_or_else(|| NOT_AVAILABLE.to_string());
    let photo_url = extract_string(raw, PHOTO_FIELDS);
    let model_rarity = extract_rarity(raw);

    let hash_32 = match marketplace {
        Marketplace::Mrkt => extract_mrkt_hash(raw),
        _ => None,
    };

    let marketplace_link = links::marketplace_link(marketplace, &listing_id, hash_32.as_deref());
    let nft_link = links::nft_link(&collection_name, &gift_number);

    Some(Listing {
        marketplace,
        listing_id,
        collection_name,
        model_name,
        backdrop_name,
        gift_number,
        price_ton,
        model_rarity,
        photo_url,
        hash_32,
        marketplace_link,
        nft_link,
    })
}

fn extract_listing_id(raw: &Value) -> Option<String> {
    for field in ["id", "listing_id", "listingId", "nft_id"] {
        if let Some(value) = raw.get(field) {
            if let Some(s) = value.as_str() {
                return Some(s.to_string());
            }
            if let Some(n) = value.as_i64() {
                return Some(n.to_string());
            }
        }
    }
    None
}

fn extract_string(raw: &Value, fields: &[&str]) -> Option<String> {
    for field in fields {
        if let Some(s) = raw.get(*field).and_then(|v| v.as_str()) {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

fn extract_price(raw: &Value, nano_ton_threshold: Decimal) -> Option<Decimal> {
    for field in PRICE_FIELDS {
        if let Some(value) = raw.get(*field) {
            let parsed = match value {
                Value::Number(n) => Decimal::try_from(n.as_f64().unwrap_or_default()).ok(),
                Value::String(s) => parse_price_str(s),
                _ => None,
            };
            if let Some(price) = parsed {
                return Some(normalize_price(price, nano_ton_threshold));
            }
        }
    }
    None
}

/// Portals carries model/backdrop inside an `attributes` array of entries
/// shaped `{ "type": "model" | "backdrop", "value": "..." }` (§4.2).
fn extract_attributes(raw: &Value) -> (Option<String>, Option<String>) {
    let mut model = None;
    let mut backdrop = None;
    if let Some(attributes) = raw.get("attributes").and_then(|v| v.as_array()) {
        for attribute in attributes {
            let kind = attribute
                .get("type")
                .or_else(|| attribute.get("trait_type"))
                .and_then(|v| v.as_str());
            let value = attribute
                .get("value")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            match kind {
                Some("model") => model = model.or(value),
                Some("backdrop") => backdrop = backdrop.or(value),
                _ => {}
            }
        }
    }
    (model, backdrop)
}

/// Final scan of any key containing "rarity" or "tier" (§4.2).
fn extract_rarity(raw: &Value) -> Option<String> {
    for field in ["modelRarity", "model_rarity", "rarity"] {
        if let Some(s) = raw.get(field).and_then(|v| v.as_str()) {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    if let Value::Object(map) = raw {
        for (key, value) in map {
            let lower = key.to_lowercase();
            if lower.contains("rarity") || lower.contains("tier") {
                if let Some(s) = value.as_str() {
                    if !s.is_empty() {
                        return Some(s.to_string());
                    }
                }
            }
        }
    }
    None
}
