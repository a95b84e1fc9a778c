//! WebSocket broadcast sink (§6 "Outbound WebSocket event"). Independent of
//! the Telegram fan-out: every dispatched Listing is pushed here regardless
//! of whether any user matched it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::types::{Enrichment, Listing, Marketplace, SaleRecord};

/// The `new_gift` event: Listing fields plus the two floor prices, recent
/// sales, and a dispatch timestamp (§6).
#[derive(Debug, Clone, Serialize)]
pub struct NewGiftEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub marketplace: Marketplace,
    pub listing_id: String,
    pub collection_name: String,
    pub model_name: String,
    pub backdrop_name: Option<String>,
    pub gift_number: String,
    pub price_ton: rust_decimal::Decimal,
    pub model_rarity: Option<String>,
    pub photo_url: Option<String>,
    pub marketplace_link: Option<String>,
    pub nft_link: Option<String>,
    pub floor_price: Option<rust_decimal::Decimal>,
    pub model_floor_price: Option<rust_decimal::Decimal>,
    pub recent_sales: Vec<SaleRecord>,
    pub timestamp: DateTime<Utc>,
}

impl NewGiftEvent {
    /// `display_price` is the listing price after marketplace fee
    /// adjustment (§4.1) — the Dispatcher computes it the same way for both
    /// this event and the Telegram message so the two sinks never disagree.
    pub fn new(listing: &Listing, enrichment: &Enrichment, display_price: rust_decimal::Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type: "new_gift",
            marketplace: listing.marketplace,
            listing_id: listing.listing_id.clone(),
            collection_name: listing.collection_name.clone(),
            model_name: listing.model_name.clone(),
            backdrop_name: listing.backdrop_name.clone(),
            gift_number: listing.gift_number.clone(),
            price_ton: display_price,
            model_rarity: listing.model_rarity.clone(),
            photo_url: listing.photo_url.clone(),
            marketplace_link: listing.marketplace_link.clone(),
            nft_link: listing.nft_link.clone(),
            floor_price: enrichment.gift_floor,
            model_floor_price: enrichment.model_floor,
            recent_sales: enrichment.recent_sales.clone(),
            timestamp,
        }
    }
}

/// Thin wrapper around a `tokio::sync::broadcast` channel shared between the
/// Dispatcher (producer) and every `/ws` connection (consumer).
#[derive(Clone)]
pub struct WebSocketBroadcaster {
    sender: broadcast::Sender<NewGiftEvent>,
}

impl WebSocketBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NewGiftEvent> {
        self.sender.subscribe()
    }

    /// Broadcasting has no listeners registered is not an error (§4.6 step 6
    /// runs "independently" of whether any client is connected).
    pub fn publish(&self, event: NewGiftEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Marketplace;
    use rust_decimal::Decimal;

    fn listing() -> Listing {
        Listing {
            marketplace: Marketplace::Portals,
            listing_id: "1".into(),
            collection_name: "Plush Pepe".into(),
            model_name: "Grumpy".into(),
            backdrop_name: None,
            gift_number: "37".into(),
            price_ton: Decimal::from(10),
            model_rarity: None,
            photo_url: None,
            hash_32: None,
            marketplace_link: None,
            nft_link: None,
        }
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let broadcaster = WebSocketBroadcaster::new(16);
        let event = NewGiftEvent::new(&listing(), &Enrichment::default(), listing().price_ton, Utc::now());
        broadcaster.publish(event);
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let broadcaster = WebSocketBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();
        let event = NewGiftEvent::new(&listing(), &Enrichment::default(), listing().price_ton, Utc::now());
        broadcaster.publish(event);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.listing_id, "1");
        assert_eq!(received.event_type, "new_gift");
    }
}
