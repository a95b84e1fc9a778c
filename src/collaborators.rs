//! External collaborator traits: narrow ports for the three systems this
//! crate depends on but does not own — a token provider, the user-config
//! store, and the Telegram send gateway. Each trait ships an in-memory
//! reference implementation so the crate runs and tests standalone.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::error::DeliveryError;
use crate::core::types::{Marketplace, UserFilter};

/// Supplies a fresh auth token for a marketplace, for adapters whose
/// credentials expire and must be refreshed out-of-band.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token_for(&self, marketplace: Marketplace) -> Option<String>;
}

/// Static tokens read once from configuration; most deployments never need
/// token refresh, so this is the default wiring in `main.rs`.
pub struct StaticTokenProvider {
    tokens: HashMap<Marketplace, String>,
}

impl StaticTokenProvider {
    pub fn new(tokens: HashMap<Marketplace, String>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token_for(&self, marketplace: Marketplace) -> Option<String> {
        self.tokens.get(&marketplace).cloned()
    }
}

/// The user-config store: who is subscribed to which marketplace, and what
/// each subscriber's filter rules are (§4.7, §4.8).
#[async_trait]
pub trait UserConfigStore: Send + Sync {
    /// User ids subscribed to a given marketplace's listings.
    async fn subscribers(&self, marketplace: Marketplace) -> Vec<String>;

    /// One user's filter rules, or `None` if the user has none configured.
    async fn filter_for(&self, user_id: &str) -> Option<UserFilter>;
}

/// In-memory reference store, useful for local runs and tests. Mutation is
/// exposed directly since this is test/demo scaffolding, not a production
/// adapter.
#[derive(Default)]
pub struct InMemoryUserConfigStore {
    subscriptions: RwLock<HashMap<Marketplace, Vec<String>>>,
    filters: RwLock<HashMap<String, UserFilter>>,
}

impl InMemoryUserConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, marketplace: Marketplace, user_id: impl Into<String>) {
        let mut subs = self.subscriptions.write().await;
        subs.entry(marketplace).or_default().push(user_id.into());
    }

    pub async fn set_filter(&self, filter: UserFilter) {
        let mut filters = self.filters.write().await;
        filters.insert(filter.user_id.clone(), filter);
    }
}

#[async_trait]
impl UserConfigStore for InMemoryUserConfigStore {
    async fn subscribers(&self, marketplace: Marketplace) -> Vec<String> {
        self.subscriptions
            .read()
            .await
            .get(&marketplace)
            .cloned()
            .unwrap_or_default()
    }

    async fn filter_for(&self, user_id: &str) -> Option<UserFilter> {
        self.filters.read().await.get(user_id).cloned()
    }
}

/// Telegram send gateway (§6): photo-with-caption and text, both with an
/// inline keyboard and HTML parse mode.
#[async_trait]
pub trait TelegramGateway: Send + Sync {
    async fn send_photo(
        &self,
        user_id: &str,
        photo_url: &str,
        caption_html: &str,
        button_label: &str,
        button_url: &str,
    ) -> Result<(), DeliveryError>;

    async fn send_text(
        &self,
        user_id: &str,
        text_html: &str,
        button_label: &str,
        button_url: &str,
    ) -> Result<(), DeliveryError>;
}

/// Records every send in memory instead of calling the real Bot API;
/// intended for tests and local demo runs.
#[derive(Default)]
pub struct RecordingTelegramGateway {
    pub sent: RwLock<Vec<(String, String)>>,
}

impl RecordingTelegramGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TelegramGateway for RecordingTelegramGateway {
    async fn send_photo(
        &self,
        user_id: &str,
        _photo_url: &str,
        caption_html: &str,
        _button_label: &str,
        _button_url: &str,
    ) -> Result<(), DeliveryError> {
        self.sent
            .write()
            .await
            .push((user_id.to_string(), caption_html.to_string()));
        Ok(())
    }

    async fn send_text(
        &self,
        user_id: &str,
        text_html: &str,
        _button_label: &str,
        _button_url: &str,
    ) -> Result<(), DeliveryError> {
        self.sent
            .write()
            .await
            .push((user_id.to_string(), text_html.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_round_trips_subscriptions_and_filters() {
        let store = InMemoryUserConfigStore::new();
        store.subscribe(Marketplace::Portals, "u1").await;
        assert_eq!(store.subscribers(Marketplace::Portals).await, vec!["u1".to_string()]);
        assert!(store.subscribers(Marketplace::Tonnel).await.is_empty());

        let filter = UserFilter {
            user_id: "u1".to_string(),
            rules: vec![],
        };
        store.set_filter(filter.clone()).await;
        assert_eq!(store.filter_for("u1").await, Some(filter));
        assert_eq!(store.filter_for("nobody").await, None);
    }

    #[tokio::test]
    async fn recording_gateway_captures_every_send() {
        let gateway = RecordingTelegramGateway::new();
        gateway
            .send_text("u1", "<b>hi</b>", "Open", "https://example.com")
            .await
            .unwrap();
        gateway
            .send_photo("u2", "https://img", "caption", "Open", "https://example.com")
            .await
            .unwrap();
        let sent = gateway.sent.read().await;
        assert_eq!(sent.len(), 2);
    }

    #[tokio::test]
    async fn static_token_provider_returns_configured_tokens_only() {
        let mut tokens = HashMap::new();
        tokens.insert(Marketplace::Portals, "tok".to_string());
        let provider = StaticTokenProvider::new(tokens);
        assert_eq!(provider.token_for(Marketplace::Portals).await, Some("tok".to_string()));
        assert_eq!(provider.token_for(Marketplace::Tonnel).await, None);
    }
}
