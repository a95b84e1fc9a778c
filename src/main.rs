//! Giftwatch — real-time Telegram gift-marketplace listing monitor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use giftwatch::adapters::common::RateGate;
use giftwatch::adapters::{GetGemsAdapter, MrktAdapter, PortalsAdapter, TonnelAdapter};
use giftwatch::api::{self, ApiState};
use giftwatch::collaborators::{InMemoryUserConfigStore, RecordingTelegramGateway, StaticTokenProvider, TokenProvider};
use giftwatch::config::GiftwatchConfig;
use giftwatch::core::traits::MarketplaceAdapter;
use giftwatch::core::types::Marketplace;
use giftwatch::dispatch::websocket::WebSocketBroadcaster;
use giftwatch::dispatch::Dispatcher;
use giftwatch::enrich::{Enricher, FloorCache};
use giftwatch::supervisor::Supervisor;
use rust_decimal::Decimal;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "giftwatch")]
#[command(about = "Real-time Telegram gift-marketplace listing monitor", version, author)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "giftwatch.toml")]
    config: String,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Dry run mode (validate config and exit)
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if std::path::Path::new(&cli.config).exists() {
        GiftwatchConfig::from_file(&cli.config)?
    } else {
        warn!("config file '{}' not found, using defaults", cli.config);
        GiftwatchConfig::default()
    };

    if let Some(log_level) = cli.log_level {
        config.monitoring.log_level = log_level;
    }

    init_logging(&config)?;

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║            giftwatch v{}                              ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════════════════════════╝");

    config.validate_full()?;
    info!("✓ configuration validated successfully");

    let enabled = config.marketplaces.enabled();
    info!(?enabled, "enabled marketplaces");

    if cli.dry_run {
        info!("dry run mode — configuration is valid, exiting");
        return Ok(());
    }

    let nano_ton_threshold = Decimal::try_from(config.pricing.nano_ton_threshold).unwrap_or_default();
    let adapters = build_adapters(&config, &enabled, nano_ton_threshold);
    let token_provider: Arc<dyn TokenProvider> = Arc::new(StaticTokenProvider::new(
        enabled
            .iter()
            .map(|m| (*m, config.marketplaces.entry(*m).auth_token.clone()))
            .collect(),
    ));

    let user_store = Arc::new(InMemoryUserConfigStore::new());
    let telegram = Arc::new(RecordingTelegramGateway::new());
    let websocket = WebSocketBroadcaster::new(256);

    let floor_cache = Arc::new(FloorCache::new(Duration::from_secs(config.cache.floor_ttl_secs)));
    let enricher = Enricher::new(
        floor_cache,
        Duration::from_secs(config.cache.floor_deadline_secs),
        Duration::from_secs(config.cache.sales_deadline_secs),
        Decimal::try_from(config.pricing.tonnel_fee_rate).unwrap_or_default(),
    );

    let dispatcher = Arc::new(Dispatcher::new(
        adapters.clone(),
        enricher,
        user_store.clone(),
        telegram,
        websocket.clone(),
        config.dispatch.send_concurrency,
    ));

    let (supervisor, consumer_handle, poller_handles) = Supervisor::start(
        adapters,
        config.poll_intervals(),
        user_store,
        token_provider,
        dispatcher,
        config.cache.seen_set_capacity,
        config.dispatch.queue_capacity,
        nano_ton_threshold,
    );
    info!("✓ supervisor started with {} poller(s)", poller_handles.len());

    let api_state = ApiState {
        websocket,
        supervisor,
    };
    let api_handle = api::start_server(api_state, &config.api).await?;
    info!("✓ push API listening on {}", config.api.bind_address);

    info!("✓ giftwatch started successfully");
    info!("press Ctrl+C to shut down");

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        result = api_handle => {
            match result {
                Ok(()) => info!("push API server finished"),
                Err(err) => tracing::error!("push API task error: {}", err),
            }
        }
    }

    consumer_handle.abort();
    for handle in poller_handles {
        handle.abort();
    }

    info!("shutting down giftwatch");
    Ok(())
}

fn build_adapters(
    config: &GiftwatchConfig,
    enabled: &[Marketplace],
    nano_ton_threshold: Decimal,
) -> HashMap<Marketplace, Arc<dyn MarketplaceAdapter>> {
    let mut adapters: HashMap<Marketplace, Arc<dyn MarketplaceAdapter>> = HashMap::new();
    let rate_gate = RateGate::new(Duration::from_secs(config.marketplaces.tonnel.poll_interval_secs));

    for marketplace in enabled {
        let entry = config.marketplaces.entry(*marketplace);
        let timeout = Duration::from_secs(entry.request_timeout_secs);
        let adapter: Arc<dyn MarketplaceAdapter> = match marketplace {
            Marketplace::Portals => Arc::new(PortalsAdapter::new(
                entry.base_url.clone(),
                entry.auth_token.clone(),
                timeout,
                nano_ton_threshold,
            )),
            Marketplace::Tonnel => Arc::new(TonnelAdapter::new(
                entry.base_url.clone(),
                entry.auth_token.clone(),
                timeout,
                rate_gate.clone(),
                nano_ton_threshold,
            )),
            Marketplace::Mrkt => Arc::new(MrktAdapter::new(
                entry.base_url.clone(),
                entry.auth_token.clone(),
                timeout,
                nano_ton_threshold,
            )),
            Marketplace::Getgems => Arc::new(GetGemsAdapter::new(
                entry.base_url.clone(),
                entry.auth_token.clone(),
                timeout,
                nano_ton_threshold,
            )),
        };
        adapters.insert(*marketplace, adapter);
    }
    adapters
}

/// Initializes the tracing subscriber with a configurable log level, with
/// an env-filter default and a compact/json format split.
fn init_logging(config: &GiftwatchConfig) -> Result<()> {
    let log_level = config.monitoring.log_level.parse().unwrap_or(tracing::Level::INFO);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("giftwatch={log_level}").into());

    if config.monitoring.structured_logging {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    }

    Ok(())
}
