//! Ratekeeper Server Binary
//!
//! Serves currency availability and exchange rates over HTTP.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratekeeper_fx::{
    ExchangerClient, ExchangerConfig, HttpForecaster, MemoryRateCache, RateCache, RedisRateCache,
};
use ratekeeper_server::{router, RateService, ServerConfig, Timeouts};
use ratekeeper_store::PgBanStore;

const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Ratekeeper");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    let store = PgBanStore::connect(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout,
    )
    .await?;
    store.ensure_schema().await?;

    let cache: Arc<dyn RateCache> = if config.cache.is_memory() {
        let memory = Arc::new(MemoryRateCache::with_ttl(config.cache.availability_ttl));
        spawn_eviction(memory.clone());
        info!("Using in-memory rate cache");
        memory
    } else {
        Arc::new(RedisRateCache::connect_with_ttl(&config.cache.url, config.cache.availability_ttl).await?)
    };

    let provider = ExchangerClient::new(ExchangerConfig {
        base_url: config.upstream.exchanger_url.clone(),
        timeout: config.upstream.exchanger_timeout,
    })?;

    let mut service = RateService::new(cache, Arc::new(store), Arc::new(provider)).with_timeouts(
        Timeouts {
            cache: config.cache.timeout,
            store: config.database.timeout,
            provider: config.upstream.exchanger_timeout,
            forecast: config.upstream.forecast_timeout,
        },
    );

    match &config.upstream.forecast_url {
        Some(url) => {
            let forecaster = HttpForecaster::new(url.clone(), config.upstream.forecast_timeout)?;
            service = service.with_forecaster(Arc::new(forecaster));
            info!(url = %url, "Forecasting enabled");
        }
        None => info!("Forecasting disabled"),
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!(
        listen_addr = %config.listen_addr,
        listen_port = %config.listen_port,
        currencies = service.registry().len(),
        "Ratekeeper running"
    );

    axum::serve(listener, router(Arc::new(service)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Ratekeeper shutdown complete");
    Ok(())
}

fn spawn_eviction(cache: Arc<MemoryRateCache>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            interval.tick().await;
            cache.evict_expired();
        }
    });
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
