use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use logs_service::config::{Config, StoreKind};
use logs_service::metrics::Metrics;
use logs_service::store::{AuditStore, MemoryAuditStore, PgAuditStore};
use logs_service::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .init();
    let config = Config::from_env()?;

    let store: Arc<dyn AuditStore> = match config.store {
        StoreKind::Postgres => {
            let url = config.database_url.clone().context("DATABASE_URL missing")?;
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await
                .context("connecting to the audit store")?;
            let store = PgAuditStore::new(pool);
            store.ensure_schema().await.context("preparing the logs table")?;
            Arc::new(store)
        }
        StoreKind::Memory => {
            warn!("LOGS_STORE=memory: stored records will not survive a restart");
            Arc::new(MemoryAuditStore::new())
        }
    };

    let metrics = Arc::new(Metrics::new());
    let state = AppState { store: Arc::clone(&store), metrics: Arc::clone(&metrics) };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "logs-service query API listening");
    let router = build_router(state);
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            tracing::error!(error = %err, "http server exited");
        }
    });

    if config.consumer_enabled {
        #[cfg(feature = "amqp")]
        {
            use common_broker::AmqpBroker;
            use logs_service::consumer::ConsumerWorker;

            let broker = AmqpBroker::connect(&config.amqp_addr)
                .await
                .context("connecting to the broker")?;
            let topology = common_events::logs_topology_with(&config.exchange, &config.queue);
            broker.declare(&topology).await.context("declaring the logs topology")?;
            let consumer = broker.consumer(&config.queue, "logs-service").await?;
            let worker = ConsumerWorker::new(consumer, Arc::clone(&store), Arc::clone(&metrics))
                .with_backoff(config.store_backoff);
            tokio::spawn(async move {
                if let Err(err) = worker.run().await {
                    tracing::error!(error = %err, "consumer worker exited");
                }
            });
        }
        #[cfg(not(feature = "amqp"))]
        warn!("built without the `amqp` feature, consumer disabled");
    } else {
        info!("consumer disabled via LOGS_CONSUMER_ENABLED=false");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    Ok(())
}
