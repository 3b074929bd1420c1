//! API server entry point.

use std::sync::Arc;
use std::time::Duration;

use api::config::{Config, LogFormat};
use bus::InMemoryBus;
use cache::InMemoryCache;
use offer::{CachedOfferStore, OfferService, PgOfferStore};
use post::{PgPostStore, PostService};
use saga::Choreography;
use sharding::{EtcdCoordinationStore, PgConnector, ShardRouter, TopologyWatcher};
use shipment::{PgShipmentStore, ShipmentService};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (text, json) = match config.log_format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("invalid configuration");

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Shipment shards follow the topology published in etcd
    let etcd = EtcdCoordinationStore::connect(&config.etcd_endpoints, Duration::from_secs(5))
        .await
        .expect("failed to connect to etcd");
    let mut router = ShardRouter::new(PgConnector::new(config.shard_max_connections));
    if let Some(timeout) = config.unkeyed_query_timeout {
        router = router.with_unkeyed_timeout(timeout);
    }
    let router = Arc::new(router);
    let watcher = TopologyWatcher::new(
        router.clone(),
        Arc::new(etcd),
        config.shipment_cluster_key.clone(),
    )
    .start()
    .await
    .expect("failed to load shard topology");

    let shipment_store = PgShipmentStore::new(router.clone());
    shipment_store
        .run_migrations()
        .await
        .expect("failed to migrate shipment shards");

    // 4. Offer and post databases
    let offer_pool = PgPoolOptions::new()
        .connect(&config.offer_database_url)
        .await
        .expect("failed to connect to offer database");
    let offer_store = PgOfferStore::new(offer_pool.clone());
    offer_store
        .run_migrations()
        .await
        .expect("failed to migrate offer database");

    let post_pool = PgPoolOptions::new()
        .connect(&config.post_database_url)
        .await
        .expect("failed to connect to post database");
    let post_store = PgPostStore::new(post_pool.clone());
    post_store
        .run_migrations()
        .await
        .expect("failed to migrate post database");

    // 5. Services and the saga consumers
    let bus = InMemoryBus::new(config.bus_partitions);
    let offers = Arc::new(OfferService::new(
        CachedOfferStore::new(offer_store, InMemoryCache::new()),
        bus.clone(),
    ));
    let shipments = Arc::new(ShipmentService::new(shipment_store, bus.clone()));
    let posts = Arc::new(PostService::new(post_store, bus.clone()));

    let choreography = Choreography::start(&bus, offers.clone(), shipments.clone(), posts)
        .await
        .expect("failed to start saga consumers");

    // 6. Build the application
    let state = Arc::new(api::AppState { offers, shipments });
    let app = api::create_app(state, metrics_handle);

    // 7. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
    }

    // 8. Tear down in reverse order
    choreography.stop().await;
    watcher.stop().await;
    offer_pool.close().await;
    post_pool.close().await;

    tracing::info!("server shut down gracefully");
}
