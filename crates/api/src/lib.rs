//! HTTP request surface for the offer and shipment services.
//!
//! Provides REST endpoints over the services, with structured logging
//! (tracing) and Prometheus metrics. The saga itself runs on the bus; the
//! only saga entry point here is `POST /api/shipment/{id}/delivery`.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use bus::InMemoryBus;
use metrics_exporter_prometheus::PrometheusHandle;
use offer::{OfferService, OfferStore};
use shipment::{ShipmentService, ShipmentStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<OS, SS> {
    pub offers: Arc<OfferService<OS, InMemoryBus>>,
    pub shipments: Arc<ShipmentService<SS, InMemoryBus>>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<OS, SS>(state: Arc<AppState<OS, SS>>, metrics_handle: PrometheusHandle) -> Router
where
    OS: OfferStore + 'static,
    SS: ShipmentStore + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/api/offer", post(routes::offers::create::<OS, SS>))
        .route("/api/offer/{offer_id}", get(routes::offers::get::<OS, SS>))
        .route(
            "/api/offer/{offer_id}/price",
            get(routes::offers::price::<OS, SS>).put(routes::offers::update_price::<OS, SS>),
        )
        .route(
            "/api/offer/{offer_id}/stock",
            put(routes::offers::update_stock::<OS, SS>),
        )
        .route(
            "/api/offer/{offer_id}/reserve",
            put(routes::offers::update_reserve::<OS, SS>),
        )
        .route(
            "/api/shipment",
            post(routes::shipments::create::<OS, SS>).get(routes::shipments::list::<OS, SS>),
        )
        .route(
            "/api/shipment/{shipment_id}",
            get(routes::shipments::get::<OS, SS>),
        )
        .route(
            "/api/shipment/{shipment_id}/delivery",
            post(routes::shipments::request_delivery::<OS, SS>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
