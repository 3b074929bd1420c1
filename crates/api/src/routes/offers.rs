//! Offer endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use offer::{Offer, OfferPrice, OfferStore};
use serde::Deserialize;
use shipment::ShipmentStore;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOfferRequest {
    pub seller_id: i64,
    pub product_id: i64,
    pub stock: i64,
    pub price: f64,
}

#[derive(Debug, Deserialize)]
pub struct PriceRequest {
    pub price: f64,
}

#[derive(Debug, Deserialize)]
pub struct StockRequest {
    pub stock: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub reserved: i64,
}

/// POST /api/offer
pub async fn create<OS: OfferStore + 'static, SS: ShipmentStore + 'static>(
    State(state): State<Arc<AppState<OS, SS>>>,
    Json(req): Json<CreateOfferRequest>,
) -> Result<(StatusCode, Json<Offer>), ApiError> {
    let offer = state
        .offers
        .create_offer(req.seller_id, req.product_id, req.stock, req.price)
        .await?;
    Ok((StatusCode::CREATED, Json(offer)))
}

/// GET /api/offer/{offerId}
pub async fn get<OS: OfferStore + 'static, SS: ShipmentStore + 'static>(
    State(state): State<Arc<AppState<OS, SS>>>,
    Path(offer_id): Path<String>,
) -> Result<Json<Offer>, ApiError> {
    Ok(Json(state.offers.get_offer(&offer_id).await?))
}

/// GET /api/offer/{offerId}/price
pub async fn price<OS: OfferStore + 'static, SS: ShipmentStore + 'static>(
    State(state): State<Arc<AppState<OS, SS>>>,
    Path(offer_id): Path<String>,
) -> Result<Json<OfferPrice>, ApiError> {
    let price = state.offers.get_price(&offer_id).await?;
    Ok(Json(OfferPrice { offer_id, price }))
}

/// PUT /api/offer/{offerId}/price
pub async fn update_price<OS: OfferStore + 'static, SS: ShipmentStore + 'static>(
    State(state): State<Arc<AppState<OS, SS>>>,
    Path(offer_id): Path<String>,
    Json(req): Json<PriceRequest>,
) -> Result<Json<Offer>, ApiError> {
    Ok(Json(state.offers.update_price(&offer_id, req.price).await?))
}

/// PUT /api/offer/{offerId}/stock
pub async fn update_stock<OS: OfferStore + 'static, SS: ShipmentStore + 'static>(
    State(state): State<Arc<AppState<OS, SS>>>,
    Path(offer_id): Path<String>,
    Json(req): Json<StockRequest>,
) -> Result<Json<Offer>, ApiError> {
    Ok(Json(state.offers.update_stock(&offer_id, req.stock).await?))
}

/// PUT /api/offer/{offerId}/reserve
pub async fn update_reserve<OS: OfferStore + 'static, SS: ShipmentStore + 'static>(
    State(state): State<Arc<AppState<OS, SS>>>,
    Path(offer_id): Path<String>,
    Json(req): Json<ReserveRequest>,
) -> Result<Json<Offer>, ApiError> {
    Ok(Json(
        state.offers.update_reserve(&offer_id, req.reserved).await?,
    ))
}
