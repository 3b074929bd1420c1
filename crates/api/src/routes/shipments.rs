//! Shipment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{AppError, Shipment, Unit};
use offer::OfferStore;
use serde::Deserialize;
use shipment::ShipmentStore;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShipmentRequest {
    pub order_id: String,
    pub seller_id: i64,
    pub destination_id: i64,
    #[serde(default)]
    pub units: Vec<Unit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub order_id: Option<String>,
}

/// POST /api/shipment
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id))]
pub async fn create<OS: OfferStore + 'static, SS: ShipmentStore + 'static>(
    State(state): State<Arc<AppState<OS, SS>>>,
    Json(req): Json<CreateShipmentRequest>,
) -> Result<(StatusCode, Json<Shipment>), ApiError> {
    let shipment = state
        .shipments
        .new_shipment(&req.order_id, req.seller_id, req.destination_id, req.units)
        .await?;
    Ok((StatusCode::CREATED, Json(shipment)))
}

/// GET /api/shipment?orderId=...
pub async fn list<OS: OfferStore + 'static, SS: ShipmentStore + 'static>(
    State(state): State<Arc<AppState<OS, SS>>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Shipment>>, ApiError> {
    let order_id = query
        .order_id
        .ok_or_else(|| AppError::bad_request("orderId query parameter is required"))?;
    Ok(Json(state.shipments.get_order_shipments(&order_id).await?))
}

/// GET /api/shipment/{shipmentId}
pub async fn get<OS: OfferStore + 'static, SS: ShipmentStore + 'static>(
    State(state): State<Arc<AppState<OS, SS>>>,
    Path(shipment_id): Path<String>,
) -> Result<Json<Shipment>, ApiError> {
    Ok(Json(state.shipments.get_shipment(&shipment_id).await?))
}

/// POST /api/shipment/{shipmentId}/delivery
///
/// Starts the delivery saga for a stored shipment.
pub async fn request_delivery<OS: OfferStore + 'static, SS: ShipmentStore + 'static>(
    State(state): State<Arc<AppState<OS, SS>>>,
    Path(shipment_id): Path<String>,
) -> Result<(StatusCode, Json<Shipment>), ApiError> {
    let shipment = state.shipments.request_delivery(&shipment_id).await?;
    Ok((StatusCode::ACCEPTED, Json(shipment)))
}
