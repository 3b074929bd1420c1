use common::AppError;
use sharding::ShardError;

/// Translates a routing or shard query failure.
///
/// A lookup that matched no shard becomes `NotFound` with `missing` as
/// message; everything else is logged and reported as `Internal`.
pub fn shard_error(context: &str, missing: impl Into<String>, err: ShardError) -> AppError {
    match err {
        ShardError::NotFound => AppError::not_found(missing),
        ShardError::Database(e) => AppError::database(context, missing, e),
        other => {
            tracing::error!(error = %other, context, "shard error");
            AppError::internal("Unexpected database error")
        }
    }
}

pub(crate) fn shipment_not_found(shipment_id: &str) -> String {
    format!("Not found shipment: shipmentId='{shipment_id}'")
}
