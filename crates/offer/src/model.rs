use serde::{Deserialize, Serialize};

/// A seller's offer of a product.
///
/// `reserved` is stock held by in-flight shipments; `0 <= reserved <= stock`
/// is expected but not enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: String,
    pub seller_id: i64,
    pub product_id: i64,
    pub price: f64,
    pub stock: i64,
    pub reserved: i64,
}

impl Offer {
    /// Offer ids are `"<sequence>-<sellerId>-<productId>"`.
    pub fn format_id(seq: i64, seller_id: i64, product_id: i64) -> String {
        format!("{seq}-{seller_id}-{product_id}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPrice {
    pub offer_id: String,
    pub price: f64,
}
