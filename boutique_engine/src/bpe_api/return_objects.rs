use boutique_common::Eur;
use serde::{Deserialize, Serialize};

use crate::db_types::{OrderId, ReturnItem, ReturnRequest, ReturnType};

/// One item the customer wants to send back. Prices are snapshotted from the storefront at declaration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnItemRequest {
    pub product_id: String,
    pub product_name: String,
    pub product_slug: String,
    pub quantity: i64,
    pub unit_price: Eur,
    /// Snapshot of the chosen variation (size, colour, ...), stored verbatim.
    pub variation: Option<serde_json::Value>,
    pub image_url: Option<String>,
}

/// A return declaration as it arrives from the customer. The engine computes and freezes all amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclareReturn {
    pub customer_id: String,
    pub order_id: OrderId,
    pub return_type: ReturnType,
    pub items: Vec<ReturnItemRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnWithItems {
    pub request: ReturnRequest,
    pub items: Vec<ReturnItem>,
}
