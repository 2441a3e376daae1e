use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::entities::order::{DeliveryMethod, PaymentMethod};

/// Checkout request assembled by the mini-app shop surface.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "no cart items selected"))]
    pub item_ids: Vec<i64>,
    pub delivery_method: DeliveryMethod,
    pub payment_method: PaymentMethod,
    pub phone: String,
    pub address: Option<String>,
    pub comment: Option<String>,
}

/// Outcome of a checkout: either the order is accepted as-is (cash) or the
/// customer is redirected to the provider's payment form.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    Success { order_id: i64 },
    Redirect { order_id: i64, url: String },
}

impl CheckoutOutcome {
    pub fn order_id(&self) -> i64 {
        match self {
            CheckoutOutcome::Success { order_id } | CheckoutOutcome::Redirect { order_id, .. } => {
                *order_id
            }
        }
    }
}
