//! Checkout surface for the mini-app shop.
//!
//! Authentication happens in front of these handlers; they resolve the
//! customer by telegram id and drive the order service.

use axum::extract::State;
use axum::Json;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::Deserialize;
use validator::Validate;

use tezshop_payments::dto::{CheckoutOutcome, CreateOrderRequest};
use tezshop_payments::entities::user;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutPayload {
    pub telegram_id: i64,
    #[serde(flatten)]
    pub order: CreateOrderRequest,
}

#[derive(Debug, Deserialize)]
pub struct PayDebtPayload {
    pub telegram_id: i64,
    pub amount: i64,
}

async fn resolve_user(state: &AppState, telegram_id: i64) -> Result<user::Model, ApiError> {
    user::Entity::find()
        .filter(user::Column::TelegramId.eq(telegram_id))
        .one(&state.db)
        .await
        .map_err(tezshop_payments::OrderError::from)?
        .ok_or_else(|| ApiError::NotFound("user is not registered".into()))
}

pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutPayload>,
) -> Result<Json<CheckoutOutcome>, ApiError> {
    payload
        .order
        .validate()
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;
    let customer = resolve_user(&state, payload.telegram_id).await?;
    let outcome = state.orders.create_order(customer.id, &payload.order).await?;
    Ok(Json(outcome))
}

pub async fn pay_debt(
    State(state): State<AppState>,
    Json(payload): Json<PayDebtPayload>,
) -> Result<Json<CheckoutOutcome>, ApiError> {
    let customer = resolve_user(&state, payload.telegram_id).await?;
    let outcome = state
        .orders
        .create_debt_repayment(customer.id, payload.amount)
        .await?;
    Ok(Json(outcome))
}
