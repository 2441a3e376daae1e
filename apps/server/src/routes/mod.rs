pub mod click;
pub mod health;
pub mod orders;
pub mod payme;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/payme", post(payme::payme_webhook))
        .route("/api/click/prepare", post(click::prepare))
        .route("/api/click/complete", post(click::complete))
        .route("/api/orders", post(orders::create_order))
        .route("/api/orders/pay-debt", post(orders::pay_debt))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
