// Integration tests for the Payme JSON-RPC state machine: idempotent
// create/perform, the at-most-one-active invariant, timeouts, debt
// repayment flows and cancellation semantics.

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::json;

use chrono::Utc;
use tezshop_payments::dto::CreateOrderRequest;
use tezshop_payments::entities::order::{DeliveryMethod, OrderStatus, PaymentMethod};
use tezshop_payments::entities::payme_transaction;
use tezshop_payments::services::payme::{
    CancelParams, CheckParams, CheckPerformParams, CreateParams, PerformParams, StatementParams,
};
use tezshop_payments::PaymeError;
use tezshop_test_utils::db::setup_test_db;
use tezshop_test_utils::fixtures::*;

/// Creates a card order through the normal checkout path and returns
/// (user_id, product_id, order_id, total_sum).
async fn card_order(
    db: &DatabaseConnection,
    telegram_id: i64,
    price: i64,
    stock: i32,
    quantity: i32,
) -> (i64, i64, i64, i64) {
    let service = order_service(db);
    let user = create_user(db, telegram_id, 0).await;
    let product = create_product(db, "Non", price, stock).await;
    let row = add_cart_item(db, user.id, product.id, quantity).await;
    let outcome = service
        .create_order(
            user.id,
            &CreateOrderRequest {
                item_ids: vec![row.id],
                delivery_method: DeliveryMethod::Pickup,
                payment_method: PaymentMethod::Card,
                phone: "+998901234567".into(),
                address: None,
                comment: None,
            },
        )
        .await
        .unwrap();
    (user.id, product.id, outcome.order_id(), price * i64::from(quantity))
}

fn create_params(payme_id: &str, order_id: i64, amount_tiyin: i64) -> CreateParams {
    CreateParams {
        id: payme_id.to_string(),
        time: Utc::now().timestamp_millis(),
        amount: json!(amount_tiyin),
        account: json!({ "order_id": order_id }),
    }
}

async fn transaction_rows(db: &DatabaseConnection, order_id: i64) -> Vec<payme_transaction::Model> {
    payme_transaction::Entity::find()
        .filter(payme_transaction::Column::OrderId.eq(order_id))
        .all(db)
        .await
        .unwrap()
}

// =============================================================================
// CheckPerformTransaction
// =============================================================================

#[tokio::test]
async fn check_perform_allows_payable_order() {
    let db = setup_test_db().await;
    let (_, _, order_id, total) = card_order(&db, 200, 15_000, 5, 1).await;
    let service = payme_service(&db);

    let result = service
        .check_perform_transaction(CheckPerformParams {
            amount: json!(total * 100),
            account: json!({ "order_id": order_id }),
        })
        .await
        .unwrap();
    assert!(result.allow);
}

#[tokio::test]
async fn check_perform_accepts_string_order_id() {
    let db = setup_test_db().await;
    let (_, _, order_id, total) = card_order(&db, 201, 15_000, 5, 1).await;
    let service = payme_service(&db);

    let result = service
        .check_perform_transaction(CheckPerformParams {
            amount: json!(total * 100),
            account: json!({ "order_id": order_id.to_string() }),
        })
        .await
        .unwrap();
    assert!(result.allow);
}

#[tokio::test]
async fn check_perform_rejects_amount_mismatch() {
    let db = setup_test_db().await;
    let (_, _, order_id, total) = card_order(&db, 202, 15_000, 5, 1).await;
    let service = payme_service(&db);

    let err = service
        .check_perform_transaction(CheckPerformParams {
            amount: json!(total * 100 + 100),
            account: json!({ "order_id": order_id }),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), -31001);
}

#[tokio::test]
async fn check_perform_rejects_unknown_order() {
    let db = setup_test_db().await;
    let service = payme_service(&db);

    let err = service
        .check_perform_transaction(CheckPerformParams {
            amount: json!(100_000),
            account: json!({ "order_id": 404 }),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), -31050);
}

#[tokio::test]
async fn check_perform_rejects_cash_order() {
    let db = setup_test_db().await;
    let orders = order_service(&db);
    let user = create_user(&db, 203, 0).await;
    let product = create_product(&db, "Sut", 9_000, 5).await;
    let row = add_cart_item(&db, user.id, product.id, 1).await;
    let outcome = orders
        .create_order(
            user.id,
            &CreateOrderRequest {
                item_ids: vec![row.id],
                delivery_method: DeliveryMethod::Pickup,
                payment_method: PaymentMethod::Cash,
                phone: "+998901234567".into(),
                address: None,
                comment: None,
            },
        )
        .await
        .unwrap();

    let service = payme_service(&db);
    let err = service
        .check_perform_transaction(CheckPerformParams {
            amount: json!(9_000 * 100),
            account: json!({ "order_id": outcome.order_id() }),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), -31051);
}

// =============================================================================
// CreateTransaction
// =============================================================================

#[tokio::test]
async fn create_transaction_is_idempotent() {
    let db = setup_test_db().await;
    let (_, _, order_id, total) = card_order(&db, 204, 15_000, 5, 1).await;
    let service = payme_service(&db);

    let first = service
        .create_transaction(create_params("T1", order_id, total * 100))
        .await
        .unwrap();
    assert_eq!(first.state, 1);
    assert!(first.detail.is_some());

    let replay = service
        .create_transaction(create_params("T1", order_id, total * 100))
        .await
        .unwrap();

    assert_eq!(replay, first);
    assert_eq!(transaction_rows(&db, order_id).await.len(), 1);
}

#[tokio::test]
async fn create_transaction_rejects_amount_mismatch_on_duplicate() {
    let db = setup_test_db().await;
    let (_, _, order_id, total) = card_order(&db, 205, 15_000, 5, 1).await;
    let service = payme_service(&db);

    service
        .create_transaction(create_params("T1", order_id, total * 100))
        .await
        .unwrap();
    let err = service
        .create_transaction(create_params("T1", order_id, total * 100 + 100))
        .await
        .unwrap_err();
    assert_eq!(err.code(), -31001);
}

#[tokio::test]
async fn create_transaction_supersedes_stale_active_transaction() {
    let db = setup_test_db().await;
    let (_, _, order_id, total) = card_order(&db, 206, 15_000, 5, 1).await;
    let service = payme_service(&db);

    service
        .create_transaction(create_params("T1", order_id, total * 100))
        .await
        .unwrap();
    service
        .create_transaction(create_params("T2", order_id, total * 100))
        .await
        .unwrap();

    let rows = transaction_rows(&db, order_id).await;
    assert_eq!(rows.len(), 2);
    let active: Vec<_> = rows.iter().filter(|t| t.state == 1).collect();
    assert_eq!(active.len(), 1, "at most one active transaction per order");
    assert_eq!(active[0].payme_id, "T2");

    let superseded = rows.iter().find(|t| t.payme_id == "T1").unwrap();
    assert_eq!(superseded.state, -1);
    assert_eq!(superseded.reason, Some(4));
}

#[tokio::test]
async fn create_transaction_rejects_future_and_stale_times() {
    let db = setup_test_db().await;
    let (_, _, order_id, total) = card_order(&db, 207, 15_000, 5, 1).await;
    let service = payme_service(&db);

    let mut future = create_params("T1", order_id, total * 100);
    future.time = Utc::now().timestamp_millis() + 120_000;
    assert_eq!(service.create_transaction(future).await.unwrap_err().code(), -31001);

    let mut stale = create_params("T2", order_id, total * 100);
    stale.time = Utc::now().timestamp_millis() - 13 * 60 * 60 * 1000;
    assert_eq!(service.create_transaction(stale).await.unwrap_err().code(), -31001);

    assert!(transaction_rows(&db, order_id).await.is_empty());
}

#[tokio::test]
async fn create_transaction_expires_stale_order_and_restores_stock() {
    let db = setup_test_db().await;
    let (_, product_id, order_id, total) = card_order(&db, 208, 15_000, 5, 2).await;
    assert_eq!(get_product(&db, product_id).await.stock, 3);
    backdate_order(&db, order_id, 21).await;

    let service = payme_service(&db);
    let err = service
        .create_transaction(create_params("T1", order_id, total * 100))
        .await
        .unwrap_err();
    assert_eq!(err.code(), -31051);

    assert_eq!(get_order(&db, order_id).await.status(), OrderStatus::Cancelled);
    assert_eq!(get_product(&db, product_id).await.stock, 5);
}

// =============================================================================
// PerformTransaction
// =============================================================================

#[tokio::test]
async fn perform_marks_order_paid_and_drains_exact_cart_quantities() {
    let db = setup_test_db().await;
    let (user_id, product_id, order_id, total) = card_order(&db, 209, 15_000, 10, 2).await;

    // The user keeps shopping after checkout; the new row must survive.
    let extra = add_cart_item(&db, user_id, product_id, 5).await;

    let service = payme_service(&db);
    service
        .create_transaction(create_params("T1", order_id, total * 100))
        .await
        .unwrap();
    let performed = service
        .perform_transaction(PerformParams { id: "T1".into() })
        .await
        .unwrap();
    assert_eq!(performed.state, 2);

    let order = get_order(&db, order_id).await;
    assert_eq!(order.status(), OrderStatus::Paid);
    assert_eq!(order.payment_method(), PaymentMethod::Card);

    let cart = cart_rows(&db, user_id).await;
    assert_eq!(cart.len(), 1);
    assert_eq!(cart[0].id, extra.id);
    assert_eq!(cart[0].quantity, 5);
}

#[tokio::test]
async fn perform_replay_returns_same_snapshot() {
    let db = setup_test_db().await;
    let (_, _, order_id, total) = card_order(&db, 210, 15_000, 5, 1).await;
    let service = payme_service(&db);

    service
        .create_transaction(create_params("T1", order_id, total * 100))
        .await
        .unwrap();
    let first = service
        .perform_transaction(PerformParams { id: "T1".into() })
        .await
        .unwrap();
    let replay = service
        .perform_transaction(PerformParams { id: "T1".into() })
        .await
        .unwrap();

    assert_eq!(replay, first);
    assert_eq!(get_order(&db, order_id).await.status(), OrderStatus::Paid);
}

#[tokio::test]
async fn perform_unknown_transaction_fails() {
    let db = setup_test_db().await;
    let service = payme_service(&db);
    let err = service
        .perform_transaction(PerformParams { id: "missing".into() })
        .await
        .unwrap_err();
    assert_eq!(err.code(), -31003);
}

#[tokio::test]
async fn perform_times_out_old_transaction() {
    let db = setup_test_db().await;
    let (_, _, order_id, total) = card_order(&db, 211, 15_000, 5, 1).await;
    let service = payme_service(&db);

    service
        .create_transaction(create_params("T1", order_id, total * 100))
        .await
        .unwrap();
    let tx = &transaction_rows(&db, order_id).await[0];
    backdate_payme_transaction(&db, tx.id, 13 * 60).await;

    let err = service
        .perform_transaction(PerformParams { id: "T1".into() })
        .await
        .unwrap_err();
    assert_eq!(err.code(), -31008);

    let rows = transaction_rows(&db, order_id).await;
    assert_eq!(rows[0].state, -1);
    assert_eq!(rows[0].reason, Some(4));
}

// =============================================================================
// CancelTransaction
// =============================================================================

#[tokio::test]
async fn cancel_active_transaction_cancels_order_and_restores_stock() {
    let db = setup_test_db().await;
    let (_, product_id, order_id, total) = card_order(&db, 212, 15_000, 5, 2).await;
    let service = payme_service(&db);

    service
        .create_transaction(create_params("T1", order_id, total * 100))
        .await
        .unwrap();
    let cancelled = service
        .cancel_transaction(CancelParams { id: "T1".into(), reason: Some(3) })
        .await
        .unwrap();
    assert_eq!(cancelled.state, -1);

    assert_eq!(get_order(&db, order_id).await.status(), OrderStatus::Cancelled);
    assert_eq!(get_product(&db, product_id).await.stock, 5);

    // Replay is an idempotent snapshot.
    let replay = service
        .cancel_transaction(CancelParams { id: "T1".into(), reason: Some(3) })
        .await
        .unwrap();
    assert_eq!(replay.state, -1);
    assert_eq!(replay.cancel_time, cancelled.cancel_time);
}

#[tokio::test]
async fn cancel_after_perform_is_refused() {
    let db = setup_test_db().await;
    let (_, _, order_id, total) = card_order(&db, 213, 15_000, 5, 1).await;
    let service = payme_service(&db);

    service
        .create_transaction(create_params("T1", order_id, total * 100))
        .await
        .unwrap();
    service
        .perform_transaction(PerformParams { id: "T1".into() })
        .await
        .unwrap();

    let err = service
        .cancel_transaction(CancelParams { id: "T1".into(), reason: Some(5) })
        .await
        .unwrap_err();
    assert!(matches!(err, PaymeError::CannotCancel));
    assert_eq!(err.code(), -31007);
    assert_eq!(get_order(&db, order_id).await.status(), OrderStatus::Paid);
}

// =============================================================================
// Debt repayment
// =============================================================================

#[tokio::test]
async fn debt_repayment_perform_reduces_debt_and_finishes_order() {
    let db = setup_test_db().await;
    let orders = order_service(&db);
    let user = create_user(&db, 214, 100_000).await;
    let outcome = orders.create_debt_repayment(user.id, 80_000).await.unwrap();
    let order_id = outcome.order_id();

    let service = payme_service(&db);
    service
        .create_transaction(create_params("T1", order_id, 80_000 * 100))
        .await
        .unwrap();
    service
        .perform_transaction(PerformParams { id: "T1".into() })
        .await
        .unwrap();

    assert_eq!(get_user(&db, user.id).await.debt, 20_000);
    assert_eq!(get_order(&db, order_id).await.status(), OrderStatus::Done);
}

#[tokio::test]
async fn debt_overpayment_cancels_order_at_create() {
    let db = setup_test_db().await;
    let orders = order_service(&db);
    let user = create_user(&db, 215, 100_000).await;
    let outcome = orders.create_debt_repayment(user.id, 80_000).await.unwrap();
    let order_id = outcome.order_id();

    // The debt shrank between order creation and the provider callback.
    let shrunk = get_user(&db, user.id).await;
    let mut active: tezshop_payments::entities::user::ActiveModel = shrunk.into();
    active.debt = sea_orm::Set(50_000);
    sea_orm::ActiveModelTrait::update(active, &db).await.unwrap();

    let service = payme_service(&db);
    let err = service
        .create_transaction(create_params("T1", order_id, 80_000 * 100))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymeError::AmountExceedsDebt));
    assert_eq!(err.code(), -31001);
    assert_eq!(get_order(&db, order_id).await.status(), OrderStatus::Cancelled);
}

#[tokio::test]
async fn debt_shrinking_before_perform_cancels_order() {
    let db = setup_test_db().await;
    let orders = order_service(&db);
    let user = create_user(&db, 216, 100_000).await;
    let outcome = orders.create_debt_repayment(user.id, 80_000).await.unwrap();
    let order_id = outcome.order_id();

    let service = payme_service(&db);
    service
        .create_transaction(create_params("T1", order_id, 80_000 * 100))
        .await
        .unwrap();

    let shrunk = get_user(&db, user.id).await;
    let mut active: tezshop_payments::entities::user::ActiveModel = shrunk.into();
    active.debt = sea_orm::Set(50_000);
    sea_orm::ActiveModelTrait::update(active, &db).await.unwrap();

    let err = service
        .perform_transaction(PerformParams { id: "T1".into() })
        .await
        .unwrap_err();
    assert_eq!(err.code(), -31001);
    assert_eq!(get_order(&db, order_id).await.status(), OrderStatus::Cancelled);
    assert_eq!(get_user(&db, user.id).await.debt, 50_000);
}

// =============================================================================
// CheckTransaction & GetStatement
// =============================================================================

#[tokio::test]
async fn check_transaction_returns_full_snapshot() {
    let db = setup_test_db().await;
    let (_, _, order_id, total) = card_order(&db, 217, 15_000, 5, 1).await;
    let service = payme_service(&db);

    service
        .create_transaction(create_params("T1", order_id, total * 100))
        .await
        .unwrap();
    let snapshot = service.check_transaction(CheckParams { id: "T1".into() }).await.unwrap();
    assert_eq!(snapshot.state, 1);
    assert_eq!(snapshot.perform_time, 0);
    assert_eq!(snapshot.cancel_time, 0);
    assert!(snapshot.create_time > 0);

    let err = service
        .check_transaction(CheckParams { id: "missing".into() })
        .await
        .unwrap_err();
    assert_eq!(err.code(), -31003);
}

#[tokio::test]
async fn statement_filters_by_provider_time() {
    let db = setup_test_db().await;
    let (_, _, first_order, total) = card_order(&db, 218, 15_000, 5, 1).await;
    let (_, _, second_order, _) = card_order(&db, 219, 15_000, 5, 1).await;
    let service = payme_service(&db);

    let now_ms = Utc::now().timestamp_millis();
    let mut early = create_params("T1", first_order, total * 100);
    early.time = now_ms - 3_600_000;
    service.create_transaction(early).await.unwrap();

    let mut late = create_params("T2", second_order, total * 100);
    late.time = now_ms;
    service.create_transaction(late).await.unwrap();

    let statement = service
        .get_statement(StatementParams { from: now_ms - 7_200_000, to: now_ms - 1_800_000 })
        .await
        .unwrap();
    assert_eq!(statement.transactions.len(), 1);
    assert_eq!(statement.transactions[0].id, "T1");
    assert_eq!(statement.transactions[0].account, json!({ "order_id": first_order.to_string() }));
}
