// Integration tests for the zombie-order reaper: stale online orders are
// cancelled with their stock restored, dangling Payme transactions are
// closed, and live payment attempts are left alone.

use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::json;
use std::sync::Arc;

use tezshop_core::NotifierHandle;
use tezshop_payments::dto::CreateOrderRequest;
use tezshop_payments::entities::order::{DeliveryMethod, OrderStatus, PaymentMethod};
use tezshop_payments::entities::payme_transaction;
use tezshop_payments::services::payme::CreateParams;
use tezshop_payments::Reaper;
use tezshop_test_utils::db::setup_test_db;
use tezshop_test_utils::fixtures::*;

fn reaper(db: &DatabaseConnection) -> Reaper {
    Reaper::new(db.clone(), Arc::new(test_settings()), order_service(db))
}

async fn online_order(
    db: &DatabaseConnection,
    telegram_id: i64,
    payment: PaymentMethod,
    quantity: i32,
) -> (i64, i64) {
    let service = order_service(db);
    let user = create_user(db, telegram_id, 0).await;
    let product = create_product(db, "Non", 10_000, 10).await;
    let row = add_cart_item(db, user.id, product.id, quantity).await;
    let outcome = service
        .create_order(
            user.id,
            &CreateOrderRequest {
                item_ids: vec![row.id],
                delivery_method: DeliveryMethod::Pickup,
                payment_method: payment,
                phone: "+998901234567".into(),
                address: None,
                comment: None,
            },
        )
        .await
        .unwrap();
    (outcome.order_id(), product.id)
}

#[tokio::test]
async fn stale_online_order_is_reaped_and_stock_restored() {
    let db = setup_test_db().await;
    let (order_id, product_id) = online_order(&db, 400, PaymentMethod::Card, 3).await;
    assert_eq!(get_product(&db, product_id).await.stock, 7);
    backdate_order(&db, order_id, 31).await;

    let reaped = reaper(&db).sweep().await.unwrap();

    assert_eq!(reaped, 1);
    assert_eq!(get_order(&db, order_id).await.status(), OrderStatus::Cancelled);
    assert_eq!(get_product(&db, product_id).await.stock, 10);
}

#[tokio::test]
async fn fresh_online_order_is_left_alone() {
    let db = setup_test_db().await;
    let (order_id, _) = online_order(&db, 401, PaymentMethod::Click, 1).await;

    let reaped = reaper(&db).sweep().await.unwrap();

    assert_eq!(reaped, 0);
    assert_eq!(get_order(&db, order_id).await.status(), OrderStatus::New);
}

#[tokio::test]
async fn cash_orders_are_not_reaped() {
    let db = setup_test_db().await;
    let (order_id, _) = online_order(&db, 402, PaymentMethod::Cash, 1).await;
    backdate_order(&db, order_id, 120).await;

    let reaped = reaper(&db).sweep().await.unwrap();

    assert_eq!(reaped, 0);
    assert_eq!(get_order(&db, order_id).await.status(), OrderStatus::New);
}

#[tokio::test]
async fn order_with_live_payment_attempt_is_skipped() {
    let db = setup_test_db().await;
    let (order_id, _) = online_order(&db, 403, PaymentMethod::Card, 1).await;
    backdate_order(&db, order_id, 31).await;

    // The provider opened a transaction just now; the order is old but the
    // payment attempt is live.
    let payme = payme_service(&db);
    payme
        .create_transaction(CreateParams {
            id: "T-live".into(),
            time: Utc::now().timestamp_millis(),
            amount: json!(10_000 * 100),
            account: json!({ "order_id": order_id }),
        })
        .await
        .unwrap();

    let reaped = reaper(&db).sweep().await.unwrap();

    assert_eq!(reaped, 0);
    assert_eq!(get_order(&db, order_id).await.status(), OrderStatus::New);
}

#[tokio::test]
async fn dangling_transaction_is_cancelled_with_its_order() {
    let db = setup_test_db().await;
    let (order_id, product_id) = online_order(&db, 404, PaymentMethod::Card, 2).await;

    let payme = payme_service(&db);
    payme
        .create_transaction(CreateParams {
            id: "T-dangling".into(),
            time: Utc::now().timestamp_millis(),
            amount: json!(2 * 10_000 * 100),
            account: json!({ "order_id": order_id }),
        })
        .await
        .unwrap();

    let tx = payme_transaction::Entity::find()
        .filter(payme_transaction::Column::OrderId.eq(order_id))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    backdate_payme_transaction(&db, tx.id, 31).await;
    backdate_order(&db, order_id, 31).await;

    let reaped = reaper(&db).sweep().await.unwrap();

    assert_eq!(reaped, 1);
    assert_eq!(get_order(&db, order_id).await.status(), OrderStatus::Cancelled);
    assert_eq!(get_product(&db, product_id).await.stock, 10);

    let closed = payme_transaction::Entity::find_by_id(tx.id).one(&db).await.unwrap().unwrap();
    assert_eq!(closed.state, -1);
    assert_eq!(closed.reason, Some(4));
}

#[tokio::test]
async fn paid_orders_survive_the_sweep() {
    let db = setup_test_db().await;
    let (order_id, _) = online_order(&db, 405, PaymentMethod::Card, 1).await;

    let payme = payme_service(&db);
    payme
        .create_transaction(CreateParams {
            id: "T-paid".into(),
            time: Utc::now().timestamp_millis(),
            amount: json!(10_000 * 100),
            account: json!({ "order_id": order_id }),
        })
        .await
        .unwrap();
    payme
        .perform_transaction(tezshop_payments::services::payme::PerformParams {
            id: "T-paid".into(),
        })
        .await
        .unwrap();
    backdate_order(&db, order_id, 45).await;

    let reaped = reaper(&db).sweep().await.unwrap();

    assert_eq!(reaped, 0);
    assert_eq!(get_order(&db, order_id).await.status(), OrderStatus::Paid);
}

#[tokio::test]
async fn notifier_handle_is_not_required_for_sweeps() {
    // The reaper shares the order service; a null notifier must be enough.
    let db = setup_test_db().await;
    let service = tezshop_payments::OrderService::new(
        db.clone(),
        Arc::new(test_settings()),
        NotifierHandle::null(),
    );
    let reaper = Reaper::new(db.clone(), Arc::new(test_settings()), service);
    assert_eq!(reaper.sweep().await.unwrap(), 0);
}
