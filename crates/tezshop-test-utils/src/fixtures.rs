//! Entity fixtures and service constructors shared by integration tests.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

use tezshop_core::{NotifierHandle, Settings};
use tezshop_payments::entities::{cart_item, order, payme_transaction, product, user};
use tezshop_payments::services::click::{sign_payload, ClickRequest};
use tezshop_payments::{ClickService, NullFiscal, OrderService, PaymeService};

/// Deterministic local settings for service-level tests.
pub fn test_settings() -> Settings {
    Settings {
        database_url: "sqlite::memory:".into(),
        bind_addr: "127.0.0.1:8080".parse().expect("static addr"),
        payme_id: "test-merchant".into(),
        payme_key: "test-payme-key".into(),
        payme_url: "https://checkout.test.paycom.uz".into(),
        payme_account_field: "order_id".into(),
        payme_min_amount: 100_000,
        click_service_id: "95107".into(),
        click_merchant_id: "55704".into(),
        click_secret_key: "test-click-secret".into(),
        click_merchant_user_id: "77105".into(),
        order_payment_timeout_minutes: 20,
        pickup_address: "Самовывоз: Чиланзар, 1".into(),
        default_ikpu: "00702001001000001".into(),
        default_package_code: "000000".into(),
        bot_token: None,
        lock_timeout_ms: 5000,
    }
}

pub fn order_service(db: &DatabaseConnection) -> OrderService {
    OrderService::new(db.clone(), Arc::new(test_settings()), NotifierHandle::null())
}

pub fn payme_service(db: &DatabaseConnection) -> PaymeService {
    PaymeService::new(
        db.clone(),
        Arc::new(test_settings()),
        order_service(db),
        NotifierHandle::null(),
    )
}

pub fn click_service(db: &DatabaseConnection) -> ClickService {
    ClickService::new(
        db.clone(),
        Arc::new(test_settings()),
        order_service(db),
        NotifierHandle::null(),
        Arc::new(NullFiscal),
    )
}

pub async fn create_user(db: &DatabaseConnection, telegram_id: i64, debt: i64) -> user::Model {
    user::ActiveModel {
        telegram_id: Set(Some(telegram_id)),
        username: Set(Some(format!("user{telegram_id}"))),
        phone: Set(Some("+998901234567".into())),
        language: Set("ru".into()),
        role: Set("user".into()),
        debt: Set(debt),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert user")
}

pub async fn create_product(
    db: &DatabaseConnection,
    name: &str,
    price: i64,
    stock: i32,
) -> product::Model {
    product::ActiveModel {
        name: Set(name.to_string()),
        price: Set(price),
        stock: Set(stock),
        is_active: Set(true),
        ikpu: Set(Some("00702001001000001".into())),
        package_code: Set(Some("123456".into())),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert product")
}

pub async fn deactivate_product(db: &DatabaseConnection, product_id: i64) {
    let found = product::Entity::find_by_id(product_id)
        .one(db)
        .await
        .expect("load product")
        .expect("product exists");
    let mut active: product::ActiveModel = found.into();
    active.is_active = Set(false);
    active.update(db).await.expect("deactivate product");
}

pub async fn add_cart_item(
    db: &DatabaseConnection,
    user_id: i64,
    product_id: i64,
    quantity: i32,
) -> cart_item::Model {
    cart_item::ActiveModel {
        user_id: Set(user_id),
        product_id: Set(product_id),
        quantity: Set(quantity),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert cart item")
}

/// Moves an order's creation time into the past, for expiry scenarios.
pub async fn backdate_order(db: &DatabaseConnection, order_id: i64, minutes: i64) {
    let found = order::Entity::find_by_id(order_id)
        .one(db)
        .await
        .expect("load order")
        .expect("order exists");
    let mut active: order::ActiveModel = found.into();
    active.created_at = Set((Utc::now() - Duration::minutes(minutes)).into());
    active.update(db).await.expect("backdate order");
}

/// Moves a Payme transaction's creation time into the past.
pub async fn backdate_payme_transaction(db: &DatabaseConnection, tx_id: i64, minutes: i64) {
    let found = payme_transaction::Entity::find_by_id(tx_id)
        .one(db)
        .await
        .expect("load transaction")
        .expect("transaction exists");
    let mut active: payme_transaction::ActiveModel = found.into();
    active.create_time = Set((Utc::now() - Duration::minutes(minutes)).into());
    active.update(db).await.expect("backdate transaction");
}

pub async fn get_order(db: &DatabaseConnection, order_id: i64) -> order::Model {
    order::Entity::find_by_id(order_id)
        .one(db)
        .await
        .expect("load order")
        .expect("order exists")
}

pub async fn get_product(db: &DatabaseConnection, product_id: i64) -> product::Model {
    product::Entity::find_by_id(product_id)
        .one(db)
        .await
        .expect("load product")
        .expect("product exists")
}

pub async fn get_user(db: &DatabaseConnection, user_id: i64) -> user::Model {
    user::Entity::find_by_id(user_id)
        .one(db)
        .await
        .expect("load user")
        .expect("user exists")
}

pub async fn cart_rows(db: &DatabaseConnection, user_id: i64) -> Vec<cart_item::Model> {
    use sea_orm::{ColumnTrait, QueryFilter, QueryOrder};
    cart_item::Entity::find()
        .filter(cart_item::Column::UserId.eq(user_id))
        .order_by_asc(cart_item::Column::Id)
        .all(db)
        .await
        .expect("load cart")
}

/// A correctly signed Click callback for the test secret.
pub fn signed_click_request(
    settings: &Settings,
    click_trans_id: i64,
    order_id: i64,
    amount: &str,
    action: i32,
) -> ClickRequest {
    let mut request = ClickRequest {
        click_trans_id: click_trans_id.to_string(),
        service_id: settings.click_service_id.clone(),
        click_paydoc_id: "900001".into(),
        merchant_trans_id: order_id.to_string(),
        amount: amount.to_string(),
        action: action.to_string(),
        error: "0".into(),
        error_note: String::new(),
        sign_time: "2024-01-01 12:00:00".into(),
        sign_string: String::new(),
    };
    request.sign_string = sign_payload(&settings.click_secret_key, &request);
    request
}
