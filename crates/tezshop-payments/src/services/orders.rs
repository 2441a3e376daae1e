use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{info, instrument};

use tezshop_core::{NotifierHandle, Settings};

use crate::db::{begin, for_update};
use crate::dto::{CheckoutOutcome, CreateOrderRequest};
use crate::entities::order::{DeliveryMethod, OrderStatus, OrderType, PaymentMethod};
use crate::entities::{cart_item, order, order_item, product, user};
use crate::error::{OrderError, OrderResult};
use crate::links;
use crate::services::stock;

/// Order lifecycle: creation with atomic stock reservation, expiry
/// cancellation for abandoned online orders, and compensating cancel.
#[derive(Clone)]
pub struct OrderService {
    db: DatabaseConnection,
    settings: Arc<Settings>,
    notifier: NotifierHandle,
}

impl OrderService {
    pub fn new(db: DatabaseConnection, settings: Arc<Settings>, notifier: NotifierHandle) -> Self {
        Self { db, settings, notifier }
    }

    /// Creates a product order from the user's cart rows.
    ///
    /// Everything up to the outcome happens in one transaction: stock is
    /// reserved with conditional updates, snapshots are written, and the
    /// cart is consumed immediately only for cash orders. Online orders
    /// keep their cart rows until the provider confirms payment.
    #[instrument(skip(self, req))]
    pub async fn create_order(
        &self,
        user_id: i64,
        req: &CreateOrderRequest,
    ) -> OrderResult<CheckoutOutcome> {
        let phone = normalize_phone(&req.phone)?;
        let backend = self.db.get_database_backend();
        let txn = begin(&self.db, self.settings.lock_timeout_ms).await?;

        let user = user::Entity::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or(OrderError::UserNotFound)?;
        if user.debt > 0 {
            return Err(OrderError::HasDebt);
        }

        let address = match req.delivery_method {
            DeliveryMethod::Delivery => req
                .address
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .ok_or(OrderError::MissingAddress)?,
            _ => self.settings.pickup_address.clone(),
        };

        // Tear down this user's expired online orders first; anything left
        // pending is still inside the payment window and blocks a new one.
        let pending = for_update(
            backend,
            order::Entity::find()
                .filter(order::Column::UserId.eq(user_id))
                .filter(order::Column::Status.eq(String::from(OrderStatus::New)))
                .filter(order::Column::PaymentMethod.is_in([
                    String::from(PaymentMethod::Card),
                    String::from(PaymentMethod::Click),
                ])),
        )
        .all(&txn)
        .await?;
        let mut has_live_pending = false;
        for pending_order in &pending {
            if !self.cancel_expired_online_order(&txn, pending_order).await? {
                has_live_pending = true;
            }
        }
        if has_live_pending {
            return Err(OrderError::PendingOnlineOrder);
        }

        let cart_rows = for_update(
            backend,
            cart_item::Entity::find()
                .filter(cart_item::Column::Id.is_in(req.item_ids.clone()))
                .filter(cart_item::Column::UserId.eq(user_id)),
        )
        .order_by_asc(cart_item::Column::Id)
        .all(&txn)
        .await?;
        if cart_rows.len() != req.item_ids.len() {
            return Err(OrderError::InvalidItems);
        }

        let product_ids: Vec<i64> = cart_rows.iter().map(|row| row.product_id).collect();
        let products: BTreeMap<i64, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&txn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut total: i64 = 0;
        for row in &cart_rows {
            let product = products.get(&row.product_id).ok_or(OrderError::InvalidItems)?;
            if !product.is_active {
                return Err(OrderError::ProductUnavailable(product.name.clone()));
            }
            if !stock::reserve(&txn, product.id, row.quantity).await? {
                let available = product::Entity::find_by_id(product.id)
                    .one(&txn)
                    .await?
                    .map(|p| p.stock)
                    .unwrap_or(0);
                return Err(OrderError::InsufficientStock {
                    name: product.name.clone(),
                    available,
                });
            }
            total += product.price * i64::from(row.quantity);
        }
        if total <= 0 {
            return Err(OrderError::EmptyOrder);
        }

        let new_order = order::ActiveModel {
            user_id: Set(user_id),
            status: Set(OrderStatus::New.into()),
            order_type: Set(OrderType::Product.into()),
            payment_method: Set(req.payment_method.into()),
            delivery_method: Set(req.delivery_method.into()),
            delivery_address: Set(Some(address.clone())),
            total_amount: Set(total),
            comment: Set(req.comment.clone()),
            contact_phone: Set(phone),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for row in &cart_rows {
            let product = &products[&row.product_id];
            order_item::ActiveModel {
                order_id: Set(new_order.id),
                product_id: Set(Some(product.id)),
                product_name: Set(product.name.clone()),
                price_at_purchase: Set(product.price),
                quantity: Set(row.quantity),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        // Cash orders consume the cart now; online orders drain it on the
        // provider's success callback instead.
        if req.payment_method == PaymentMethod::Cash {
            cart_item::Entity::delete_many()
                .filter(cart_item::Column::Id.is_in(req.item_ids.clone()))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        info!(order_id = new_order.id, total, method = %new_order.payment_method, "order created");

        Ok(match req.payment_method {
            PaymentMethod::Card => {
                self.notifier.notify(
                    user.telegram_id,
                    format!("💳 <b>Заказ #{} создан!</b>\nОжидаем оплату: {} сум.", new_order.id, total),
                );
                CheckoutOutcome::Redirect {
                    order_id: new_order.id,
                    url: links::payme_checkout_url(&self.settings, new_order.id, total),
                }
            }
            PaymentMethod::Click => {
                self.notifier.notify(
                    user.telegram_id,
                    format!(
                        "💳 <b>Заказ #{} создан!</b>\nОжидаем оплату через Click: {} сум.",
                        new_order.id, total
                    ),
                );
                CheckoutOutcome::Redirect {
                    order_id: new_order.id,
                    url: links::click_checkout_url(&self.settings, new_order.id, total),
                }
            }
            PaymentMethod::Cash => {
                self.notifier.notify(
                    user.telegram_id,
                    format!(
                        "✅ <b>Заказ #{} принят!</b>\n💰 {} сум\n📍 {}\nОплата наличными при получении.",
                        new_order.id, total, address
                    ),
                );
                CheckoutOutcome::Success { order_id: new_order.id }
            }
        })
    }

    /// Creates an item-less debt-repayment order paid through Payme.
    #[instrument(skip(self))]
    pub async fn create_debt_repayment(
        &self,
        user_id: i64,
        amount: i64,
    ) -> OrderResult<CheckoutOutcome> {
        let backend = self.db.get_database_backend();
        let txn = begin(&self.db, self.settings.lock_timeout_ms).await?;

        let user = for_update(backend, user::Entity::find_by_id(user_id))
            .one(&txn)
            .await?
            .ok_or(OrderError::UserNotFound)?;
        if user.debt <= 0 {
            return Err(OrderError::NoDebt);
        }
        if amount <= 0 {
            return Err(OrderError::InvalidRepaymentAmount);
        }
        if amount > user.debt {
            return Err(OrderError::AmountExceedsDebt { debt: user.debt });
        }

        let new_order = order::ActiveModel {
            user_id: Set(user_id),
            status: Set(OrderStatus::New.into()),
            order_type: Set(OrderType::DebtRepayment.into()),
            payment_method: Set(PaymentMethod::Card.into()),
            delivery_method: Set(DeliveryMethod::None.into()),
            delivery_address: Set(None),
            total_amount: Set(amount),
            comment: Set(Some("Погашение долга".to_string())),
            contact_phone: Set(user.phone.clone().unwrap_or_default()),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        info!(order_id = new_order.id, amount, "debt repayment order created");

        Ok(CheckoutOutcome::Redirect {
            order_id: new_order.id,
            url: links::payme_checkout_url(&self.settings, new_order.id, amount),
        })
    }

    /// Cancels an unpaid online order whose payment window has passed.
    /// Returns `true` iff the order was cancelled by this call.
    pub async fn cancel_expired_online_order(
        &self,
        txn: &DatabaseTransaction,
        order: &order::Model,
    ) -> OrderResult<bool> {
        if order.status() != OrderStatus::New || !order.is_online() {
            return Ok(false);
        }
        let cutoff = Utc::now() - self.settings.payment_timeout();
        if order.created_at.with_timezone(&Utc) >= cutoff {
            return Ok(false);
        }
        self.cancel_order_in(txn, order.id).await?;
        info!(order_id = order.id, "expired online order cancelled");
        Ok(true)
    }

    /// Cancels an order in its own transaction.
    pub async fn cancel_order(&self, order_id: i64) -> OrderResult<()> {
        let txn = begin(&self.db, self.settings.lock_timeout_ms).await?;
        self.cancel_order_in(&txn, order_id).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Compensating cancel inside an existing transaction: restores stock
    /// for product orders, restores debt for repayments that had already
    /// been captured, then flips the status. Idempotent.
    pub async fn cancel_order_in(
        &self,
        txn: &DatabaseTransaction,
        order_id: i64,
    ) -> OrderResult<()> {
        let backend = self.db.get_database_backend();
        let target = for_update(backend, order::Entity::find_by_id(order_id))
            .one(txn)
            .await?
            .ok_or(OrderError::OrderNotFound)?;
        if target.status() == OrderStatus::Cancelled {
            return Ok(());
        }

        match target.order_type() {
            OrderType::Product => {
                let items = order_item::Entity::find()
                    .filter(order_item::Column::OrderId.eq(order_id))
                    .all(txn)
                    .await?;
                for item in items {
                    if let Some(product_id) = item.product_id {
                        stock::restore(txn, product_id, item.quantity).await?;
                    }
                }
            }
            OrderType::DebtRepayment => {
                if matches!(target.status(), OrderStatus::Paid | OrderStatus::Done) {
                    stock::restore_debt(txn, target.user_id, target.total_amount).await?;
                }
            }
        }

        let mut active: order::ActiveModel = target.into();
        active.status = Set(OrderStatus::Cancelled.into());
        active.update(txn).await?;
        info!(order_id, "order cancelled");
        Ok(())
    }
}

/// The contact phone must carry at least 9 digits to be dialable in UZ.
fn normalize_phone(raw: &str) -> Result<String, OrderError> {
    let trimmed = raw.trim();
    let digits = trimmed.chars().filter(char::is_ascii_digit).count();
    if digits < 9 {
        return Err(OrderError::InvalidPhone);
    }
    Ok(trimmed.to_string())
}

/// Subtracts exactly the ordered quantities from the user's cart after a
/// successful online payment. Rows added to the cart after order creation
/// survive: only products present in the order are touched, and each is
/// reduced by no more than its ordered quantity. Rows are processed in id
/// order so concurrent callbacks on overlapping carts cannot deadlock.
pub(crate) async fn drain_cart_for_order(
    txn: &DatabaseTransaction,
    backend: sea_orm::DbBackend,
    user_id: i64,
    items: &[order_item::Model],
) -> Result<(), DbErr> {
    let mut remaining: BTreeMap<i64, i32> = BTreeMap::new();
    for item in items {
        if let Some(product_id) = item.product_id {
            *remaining.entry(product_id).or_insert(0) += item.quantity;
        }
    }
    if remaining.is_empty() {
        return Ok(());
    }

    let cart_rows = for_update(
        backend,
        cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.is_in(remaining.keys().copied().collect::<Vec<_>>())),
    )
    .order_by_asc(cart_item::Column::Id)
    .all(txn)
    .await?;

    for row in cart_rows {
        let Some(need) = remaining.get_mut(&row.product_id) else {
            continue;
        };
        if *need <= 0 {
            continue;
        }
        if row.quantity > *need {
            let take = *need;
            *need = 0;
            let quantity_left = row.quantity - take;
            let mut active: cart_item::ActiveModel = row.into();
            active.quantity = Set(quantity_left);
            active.update(txn).await?;
        } else {
            *need -= row.quantity;
            row.delete(txn).await?;
        }
    }
    Ok(())
}

/// Order lines for receipts and cart draining.
pub(crate) async fn load_order_items(
    txn: &DatabaseTransaction,
    order_id: i64,
) -> Result<Vec<order_item::Model>, DbErr> {
    order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::Id)
        .all(txn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_with_nine_digits_passes() {
        assert_eq!(normalize_phone(" +998 90 123-45-67 ").unwrap(), "+998 90 123-45-67");
    }

    #[test]
    fn short_phone_is_rejected() {
        assert!(matches!(normalize_phone("12345"), Err(OrderError::InvalidPhone)));
        assert!(matches!(normalize_phone(""), Err(OrderError::InvalidPhone)));
    }
}
