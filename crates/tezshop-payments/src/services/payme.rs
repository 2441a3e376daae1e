//! Payme JSON-RPC transaction state machine.
//!
//! States follow the provider protocol: 1 created, 2 performed, -1
//! cancelled before perform, -2 cancelled after perform. Per order at most
//! one transaction is in state 1 at any moment; the order row lock is the
//! critical section that upholds it.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use tezshop_core::money::{amount_from_json, to_tiyin};
use tezshop_core::{NotifierHandle, Settings};

use crate::db::{begin, for_update};
use crate::entities::order::{OrderStatus, OrderType, PaymentMethod};
use crate::entities::payme_transaction::{state, REASON_TIMEOUT};
use crate::entities::{order, payme_transaction, product, user};
use crate::error::{PaymeError, PaymeResult};
use crate::services::orders::{drain_cart_for_order, load_order_items, OrderService};

/// Tolerated clock skew into the future for provider timestamps.
const FUTURE_SKEW_MS: i64 = 60_000;

/// Provider ceiling for transaction age: both the staleness check in
/// `CreateTransaction` and the perform TTL, 12 hours.
const TRANSACTION_TTL_MS: i64 = 43_200_000;

/// Fiscal unit code for "piece".
const UNITS_PIECE: i64 = 241_092;

#[derive(Debug, Deserialize)]
pub struct CheckPerformParams {
    pub amount: Value,
    pub account: Value,
}

#[derive(Debug, Deserialize)]
pub struct CreateParams {
    pub id: String,
    pub time: i64,
    pub amount: Value,
    pub account: Value,
}

#[derive(Debug, Deserialize)]
pub struct PerformParams {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelParams {
    pub id: String,
    pub reason: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CheckParams {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatementParams {
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CheckPerformResult {
    pub allow: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CreateTransactionResult {
    pub create_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perform_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_time: Option<i64>,
    pub transaction: String,
    pub state: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<ReceiptDetail>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PerformTransactionResult {
    pub perform_time: i64,
    pub transaction: String,
    pub state: i32,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CancelTransactionResult {
    pub cancel_time: i64,
    pub transaction: String,
    pub state: i32,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CheckTransactionResult {
    pub create_time: i64,
    pub perform_time: i64,
    pub cancel_time: i64,
    pub transaction: String,
    pub state: i32,
    pub reason: Option<i32>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatementResult {
    pub transactions: Vec<StatementEntry>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatementEntry {
    pub id: String,
    pub time: i64,
    pub amount: i64,
    pub account: Value,
    pub create_time: i64,
    pub perform_time: i64,
    pub cancel_time: i64,
    pub transaction: String,
    pub state: i32,
    pub reason: Option<i32>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ReceiptDetail {
    pub receipt_type: i32,
    pub items: Vec<ReceiptItem>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ReceiptItem {
    pub title: String,
    /// Tiyin.
    pub price: i64,
    pub count: i32,
    pub code: String,
    pub units: i64,
    pub vat_percent: i32,
    pub package_code: String,
}

#[derive(Clone)]
pub struct PaymeService {
    db: DatabaseConnection,
    settings: Arc<Settings>,
    orders: OrderService,
    notifier: NotifierHandle,
}

impl PaymeService {
    pub fn new(
        db: DatabaseConnection,
        settings: Arc<Settings>,
        orders: OrderService,
        notifier: NotifierHandle,
    ) -> Self {
        Self { db, settings, orders, notifier }
    }

    #[instrument(skip(self, params))]
    pub async fn check_perform_transaction(
        &self,
        params: CheckPerformParams,
    ) -> PaymeResult<CheckPerformResult> {
        let amount = amount_from_json(&params.amount).map_err(|_| PaymeError::InvalidAmount)?;
        let order_id = self.order_id_from_account(&params.account)?;

        let backend = self.db.get_database_backend();
        let txn = begin(&self.db, self.settings.lock_timeout_ms).await?;
        let target = for_update(backend, order::Entity::find_by_id(order_id))
            .one(&txn)
            .await?
            .ok_or(PaymeError::OrderNotFound)?;

        if self.orders.cancel_expired_online_order(&txn, &target).await? {
            txn.commit().await?;
            return Err(PaymeError::OrderUnavailable);
        }
        if target.payment_method() != PaymentMethod::Card {
            return Err(PaymeError::OrderUnavailable);
        }
        if to_tiyin(target.total_amount) != amount {
            return Err(PaymeError::InvalidAmount);
        }
        if target.status() != OrderStatus::New {
            return Err(PaymeError::OrderUnavailable);
        }

        txn.commit().await?;
        Ok(CheckPerformResult { allow: true })
    }

    #[instrument(skip(self, params), fields(payme_id = %params.id))]
    pub async fn create_transaction(
        &self,
        params: CreateParams,
    ) -> PaymeResult<CreateTransactionResult> {
        let amount = amount_from_json(&params.amount).map_err(|_| PaymeError::InvalidAmount)?;

        let now_ms = Utc::now().timestamp_millis();
        if params.time > now_ms + FUTURE_SKEW_MS {
            return Err(PaymeError::InvalidTime);
        }
        if (now_ms - params.time).abs() > TRANSACTION_TTL_MS {
            return Err(PaymeError::InvalidTime);
        }

        let backend = self.db.get_database_backend();
        let txn = begin(&self.db, self.settings.lock_timeout_ms).await?;

        if let Some(existing) = for_update(
            backend,
            payme_transaction::Entity::find()
                .filter(payme_transaction::Column::PaymeId.eq(params.id.clone())),
        )
        .one(&txn)
        .await?
        {
            if existing.amount != amount {
                return Err(PaymeError::InvalidAmount);
            }
            let order_id = self.order_id_from_account(&params.account)?;
            if existing.order_id != order_id {
                return Err(PaymeError::OrderUnavailable);
            }

            if existing.state == state::CREATED {
                // Replay of the original request: answer byte-identically,
                // receipt detail included.
                let target = order::Entity::find_by_id(existing.order_id)
                    .one(&txn)
                    .await?
                    .ok_or(PaymeError::OrderNotFound)?;
                let detail = self.receipt_detail(&txn, &target).await?;
                txn.commit().await?;
                return Ok(CreateTransactionResult {
                    create_time: existing.create_time.timestamp_millis(),
                    perform_time: None,
                    cancel_time: None,
                    transaction: existing.id.to_string(),
                    state: state::CREATED,
                    detail: Some(detail),
                });
            }

            // Terminal duplicate: return the frozen snapshot.
            txn.commit().await?;
            return Ok(CreateTransactionResult {
                create_time: existing.create_time.timestamp_millis(),
                perform_time: Some(existing.perform_time.map(|t| t.timestamp_millis()).unwrap_or(0)),
                cancel_time: Some(existing.cancel_time.map(|t| t.timestamp_millis()).unwrap_or(0)),
                transaction: existing.id.to_string(),
                state: existing.state,
                detail: None,
            });
        }

        let order_id = self.order_id_from_account(&params.account)?;
        let target = for_update(backend, order::Entity::find_by_id(order_id))
            .one(&txn)
            .await?
            .ok_or(PaymeError::OrderNotFound)?;

        if self.orders.cancel_expired_online_order(&txn, &target).await? {
            txn.commit().await?;
            return Err(PaymeError::OrderUnavailable);
        }
        if target.payment_method() != PaymentMethod::Card {
            return Err(PaymeError::OrderUnavailable);
        }
        if to_tiyin(target.total_amount) != amount {
            return Err(PaymeError::InvalidAmount);
        }
        if target.status() != OrderStatus::New {
            return Err(PaymeError::OrderUnavailable);
        }

        if target.order_type() == OrderType::DebtRepayment {
            let debtor = for_update(backend, user::Entity::find_by_id(target.user_id))
                .one(&txn)
                .await?
                .ok_or(PaymeError::OrderNotFound)?;
            if amount > to_tiyin(debtor.debt) {
                // Overpayment attempt kills the order outright.
                self.orders.cancel_order_in(&txn, target.id).await?;
                txn.commit().await?;
                return Err(PaymeError::AmountExceedsDebt);
            }
        }

        // At most one active transaction per order: a provider retry with a
        // fresh id supersedes the stale attempt.
        if let Some(active) = for_update(
            backend,
            payme_transaction::Entity::find()
                .filter(payme_transaction::Column::OrderId.eq(order_id))
                .filter(payme_transaction::Column::State.eq(state::CREATED)),
        )
        .one(&txn)
        .await?
        {
            warn!(order_id, superseded = %active.payme_id, "cancelling stale active transaction");
            let mut stale: payme_transaction::ActiveModel = active.into();
            stale.state = Set(state::CANCELLED);
            stale.reason = Set(Some(REASON_TIMEOUT));
            stale.cancel_time = Set(Some(Utc::now().into()));
            stale.update(&txn).await?;
        }

        let created = payme_transaction::ActiveModel {
            payme_id: Set(params.id.clone()),
            time: Set(params.time),
            amount: Set(amount),
            order_id: Set(order_id),
            state: Set(state::CREATED),
            create_time: Set(Utc::now().into()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let detail = self.receipt_detail(&txn, &target).await?;
        txn.commit().await?;
        info!(order_id, transaction = created.id, "payme transaction created");

        Ok(CreateTransactionResult {
            create_time: created.create_time.timestamp_millis(),
            perform_time: None,
            cancel_time: None,
            transaction: created.id.to_string(),
            state: state::CREATED,
            detail: Some(detail),
        })
    }

    #[instrument(skip(self, params), fields(payme_id = %params.id))]
    pub async fn perform_transaction(
        &self,
        params: PerformParams,
    ) -> PaymeResult<PerformTransactionResult> {
        let backend = self.db.get_database_backend();
        let txn = begin(&self.db, self.settings.lock_timeout_ms).await?;

        let tx = for_update(
            backend,
            payme_transaction::Entity::find()
                .filter(payme_transaction::Column::PaymeId.eq(params.id.clone())),
        )
        .one(&txn)
        .await?
        .ok_or(PaymeError::TransactionNotFound)?;

        if tx.state == state::PERFORMED {
            return Ok(PerformTransactionResult {
                perform_time: tx.perform_time.map(|t| t.timestamp_millis()).unwrap_or(0),
                transaction: tx.id.to_string(),
                state: state::PERFORMED,
            });
        }
        if tx.state != state::CREATED {
            return Err(PaymeError::AlreadyDone);
        }

        let age_ms = Utc::now().timestamp_millis() - tx.create_time.timestamp_millis();
        if age_ms > TRANSACTION_TTL_MS {
            let tx_id = tx.id;
            let mut timed_out: payme_transaction::ActiveModel = tx.into();
            timed_out.state = Set(state::CANCELLED);
            timed_out.reason = Set(Some(REASON_TIMEOUT));
            timed_out.cancel_time = Set(Some(Utc::now().into()));
            timed_out.update(&txn).await?;
            txn.commit().await?;
            warn!(transaction = tx_id, "transaction timed out at perform");
            return Err(PaymeError::AlreadyDone);
        }

        let target = for_update(backend, order::Entity::find_by_id(tx.order_id))
            .one(&txn)
            .await?
            .ok_or(PaymeError::OrderNotFound)?;

        if self.orders.cancel_expired_online_order(&txn, &target).await? {
            txn.commit().await?;
            return Err(PaymeError::OrderUnavailable);
        }
        if target.payment_method() != PaymentMethod::Card || target.status() != OrderStatus::New {
            return Err(PaymeError::OrderUnavailable);
        }

        let mut debtor = None;
        if target.order_type() == OrderType::DebtRepayment {
            let locked = for_update(backend, user::Entity::find_by_id(target.user_id))
                .one(&txn)
                .await?
                .ok_or(PaymeError::OrderNotFound)?;
            if target.total_amount > locked.debt {
                self.orders.cancel_order_in(&txn, target.id).await?;
                txn.commit().await?;
                return Err(PaymeError::AmountExceedsDebt);
            }
            debtor = Some(locked);
        }

        let perform_time = Utc::now();
        let tx_row_id = tx.id;
        let mut performing: payme_transaction::ActiveModel = tx.into();
        performing.state = Set(state::PERFORMED);
        performing.perform_time = Set(Some(perform_time.into()));
        performing.update(&txn).await?;

        let items = load_order_items(&txn, target.id).await?;
        let order_id = target.id;
        let user_id = target.user_id;
        let total = target.total_amount;
        let is_debt = target.order_type() == OrderType::DebtRepayment;

        let mut paid: order::ActiveModel = target.into();
        paid.status = Set(OrderStatus::Paid.into());
        paid.payment_method = Set(PaymentMethod::Card.into());
        if is_debt {
            // Repayments finish immediately; nothing ships.
            paid.status = Set(OrderStatus::Done.into());
        }
        paid.update(&txn).await?;

        let mut remaining_debt = 0;
        if let Some(debtor) = debtor {
            remaining_debt = (debtor.debt - total).max(0);
            let telegram_id = debtor.telegram_id;
            let mut repaid: user::ActiveModel = debtor.into();
            repaid.debt = Set(remaining_debt);
            repaid.update(&txn).await?;
            txn.commit().await?;
            self.notifier.notify(
                telegram_id,
                format!(
                    "✅ <b>Долг погашен на {} сум!</b>\nОстаток долга: {} сум.",
                    total, remaining_debt
                ),
            );
        } else {
            drain_cart_for_order(&txn, backend, user_id, &items).await?;
            txn.commit().await?;
            let customer = user::Entity::find_by_id(user_id).one(&self.db).await?;
            self.notifier.notify(
                customer.and_then(|u| u.telegram_id),
                format!("✅ <b>Заказ #{} оплачен через Payme!</b>\nСумма: {} сум", order_id, total),
            );
        }
        info!(order_id, transaction = tx_row_id, remaining_debt, "payme transaction performed");

        Ok(PerformTransactionResult {
            perform_time: perform_time.timestamp_millis(),
            transaction: tx_row_id.to_string(),
            state: state::PERFORMED,
        })
    }

    #[instrument(skip(self, params), fields(payme_id = %params.id))]
    pub async fn cancel_transaction(
        &self,
        params: CancelParams,
    ) -> PaymeResult<CancelTransactionResult> {
        let backend = self.db.get_database_backend();
        let txn = begin(&self.db, self.settings.lock_timeout_ms).await?;

        let tx = for_update(
            backend,
            payme_transaction::Entity::find()
                .filter(payme_transaction::Column::PaymeId.eq(params.id.clone())),
        )
        .one(&txn)
        .await?
        .ok_or(PaymeError::TransactionNotFound)?;

        if tx.state < 0 {
            return Ok(CancelTransactionResult {
                cancel_time: tx.cancel_time.map(|t| t.timestamp_millis()).unwrap_or(0),
                transaction: tx.id.to_string(),
                state: tx.state,
            });
        }

        // Money already captured: a refund needs an operator decision, not
        // an unattended callback.
        if tx.state == state::PERFORMED {
            return Err(PaymeError::CannotCancel);
        }

        let cancel_time = Utc::now();
        let tx_row_id = tx.id;
        let order_id = tx.order_id;
        let mut cancelled: payme_transaction::ActiveModel = tx.into();
        cancelled.state = Set(state::CANCELLED);
        cancelled.reason = Set(params.reason);
        cancelled.cancel_time = Set(Some(cancel_time.into()));
        cancelled.update(&txn).await?;

        self.orders.cancel_order_in(&txn, order_id).await?;
        txn.commit().await?;
        info!(order_id, transaction = tx_row_id, reason = ?params.reason, "payme transaction cancelled");

        Ok(CancelTransactionResult {
            cancel_time: cancel_time.timestamp_millis(),
            transaction: tx_row_id.to_string(),
            state: state::CANCELLED,
        })
    }

    #[instrument(skip(self, params), fields(payme_id = %params.id))]
    pub async fn check_transaction(
        &self,
        params: CheckParams,
    ) -> PaymeResult<CheckTransactionResult> {
        let tx = payme_transaction::Entity::find()
            .filter(payme_transaction::Column::PaymeId.eq(params.id))
            .one(&self.db)
            .await?
            .ok_or(PaymeError::TransactionNotFound)?;

        Ok(CheckTransactionResult {
            create_time: tx.create_time.timestamp_millis(),
            perform_time: tx.perform_time.map(|t| t.timestamp_millis()).unwrap_or(0),
            cancel_time: tx.cancel_time.map(|t| t.timestamp_millis()).unwrap_or(0),
            transaction: tx.id.to_string(),
            state: tx.state,
            reason: tx.reason,
        })
    }

    #[instrument(skip(self, params))]
    pub async fn get_statement(&self, params: StatementParams) -> PaymeResult<StatementResult> {
        let rows = payme_transaction::Entity::find()
            .filter(payme_transaction::Column::Time.gte(params.from))
            .filter(payme_transaction::Column::Time.lte(params.to))
            .order_by_asc(payme_transaction::Column::Time)
            .all(&self.db)
            .await?;

        let account_field = self.settings.payme_account_field.as_str();
        let transactions = rows
            .into_iter()
            .map(|tx| StatementEntry {
                id: tx.payme_id,
                time: tx.time,
                amount: tx.amount,
                account: serde_json::json!({ account_field: tx.order_id.to_string() }),
                create_time: tx.create_time.timestamp_millis(),
                perform_time: tx.perform_time.map(|t| t.timestamp_millis()).unwrap_or(0),
                cancel_time: tx.cancel_time.map(|t| t.timestamp_millis()).unwrap_or(0),
                transaction: tx.id.to_string(),
                state: tx.state,
                reason: tx.reason,
            })
            .collect();

        Ok(StatementResult { transactions })
    }

    /// Resolves the order id out of the JSON-RPC `account` object; the key
    /// name comes from configuration.
    fn order_id_from_account(&self, account: &Value) -> PaymeResult<i64> {
        let value = account
            .get(self.settings.payme_account_field.as_str())
            .ok_or(PaymeError::OrderNotFound)?;
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or(PaymeError::OrderNotFound)
    }

    /// Receipt lines for the provider's fiscal module. Debt repayments have
    /// no order items and are billed as a single synthetic service line.
    async fn receipt_detail(
        &self,
        txn: &DatabaseTransaction,
        target: &order::Model,
    ) -> PaymeResult<ReceiptDetail> {
        if target.order_type() == OrderType::DebtRepayment {
            return Ok(ReceiptDetail {
                receipt_type: 0,
                items: vec![ReceiptItem {
                    title: "Погашение долга".to_string(),
                    price: to_tiyin(target.total_amount),
                    count: 1,
                    code: self.settings.default_ikpu.clone(),
                    units: UNITS_PIECE,
                    vat_percent: 0,
                    package_code: self.settings.default_package_code.clone(),
                }],
            });
        }

        let items = load_order_items(txn, target.id).await?;
        let product_ids: Vec<i64> = items.iter().filter_map(|i| i.product_id).collect();
        let products: std::collections::BTreeMap<i64, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(txn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let items = items
            .into_iter()
            .map(|item| {
                let catalog = item.product_id.and_then(|id| products.get(&id));
                ReceiptItem {
                    title: item.product_name,
                    price: to_tiyin(item.price_at_purchase),
                    count: item.quantity,
                    code: catalog
                        .and_then(|p| p.ikpu.clone())
                        .unwrap_or_else(|| self.settings.default_ikpu.clone()),
                    units: UNITS_PIECE,
                    vat_percent: 0,
                    package_code: catalog
                        .and_then(|p| p.package_code.clone())
                        .unwrap_or_else(|| self.settings.default_package_code.clone()),
                }
            })
            .collect();

        Ok(ReceiptDetail { receipt_type: 0, items })
    }
}
