//! Click two-phase callback handler.
//!
//! `prepare` (action 0) validates that the order can be paid; `complete`
//! (action 1) captures the payment. Both callbacks are answered with HTTP
//! 200 and a JSON body whose `error` field carries the protocol code, so
//! the service returns a response in every case.

use std::sync::Arc;

use chrono::Utc;
use md5::{Digest, Md5};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use tezshop_core::money::parse_amount;
use tezshop_core::{NotifierHandle, Settings};

use crate::db::{begin, for_update};
use crate::entities::click_transaction::ClickTxStatus;
use crate::entities::order::{OrderStatus, OrderType, PaymentMethod};
use crate::entities::{click_transaction, order, user};
use crate::error::ClickError;
use crate::fiscal::{FiscalDispatcher, FiscalItem, FiscalReceipt};
use crate::services::orders::{drain_cart_for_order, load_order_items, OrderService};

/// Fiscal unit code for "piece".
const UNITS_PIECE: i64 = 241_092;

/// Raw callback fields. Everything stays a string until validated: the
/// signature is computed over the exact bytes the provider sent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClickRequest {
    #[serde(default)]
    pub click_trans_id: String,
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub click_paydoc_id: String,
    #[serde(default)]
    pub merchant_trans_id: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_note: String,
    #[serde(default)]
    pub sign_time: String,
    #[serde(default)]
    pub sign_string: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ClickResponse {
    pub click_trans_id: String,
    pub merchant_trans_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_prepare_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_confirm_id: Option<i64>,
    pub error: i32,
    pub error_note: String,
}

impl ClickResponse {
    fn ok(req: &ClickRequest, note: &str) -> Self {
        Self {
            click_trans_id: req.click_trans_id.clone(),
            merchant_trans_id: req.merchant_trans_id.clone(),
            merchant_prepare_id: None,
            merchant_confirm_id: None,
            error: 0,
            error_note: note.to_string(),
        }
    }

    fn failed(req: &ClickRequest, err: &ClickError) -> Self {
        Self {
            click_trans_id: req.click_trans_id.clone(),
            merchant_trans_id: req.merchant_trans_id.clone(),
            merchant_prepare_id: None,
            merchant_confirm_id: None,
            error: err.code(),
            error_note: err.note().to_string(),
        }
    }
}

/// `md5(click_trans_id ++ service_id ++ secret ++ merchant_trans_id ++
/// amount ++ action ++ sign_time)`, lowercase hex.
pub fn sign_payload(secret: &str, req: &ClickRequest) -> String {
    let text = format!(
        "{}{}{}{}{}{}{}",
        req.click_trans_id,
        req.service_id,
        secret,
        req.merchant_trans_id,
        req.amount,
        req.action,
        req.sign_time
    );
    hex::encode(Md5::digest(text.as_bytes()))
}

#[derive(Clone)]
pub struct ClickService {
    db: DatabaseConnection,
    settings: Arc<Settings>,
    orders: OrderService,
    notifier: NotifierHandle,
    fiscal: Arc<dyn FiscalDispatcher>,
}

impl ClickService {
    pub fn new(
        db: DatabaseConnection,
        settings: Arc<Settings>,
        orders: OrderService,
        notifier: NotifierHandle,
        fiscal: Arc<dyn FiscalDispatcher>,
    ) -> Self {
        Self { db, settings, orders, notifier, fiscal }
    }

    #[instrument(skip(self, req), fields(click_trans_id = %req.click_trans_id))]
    pub async fn prepare(&self, req: &ClickRequest) -> ClickResponse {
        match self.try_prepare(req).await {
            Ok(response) => response,
            Err(err) => {
                if let ClickError::Database(ref db_err) = err {
                    error!(%db_err, "prepare failed on database error");
                }
                ClickResponse::failed(req, &err)
            }
        }
    }

    #[instrument(skip(self, req), fields(click_trans_id = %req.click_trans_id))]
    pub async fn complete(&self, req: &ClickRequest) -> ClickResponse {
        match self.try_complete(req).await {
            Ok(response) => response,
            Err(err) => {
                if let ClickError::Database(ref db_err) = err {
                    error!(%db_err, "complete failed on database error");
                }
                ClickResponse::failed(req, &err)
            }
        }
    }

    fn check_sign(&self, req: &ClickRequest) -> bool {
        sign_payload(&self.settings.click_secret_key, req) == req.sign_string
    }

    async fn try_prepare(&self, req: &ClickRequest) -> Result<ClickResponse, ClickError> {
        if !self.check_sign(req) {
            return Err(ClickError::SignCheckFailed);
        }
        let action: i64 = req.action.trim().parse().map_err(|_| ClickError::BadRequest)?;
        if action != 0 {
            return Err(ClickError::ActionNotFound);
        }
        let amount = parse_amount(&req.amount).map_err(|_| ClickError::IncorrectAmount)?;
        let order_id: i64 = req
            .merchant_trans_id
            .trim()
            .parse()
            .map_err(|_| ClickError::OrderNotFound)?;

        let backend = self.db.get_database_backend();
        let txn = begin(&self.db, self.settings.lock_timeout_ms).await?;
        let target = for_update(backend, order::Entity::find_by_id(order_id))
            .one(&txn)
            .await?
            .ok_or(ClickError::OrderNotFound)?;

        if self.orders.cancel_expired_online_order(&txn, &target).await? {
            txn.commit().await?;
            return Err(ClickError::TransactionCancelled);
        }
        if amount != target.total_amount {
            return Err(ClickError::IncorrectAmount);
        }
        match target.status() {
            OrderStatus::New => {}
            OrderStatus::Cancelled => return Err(ClickError::TransactionCancelled),
            _ => return Err(ClickError::AlreadyPaid),
        }

        txn.commit().await?;
        let mut response = ClickResponse::ok(req, "Success");
        response.merchant_prepare_id = Some(req.merchant_trans_id.clone());
        Ok(response)
    }

    async fn try_complete(&self, req: &ClickRequest) -> Result<ClickResponse, ClickError> {
        if !self.check_sign(req) {
            return Err(ClickError::SignCheckFailed);
        }
        let action: i64 = req.action.trim().parse().map_err(|_| ClickError::BadRequest)?;
        if action != 1 {
            return Err(ClickError::ActionNotFound);
        }
        let amount = parse_amount(&req.amount).map_err(|_| ClickError::IncorrectAmount)?;
        let click_trans_id: i64 = req
            .click_trans_id
            .trim()
            .parse()
            .map_err(|_| ClickError::BadRequest)?;
        let service_id: i64 = req.service_id.trim().parse().unwrap_or_default();
        let click_paydoc_id: i64 = req.click_paydoc_id.trim().parse().unwrap_or_default();
        let provider_error: i64 = req.error.trim().parse().unwrap_or(0);
        let order_id: i64 = req
            .merchant_trans_id
            .trim()
            .parse()
            .map_err(|_| ClickError::OrderNotFound)?;

        let backend = self.db.get_database_backend();
        let txn = begin(&self.db, self.settings.lock_timeout_ms).await?;
        let target = for_update(backend, order::Entity::find_by_id(order_id))
            .one(&txn)
            .await?
            .ok_or(ClickError::OrderNotFound)?;

        if self.orders.cancel_expired_online_order(&txn, &target).await? {
            txn.commit().await?;
            return Err(ClickError::TransactionCancelled);
        }

        // The provider is the authority on the payment outcome: a negative
        // error on complete is an explicit cancellation, even for an order
        // that was already captured.
        if provider_error < 0 {
            if target.status() != OrderStatus::Cancelled {
                self.orders.cancel_order_in(&txn, target.id).await?;
                txn.commit().await?;
                warn!(order_id, provider_error, "order cancelled by provider");
                return Ok(ClickResponse::ok(req, "Transaction cancelled"));
            }
            txn.commit().await?;
            return Ok(ClickResponse::ok(req, "Transaction already cancelled"));
        }

        // A replayed callback for an already confirmed payment succeeds
        // without touching anything.
        let confirmed = click_transaction::Entity::find()
            .filter(click_transaction::Column::ClickTransId.eq(click_trans_id))
            .filter(click_transaction::Column::Status.eq(String::from(ClickTxStatus::Confirmed)))
            .one(&txn)
            .await?;
        if confirmed.is_some() {
            txn.commit().await?;
            let mut response = ClickResponse::ok(req, "Already confirmed");
            response.merchant_confirm_id = Some(target.id);
            return Ok(response);
        }

        match target.status() {
            OrderStatus::New => {}
            OrderStatus::Cancelled => return Err(ClickError::TransactionCancelled),
            _ => return Err(ClickError::AlreadyPaid),
        }
        if amount != target.total_amount {
            return Err(ClickError::IncorrectAmount);
        }

        let mut debtor = None;
        if target.order_type() == OrderType::DebtRepayment {
            let locked = for_update(backend, user::Entity::find_by_id(target.user_id))
                .one(&txn)
                .await?
                .ok_or(ClickError::OrderNotFound)?;
            if target.total_amount > locked.debt {
                return Err(ClickError::AmountExceedsDebt);
            }
            debtor = Some(locked);
        }

        let items = load_order_items(&txn, target.id).await?;
        let user_id = target.user_id;
        let total = target.total_amount;
        let is_debt = target.order_type() == OrderType::DebtRepayment;

        let mut paid: order::ActiveModel = target.into();
        paid.status = Set(if is_debt {
            OrderStatus::Done.into()
        } else {
            OrderStatus::Paid.into()
        });
        paid.payment_method = Set(PaymentMethod::Click.into());
        paid.update(&txn).await?;

        if let Some(debtor) = debtor {
            let remaining = (debtor.debt - total).max(0);
            let mut repaid: user::ActiveModel = debtor.into();
            repaid.debt = Set(remaining);
            repaid.update(&txn).await?;
        } else {
            drain_cart_for_order(&txn, backend, user_id, &items).await?;
        }

        click_transaction::ActiveModel {
            click_trans_id: Set(click_trans_id),
            service_id: Set(service_id),
            click_paydoc_id: Set(click_paydoc_id),
            merchant_trans_id: Set(req.merchant_trans_id.clone()),
            amount: Set(amount),
            action: Set(1),
            error: Set(0),
            error_note: Set(None),
            sign_time: Set(req.sign_time.clone()),
            sign_string: Set(req.sign_string.clone()),
            status: Set(ClickTxStatus::Confirmed.into()),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        info!(order_id, click_trans_id, total, "click payment confirmed");

        self.dispatch_fiscal(click_trans_id, total, is_debt, &items).await;

        let customer = user::Entity::find_by_id(user_id).one(&self.db).await?;
        self.notifier.notify(
            customer.and_then(|u| u.telegram_id),
            format!("✅ <b>Заказ #{} оплачен через Click!</b>\nСумма: {} сум", order_id, total),
        );

        let mut response = ClickResponse::ok(req, "Success");
        response.merchant_confirm_id = Some(order_id);
        Ok(response)
    }

    /// Fires the OFD receipt submission after commit. Failures are logged
    /// inside the dispatcher and never reach the provider response.
    async fn dispatch_fiscal(
        &self,
        click_trans_id: i64,
        total: i64,
        is_debt: bool,
        items: &[crate::entities::order_item::Model],
    ) {
        let receipt = match self.build_fiscal_receipt(total, is_debt, items).await {
            Ok(receipt) => receipt,
            Err(err) => {
                error!(%err, "failed to build fiscal receipt");
                return;
            }
        };
        let fiscal = Arc::clone(&self.fiscal);
        tokio::spawn(async move {
            fiscal.submit_items(click_trans_id, receipt).await;
        });
    }

    async fn build_fiscal_receipt(
        &self,
        total: i64,
        is_debt: bool,
        items: &[crate::entities::order_item::Model],
    ) -> Result<FiscalReceipt, sea_orm::DbErr> {
        use crate::entities::product;

        let mut lines = Vec::new();
        if is_debt {
            lines.push(FiscalItem {
                spic: self.settings.default_ikpu.clone(),
                title: "Погашение долга".to_string(),
                package_code: self.settings.default_package_code.clone(),
                price: total * 100,
                amount: 1,
                units: UNITS_PIECE,
                vat_percent: 0,
            });
        } else {
            let product_ids: Vec<i64> = items.iter().filter_map(|i| i.product_id).collect();
            let products: std::collections::BTreeMap<i64, product::Model> = product::Entity::find()
                .filter(product::Column::Id.is_in(product_ids))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|p| (p.id, p))
                .collect();
            for item in items {
                let catalog = item.product_id.and_then(|id| products.get(&id));
                lines.push(FiscalItem {
                    spic: catalog
                        .and_then(|p| p.ikpu.clone())
                        .unwrap_or_else(|| self.settings.default_ikpu.clone()),
                    title: item.product_name.clone(),
                    package_code: catalog
                        .and_then(|p| p.package_code.clone())
                        .unwrap_or_else(|| self.settings.default_package_code.clone()),
                    price: item.price_at_purchase * 100,
                    amount: item.quantity,
                    units: UNITS_PIECE,
                    vat_percent: 0,
                });
            }
        }

        Ok(FiscalReceipt {
            service_id: self.settings.click_service_id.parse().unwrap_or_default(),
            received_ecash: total * 100,
            items: lines,
        })
    }
}
