use sea_orm::DbErr;
use thiserror::Error;

use crate::db::is_lock_timeout;

/// Order lifecycle errors, surfaced to the shop checkout layer.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("user not found")]
    UserNotFound,

    #[error("order not found")]
    OrderNotFound,

    #[error("contact phone must contain at least 9 digits")]
    InvalidPhone,

    #[error("user has outstanding debt")]
    HasDebt,

    #[error("user already has a pending online order")]
    PendingOnlineOrder,

    #[error("delivery address is required")]
    MissingAddress,

    #[error("requested cart items do not belong to the user")]
    InvalidItems,

    #[error("product '{0}' is no longer available")]
    ProductUnavailable(String),

    #[error("not enough stock for '{name}': {available} left")]
    InsufficientStock { name: String, available: i32 },

    #[error("order total must be positive")]
    EmptyOrder,

    #[error("user has no debt to repay")]
    NoDebt,

    #[error("repayment amount must be positive")]
    InvalidRepaymentAmount,

    #[error("amount exceeds current debt ({debt})")]
    AmountExceedsDebt { debt: i64 },
}

pub type OrderResult<T> = Result<T, OrderError>;

/// Payme JSON-RPC protocol errors. Codes are fixed by the provider.
#[derive(Debug, Error)]
pub enum PaymeError {
    #[error("request body is not valid JSON-RPC")]
    ParseError,

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("authorization failed")]
    Unauthorized,

    #[error("invalid amount")]
    InvalidAmount,

    #[error("invalid transaction time")]
    InvalidTime,

    #[error("amount exceeds current debt")]
    AmountExceedsDebt,

    #[error("transaction not found")]
    TransactionNotFound,

    #[error("order not found")]
    OrderNotFound,

    #[error("order is not available")]
    OrderUnavailable,

    #[error("order is busy, retry later")]
    OrderBusy,

    #[error("transaction cannot be cancelled")]
    CannotCancel,

    #[error("transaction already finished")]
    AlreadyDone,

    #[error("internal error")]
    Internal,

    #[error("database error: {0}")]
    Database(DbErr),
}

pub type PaymeResult<T> = Result<T, PaymeError>;

impl PaymeError {
    pub fn code(&self) -> i32 {
        match self {
            PaymeError::ParseError => -32700,
            PaymeError::MethodNotFound(_) => -32601,
            PaymeError::Unauthorized => -32504,
            PaymeError::InvalidAmount
            | PaymeError::InvalidTime
            | PaymeError::AmountExceedsDebt => -31001,
            PaymeError::TransactionNotFound => -31003,
            PaymeError::OrderNotFound => -31050,
            PaymeError::OrderUnavailable | PaymeError::OrderBusy => -31051,
            PaymeError::CannotCancel => -31007,
            PaymeError::AlreadyDone => -31008,
            PaymeError::Internal | PaymeError::Database(_) => -32400,
        }
    }

    /// Human message shown in the merchant cabinet; the provider expects Russian.
    pub fn message_ru(&self) -> &'static str {
        match self {
            PaymeError::ParseError => "Невозможно разобрать запрос",
            PaymeError::MethodNotFound(_) => "Метод не найден",
            PaymeError::Unauthorized => "Недостаточно привилегий",
            PaymeError::InvalidAmount => "Неверная сумма",
            PaymeError::InvalidTime => "Неверная дата транзакции",
            PaymeError::AmountExceedsDebt => "Сумма превышает текущий долг",
            PaymeError::TransactionNotFound => "Транзакция не найдена",
            PaymeError::OrderNotFound => "Заказ не найден",
            PaymeError::OrderUnavailable => "Заказ уже оплачен или отменен",
            PaymeError::OrderBusy => "Заказ занят, повторите попытку позже",
            PaymeError::CannotCancel => "Транзакцию невозможно отменить",
            PaymeError::AlreadyDone => "Транзакция уже завершена",
            PaymeError::Internal | PaymeError::Database(_) => "Системная ошибка",
        }
    }
}

impl From<DbErr> for PaymeError {
    fn from(err: DbErr) -> Self {
        if is_lock_timeout(&err) {
            PaymeError::OrderBusy
        } else {
            PaymeError::Database(err)
        }
    }
}

impl From<serde_json::Error> for PaymeError {
    fn from(_: serde_json::Error) -> Self {
        PaymeError::Internal
    }
}

impl From<OrderError> for PaymeError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Database(db) => PaymeError::from(db),
            OrderError::OrderNotFound | OrderError::UserNotFound => PaymeError::OrderNotFound,
            _ => PaymeError::OrderUnavailable,
        }
    }
}

/// Click callback error codes.
#[derive(Debug, Error)]
pub enum ClickError {
    #[error("sign check failed")]
    SignCheckFailed,

    #[error("incorrect amount")]
    IncorrectAmount,

    #[error("amount exceeds current debt")]
    AmountExceedsDebt,

    #[error("action not found")]
    ActionNotFound,

    #[error("order already paid")]
    AlreadyPaid,

    #[error("order not found")]
    OrderNotFound,

    #[error("transaction not found")]
    TransactionNotFound,

    #[error("malformed request")]
    BadRequest,

    #[error("transaction cancelled")]
    TransactionCancelled,

    #[error("database error: {0}")]
    Database(DbErr),
}

impl ClickError {
    pub fn code(&self) -> i32 {
        match self {
            ClickError::SignCheckFailed => -1,
            ClickError::IncorrectAmount | ClickError::AmountExceedsDebt => -2,
            ClickError::ActionNotFound => -3,
            ClickError::AlreadyPaid => -4,
            ClickError::OrderNotFound => -5,
            ClickError::TransactionNotFound => -6,
            ClickError::BadRequest | ClickError::Database(_) => -8,
            ClickError::TransactionCancelled => -9,
        }
    }

    pub fn note(&self) -> &'static str {
        match self {
            ClickError::SignCheckFailed => "Sign check failed",
            ClickError::IncorrectAmount => "Incorrect amount",
            ClickError::AmountExceedsDebt => "Amount exceeds current debt",
            ClickError::ActionNotFound => "Action not found",
            ClickError::AlreadyPaid => "Already paid",
            ClickError::OrderNotFound => "Order not found",
            ClickError::TransactionNotFound => "Transaction not found",
            ClickError::BadRequest => "Error in request",
            ClickError::TransactionCancelled => "Transaction cancelled",
            ClickError::Database(_) => "Error in request",
        }
    }
}

impl From<DbErr> for ClickError {
    fn from(err: DbErr) -> Self {
        ClickError::Database(err)
    }
}

impl From<OrderError> for ClickError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Database(db) => ClickError::Database(db),
            OrderError::OrderNotFound | OrderError::UserNotFound => ClickError::OrderNotFound,
            _ => ClickError::BadRequest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payme_codes_match_protocol() {
        assert_eq!(PaymeError::ParseError.code(), -32700);
        assert_eq!(PaymeError::MethodNotFound("x".into()).code(), -32601);
        assert_eq!(PaymeError::Unauthorized.code(), -32504);
        assert_eq!(PaymeError::InvalidAmount.code(), -31001);
        assert_eq!(PaymeError::TransactionNotFound.code(), -31003);
        assert_eq!(PaymeError::OrderNotFound.code(), -31050);
        assert_eq!(PaymeError::OrderUnavailable.code(), -31051);
        assert_eq!(PaymeError::CannotCancel.code(), -31007);
        assert_eq!(PaymeError::AlreadyDone.code(), -31008);
    }

    #[test]
    fn click_codes_match_protocol() {
        assert_eq!(ClickError::SignCheckFailed.code(), -1);
        assert_eq!(ClickError::IncorrectAmount.code(), -2);
        assert_eq!(ClickError::ActionNotFound.code(), -3);
        assert_eq!(ClickError::AlreadyPaid.code(), -4);
        assert_eq!(ClickError::OrderNotFound.code(), -5);
        assert_eq!(ClickError::TransactionNotFound.code(), -6);
        assert_eq!(ClickError::TransactionCancelled.code(), -9);
    }

    #[test]
    fn lock_timeout_maps_to_busy() {
        let err = DbErr::Custom("canceling statement due to lock timeout (55P03)".into());
        assert!(matches!(PaymeError::from(err), PaymeError::OrderBusy));
    }
}
