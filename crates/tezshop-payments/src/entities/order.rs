use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Paid,
    Delivery,
    Done,
    Cancelled,
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::New => "new".to_string(),
            OrderStatus::Paid => "paid".to_string(),
            OrderStatus::Delivery => "delivery".to_string(),
            OrderStatus::Done => "done".to_string(),
            OrderStatus::Cancelled => "cancelled".to_string(),
        }
    }
}

impl From<&str> for OrderStatus {
    fn from(value: &str) -> Self {
        match value {
            "paid" => OrderStatus::Paid,
            "delivery" => OrderStatus::Delivery,
            "done" => OrderStatus::Done,
            "cancelled" => OrderStatus::Cancelled,
            _ => OrderStatus::New,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Product,
    DebtRepayment,
}

impl From<OrderType> for String {
    fn from(kind: OrderType) -> Self {
        match kind {
            OrderType::Product => "product".to_string(),
            OrderType::DebtRepayment => "debt_repayment".to_string(),
        }
    }
}

impl From<&str> for OrderType {
    fn from(value: &str) -> Self {
        match value {
            "debt_repayment" => OrderType::DebtRepayment,
            _ => OrderType::Product,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Click,
}

impl From<PaymentMethod> for String {
    fn from(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Cash => "cash".to_string(),
            PaymentMethod::Card => "card".to_string(),
            PaymentMethod::Click => "click".to_string(),
        }
    }
}

impl From<&str> for PaymentMethod {
    fn from(value: &str) -> Self {
        match value {
            "card" => PaymentMethod::Card,
            "click" => PaymentMethod::Click,
            _ => PaymentMethod::Cash,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Pickup,
    Delivery,
    /// Debt-repayment orders deliver nothing.
    None,
}

impl From<DeliveryMethod> for String {
    fn from(method: DeliveryMethod) -> Self {
        match method {
            DeliveryMethod::Pickup => "pickup".to_string(),
            DeliveryMethod::Delivery => "delivery".to_string(),
            DeliveryMethod::None => "none".to_string(),
        }
    }
}

impl From<&str> for DeliveryMethod {
    fn from(value: &str) -> Self {
        match value {
            "delivery" => DeliveryMethod::Delivery,
            "none" => DeliveryMethod::None,
            _ => DeliveryMethod::Pickup,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub status: String,
    pub order_type: String,
    pub payment_method: String,
    pub delivery_method: String,
    pub delivery_address: Option<String>,
    /// Total in integer sum.
    pub total_amount: i64,
    pub comment: Option<String>,
    pub contact_phone: String,
    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn status(&self) -> OrderStatus {
        OrderStatus::from(self.status.as_str())
    }

    pub fn order_type(&self) -> OrderType {
        OrderType::from(self.order_type.as_str())
    }

    pub fn payment_method(&self) -> PaymentMethod {
        PaymentMethod::from(self.payment_method.as_str())
    }

    pub fn is_online(&self) -> bool {
        matches!(self.payment_method(), PaymentMethod::Card | PaymentMethod::Click)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::order_item::Entity")]
    Items,
    #[sea_orm(has_many = "super::payme_transaction::Entity")]
    PaymeTransactions,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::payme_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymeTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
