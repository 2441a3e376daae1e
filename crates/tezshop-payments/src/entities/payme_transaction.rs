use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Provider-defined transaction states.
pub mod state {
    /// Created, awaiting perform.
    pub const CREATED: i32 = 1;
    /// Performed, money captured.
    pub const PERFORMED: i32 = 2;
    /// Cancelled before perform.
    pub const CANCELLED: i32 = -1;
    /// Cancelled after perform (refund).
    pub const CANCELLED_AFTER_PERFORM: i32 = -2;
}

/// Provider-defined cancellation reason for timed-out transactions.
pub const REASON_TIMEOUT: i32 = 4;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payme_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Transaction id assigned by the provider; unique.
    pub payme_id: String,
    /// Provider-side creation time, ms since epoch.
    pub time: i64,
    /// Amount in tiyin.
    pub amount: i64,
    pub order_id: i64,
    pub state: i32,
    pub reason: Option<i32>,
    /// Our creation time.
    pub create_time: DateTimeWithTimeZone,
    pub perform_time: Option<DateTimeWithTimeZone>,
    pub cancel_time: Option<DateTimeWithTimeZone>,
}

impl Model {
    pub fn is_active(&self) -> bool {
        self.state == state::CREATED
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
