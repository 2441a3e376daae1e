use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickTxStatus {
    Input,
    Canceled,
    Confirmed,
}

impl From<ClickTxStatus> for String {
    fn from(status: ClickTxStatus) -> Self {
        match status {
            ClickTxStatus::Input => "input".to_string(),
            ClickTxStatus::Canceled => "canceled".to_string(),
            ClickTxStatus::Confirmed => "confirmed".to_string(),
        }
    }
}

impl From<&str> for ClickTxStatus {
    fn from(value: &str) -> Self {
        match value {
            "canceled" => ClickTxStatus::Canceled,
            "confirmed" => ClickTxStatus::Confirmed,
            _ => ClickTxStatus::Input,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "click_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Payment id in the Click system; unique.
    pub click_trans_id: i64,
    pub service_id: i64,
    pub click_paydoc_id: i64,
    /// Our order id, as the provider echoes it.
    pub merchant_trans_id: String,
    /// Amount in integer sum; the money codec rejects fractional values
    /// before anything reaches this column.
    pub amount: i64,
    /// 0 = prepare, 1 = complete.
    pub action: i32,
    pub error: i32,
    pub error_note: Option<String>,
    pub sign_time: String,
    pub sign_string: String,
    pub status: String,
    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn status(&self) -> ClickTxStatus {
        ClickTxStatus::from(self.status.as_str())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
