use std::sync::Arc;

use sea_orm::DatabaseConnection;

use tezshop_core::{NotifierHandle, Settings};
use tezshop_payments::{ClickFiscalClient, ClickService, OrderService, PaymeService};

/// Everything a handler needs, constructed once at boot.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub settings: Arc<Settings>,
    pub orders: OrderService,
    pub payme: PaymeService,
    pub click: ClickService,
}

impl AppState {
    pub fn new(db: DatabaseConnection, settings: Arc<Settings>, notifier: NotifierHandle) -> Self {
        let orders = OrderService::new(db.clone(), Arc::clone(&settings), notifier.clone());
        let payme = PaymeService::new(
            db.clone(),
            Arc::clone(&settings),
            orders.clone(),
            notifier.clone(),
        );
        let fiscal = Arc::new(ClickFiscalClient::new(Arc::clone(&settings)));
        let click = ClickService::new(
            db.clone(),
            Arc::clone(&settings),
            orders.clone(),
            notifier,
            fiscal,
        );
        Self { db, settings, orders, payme, click }
    }
}
