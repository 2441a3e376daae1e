//! Zombie-order reaper.
//!
//! An online order whose payment window passed without a terminal provider
//! outcome keeps stock reserved forever unless something sweeps it. The
//! reaper runs on a fixed interval, picks up such orders together with
//! their dangling Payme transactions, and cancels each one in its own
//! transaction so one bad order never blocks the rest of the sweep.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use tracing::{error, info, instrument, warn};

use tezshop_core::Settings;

use crate::db::{begin, for_update};
use crate::entities::order::{OrderStatus, PaymentMethod};
use crate::entities::payme_transaction::{state, REASON_TIMEOUT};
use crate::entities::{order, payme_transaction};
use crate::error::{OrderError, OrderResult};
use crate::services::orders::OrderService;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Age after which an unpaid online order (or its stuck transaction) is a
/// zombie.
const ZOMBIE_TTL_MINUTES: i64 = 30;

pub struct Reaper {
    db: DatabaseConnection,
    settings: Arc<Settings>,
    orders: OrderService,
}

impl Reaper {
    pub fn new(db: DatabaseConnection, settings: Arc<Settings>, orders: OrderService) -> Self {
        Self { db, settings, orders }
    }

    /// Runs forever. A failing sweep is logged and retried on the next tick.
    pub async fn run(self) {
        info!("zombie order reaper started");
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.sweep().await {
                Ok(0) => {}
                Ok(reaped) => info!(reaped, "zombie orders cancelled"),
                Err(err) => error!(%err, "zombie order sweep failed"),
            }
        }
    }

    /// One pass over the candidates. Returns how many orders were cancelled.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> OrderResult<u64> {
        let threshold = Utc::now() - chrono::Duration::minutes(ZOMBIE_TTL_MINUTES);

        let mut candidates: BTreeSet<i64> = order::Entity::find()
            .filter(order::Column::Status.eq(String::from(OrderStatus::New)))
            .filter(order::Column::PaymentMethod.is_in([
                String::from(PaymentMethod::Card),
                String::from(PaymentMethod::Click),
            ]))
            .filter(order::Column::CreatedAt.lt(threshold))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|o| o.id)
            .collect();

        // Orders whose active transaction went stale, whatever their age.
        for tx in payme_transaction::Entity::find()
            .filter(payme_transaction::Column::State.eq(state::CREATED))
            .filter(payme_transaction::Column::CreateTime.lt(threshold))
            .all(&self.db)
            .await?
        {
            candidates.insert(tx.order_id);
        }

        let mut reaped = 0;
        for order_id in candidates {
            match self.reap_order(order_id).await {
                Ok(true) => reaped += 1,
                Ok(false) => {}
                Err(err) => warn!(order_id, %err, "skipping order this sweep"),
            }
        }
        Ok(reaped)
    }

    /// Cancels a single candidate under its row lock. Returns `false` when
    /// the order no longer qualifies (state changed, or a payment attempt
    /// is still live).
    async fn reap_order(&self, order_id: i64) -> OrderResult<bool> {
        let threshold = Utc::now() - chrono::Duration::minutes(ZOMBIE_TTL_MINUTES);
        let backend = self.db.get_database_backend();
        let txn = begin(&self.db, self.settings.lock_timeout_ms).await?;

        let target = for_update(backend, order::Entity::find_by_id(order_id))
            .one(&txn)
            .await?
            .ok_or(OrderError::OrderNotFound)?;
        if target.status() != OrderStatus::New || !target.is_online() {
            return Ok(false);
        }

        let active = for_update(
            backend,
            payme_transaction::Entity::find()
                .filter(payme_transaction::Column::OrderId.eq(order_id))
                .filter(payme_transaction::Column::State.eq(state::CREATED)),
        )
        .one(&txn)
        .await?;

        match active {
            Some(tx) if tx.create_time.with_timezone(&Utc) >= threshold => {
                // A payment attempt is still inside its window.
                return Ok(false);
            }
            Some(tx) => {
                let mut dangling: payme_transaction::ActiveModel = tx.into();
                dangling.state = Set(state::CANCELLED);
                dangling.reason = Set(Some(REASON_TIMEOUT));
                dangling.cancel_time = Set(Some(Utc::now().into()));
                dangling.update(&txn).await?;
            }
            None => {
                if target.created_at.with_timezone(&Utc) >= threshold {
                    return Ok(false);
                }
            }
        }

        self.orders.cancel_order_in(&txn, order_id).await?;
        txn.commit().await?;
        info!(order_id, "zombie order reaped");
        Ok(true)
    }
}
