//! Transaction and row-locking helpers.
//!
//! The database is the serializer of truth: every state-changing handler
//! works inside one transaction and orders its writes through `FOR UPDATE`
//! row locks. Lock waits are bounded by `lock_timeout` so a contended order
//! surfaces as "busy, retry" instead of a hung callback.

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr, EntityTrait,
    QuerySelect, Select, Statement, TransactionTrait,
};

/// Opens a transaction and bounds its lock waits on Postgres.
pub async fn begin(
    db: &DatabaseConnection,
    lock_timeout_ms: u64,
) -> Result<DatabaseTransaction, DbErr> {
    let txn = db.begin().await?;
    if db.get_database_backend() == DbBackend::Postgres {
        txn.execute(Statement::from_string(
            DbBackend::Postgres,
            format!("SET LOCAL lock_timeout = '{lock_timeout_ms}ms'"),
        ))
        .await?;
    }
    Ok(txn)
}

/// Adds `FOR UPDATE` on backends that support it. SQLite (tests) is a
/// single-writer engine, so the plain select keeps the same semantics there.
pub fn for_update<E: EntityTrait>(backend: DbBackend, select: Select<E>) -> Select<E> {
    if backend == DbBackend::Postgres {
        select.lock_exclusive()
    } else {
        select
    }
}

/// Whether a database error is a bounded lock wait expiring (Postgres 55P03).
pub fn is_lock_timeout(err: &DbErr) -> bool {
    let text = err.to_string();
    text.contains("55P03") || text.contains("lock timeout")
}
