//! Test database setup.

use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

use tezshop_payments::migration::Migrator;

/// Connects to a fresh in-memory SQLite database and applies the full
/// payments schema. Each call returns an isolated database.
pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("failed to connect to test database");
    Migrator::up(&db, None).await.expect("failed to run migrations");
    db
}
