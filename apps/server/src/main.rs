mod error;
mod routes;
mod state;
mod telegram;

use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use tezshop_core::notify::{LogSink, NotifierHandle, NotifySink};
use tezshop_core::Settings;
use tezshop_payments::{Migrator, Reaper};

use crate::state::AppState;
use crate::telegram::TelegramSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Arc::new(Settings::from_env()?);

    let mut options = ConnectOptions::new(&settings.database_url);
    options
        .max_connections(20)
        .connect_timeout(Duration::from_secs(5))
        .acquire_timeout(Duration::from_secs(5))
        .sqlx_logging(false);
    let db = Database::connect(options).await?;
    Migrator::up(&db, None).await?;
    tracing::info!("database ready");

    let sink: Arc<dyn NotifySink> = match &settings.bot_token {
        Some(token) => Arc::new(TelegramSink::new(token.clone())),
        None => {
            tracing::warn!("BOT_TOKEN is not set, notifications go to the log only");
            Arc::new(LogSink)
        }
    };
    let notifier = NotifierHandle::spawn(sink, 256, 4);

    let state = AppState::new(db.clone(), Arc::clone(&settings), notifier);

    let reaper = Reaper::new(db, Arc::clone(&settings), state.orders.clone());
    tokio::spawn(reaper.run());

    let app = routes::create_router(state);
    let listener = TcpListener::bind(settings.bind_addr).await?;
    tracing::info!(addr = %settings.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
