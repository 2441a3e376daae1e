pub mod db;
pub mod dto;
pub mod entities;
pub mod error;
pub mod fiscal;
pub mod links;
pub mod migration;
pub mod reaper;
pub mod services;

pub use error::{ClickError, OrderError, OrderResult, PaymeError, PaymeResult};
pub use fiscal::{ClickFiscalClient, FiscalDispatcher, FiscalItem, FiscalReceipt, NullFiscal};
pub use migration::Migrator;
pub use reaper::Reaper;
pub use services::click::ClickService;
pub use services::orders::OrderService;
pub use services::payme::PaymeService;
