pub mod config;
pub mod money;
pub mod notify;

pub use config::{ConfigError, Settings};
pub use money::{amount_from_json, parse_amount, to_tiyin, MoneyError, TIYIN_PER_SUM};
pub use notify::{LogSink, Notification, NotifierHandle, NotifyError, NotifySink};
