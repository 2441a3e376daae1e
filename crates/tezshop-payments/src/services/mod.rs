pub mod click;
pub mod orders;
pub mod payme;
pub mod stock;

pub use click::ClickService;
pub use orders::OrderService;
pub use payme::PaymeService;
