pub mod cart_item;
pub mod click_transaction;
pub mod order;
pub mod order_item;
pub mod payme_transaction;
pub mod product;
pub mod user;
