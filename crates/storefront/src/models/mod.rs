//! Domain models for storefront.

pub mod account;
pub mod order;
pub mod session;

pub use account::Account;
pub use order::{
    LineItem, NewOrder, NewReceipt, Order, Product, ProductUpsert, Receipt, ReceiptReview,
    ShippingAddress,
};
pub use session::{CurrentAccount, keys as session_keys};
