pub mod offering;
pub mod pricing;
pub mod promo;
pub mod transaction;

pub use offering::{Discount, Offering};
pub use pricing::PriceBreakdown;
pub use promo::PromoCode;
pub use transaction::{Transaction, TransactionStatus};
