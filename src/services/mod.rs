pub mod checkout;
pub mod promo;
pub mod reconcile;

pub use checkout::{CheckoutError, CheckoutRequest, CheckoutService};
pub use promo::{PromoRejection, PromoValidator};
pub use reconcile::{PurchaseEvent, ReconcileError, Reconciler};
