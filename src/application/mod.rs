//! Application layer: the checkout session that owns a cart and the
//! coordinator that settles it against the payment authority.

pub mod coordinator;
pub mod retry;
pub mod session;
