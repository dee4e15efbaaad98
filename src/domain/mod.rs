//! Domain layer: pricing, the cart aggregate, the settlement state machine and
//! the ports through which the application reaches external collaborators.

pub mod cart;
pub mod ports;
pub mod pricing;
pub mod settlement;
