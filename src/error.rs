use crate::domain::cart::{Currency, ProductId};
use crate::domain::settlement::{SettlementEvent, SettlementState};
use miette::Diagnostic;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum CheckoutError {
    #[error("Invalid cart state: {0}")]
    #[diagnostic(code(checkout::invalid_cart_state))]
    InvalidCartState(String),

    #[error("Invalid quantity: {0} (must be at least 1)")]
    #[diagnostic(code(checkout::invalid_quantity))]
    InvalidQuantity(i64),

    #[error("Currency mismatch: cart is priced in {expected}, item is priced in {found}")]
    #[diagnostic(code(checkout::currency_mismatch))]
    CurrencyMismatch { expected: Currency, found: Currency },

    #[error("Cart is empty")]
    #[diagnostic(
        code(checkout::empty_cart),
        help("Add some items before checking out.")
    )]
    EmptyCart,

    #[error("Line item references unknown product {0}")]
    #[diagnostic(code(checkout::invalid_line_item))]
    InvalidLineItem(ProductId),

    #[error("Pricing desync: local total {local} differs from authority total {remote}")]
    #[diagnostic(
        code(checkout::pricing_desync),
        help("The attempt was discarded. Refresh the cart prices and begin checkout again.")
    )]
    PricingDesync { local: Decimal, remote: Decimal },

    #[error("A checkout attempt is already in progress for this cart")]
    #[diagnostic(code(checkout::in_progress))]
    CheckoutInProgress,

    #[error("Payment failed: {0}")]
    #[diagnostic(code(checkout::payment_failed))]
    PaymentFailed(String),

    #[error("Payment canceled")]
    #[diagnostic(code(checkout::payment_canceled))]
    PaymentCanceled,

    #[error("Reconciliation timed out after {attempts} attempt(s)")]
    #[diagnostic(code(checkout::reconciliation_timeout))]
    ReconciliationTimeout { attempts: u32 },

    #[error("Invalid settlement transition: {event:?} while {from:?}")]
    #[diagnostic(code(checkout::invalid_transition))]
    InvalidTransition {
        from: SettlementState,
        event: SettlementEvent,
    },

    #[error("Settlement intent is no longer valid: {0}")]
    #[diagnostic(
        code(checkout::stale_intent),
        help("Begin a new checkout attempt.")
    )]
    StaleIntent(String),

    #[error("Transport error: {0}")]
    #[diagnostic(code(checkout::transport))]
    Transport(String),

    #[error("Authority rejected the request: {0}")]
    #[diagnostic(code(checkout::authority_rejected))]
    AuthorityRejected(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),

    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl CheckoutError {
    /// Whether a retry of the same request (with the same idempotency token)
    /// may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CheckoutError::Transport(_) | CheckoutError::ReconciliationTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
