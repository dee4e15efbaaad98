//! Settlement state machine and the shapes exchanged with the payment authority
//! and the payment provider.
//!
//! [`SettlementState::transition`] is a pure function; the coordinator owns the
//! current state and is the only caller outside of tests.

use super::cart::{Currency, ProductId};
use super::pricing::PriceBreakdown;
use crate::error::{CheckoutError, Result};
use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementState {
    Idle,
    IntentRequested,
    AwaitingExternalConfirmation,
    Reconciling,
    Settled,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementEvent {
    /// `begin_checkout` accepted a non-empty cart.
    Begin,
    /// The authority returned a client secret that passed the price cross-check.
    IntentIssued,
    /// Validation, intent creation or the price cross-check failed.
    Abandoned,
    ProviderSucceeded,
    ProviderCanceled,
    ProviderFailed,
    UserCanceled,
    /// A canceled attempt picked up its still-valid intent again.
    Resumed,
    AuthorityConfirmed,
    AuthorityRejected,
}

impl SettlementState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SettlementState::Settled | SettlementState::Failed | SettlementState::Canceled
        )
    }

    /// An attempt is in flight between `begin_checkout` and a terminal state.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            SettlementState::IntentRequested
                | SettlementState::AwaitingExternalConfirmation
                | SettlementState::Reconciling
        )
    }

    pub fn transition(self, event: SettlementEvent) -> Result<SettlementState> {
        use SettlementEvent as E;
        use SettlementState as S;

        match (self, event) {
            (S::Idle | S::Settled | S::Failed | S::Canceled, E::Begin) => Ok(S::IntentRequested),
            (S::IntentRequested | S::AwaitingExternalConfirmation | S::Reconciling, E::Begin) => {
                Err(CheckoutError::CheckoutInProgress)
            }
            (S::IntentRequested, E::IntentIssued) => Ok(S::AwaitingExternalConfirmation),
            (S::IntentRequested, E::Abandoned) => Ok(S::Failed),
            // A provider success always wins over a local cancel flag.
            (S::AwaitingExternalConfirmation | S::Canceled, E::ProviderSucceeded) => {
                Ok(S::Reconciling)
            }
            (
                S::AwaitingExternalConfirmation | S::Canceled,
                E::ProviderCanceled | E::UserCanceled,
            ) => Ok(S::Canceled),
            (S::AwaitingExternalConfirmation, E::ProviderFailed) => Ok(S::Failed),
            (S::Canceled, E::ProviderFailed) => Ok(S::Canceled),
            (S::Canceled, E::Resumed) => Ok(S::AwaitingExternalConfirmation),
            (S::Reconciling | S::Settled, E::AuthorityConfirmed) => Ok(S::Settled),
            (S::Reconciling, E::AuthorityRejected) => Ok(S::Failed),
            (from, event) => Err(CheckoutError::InvalidTransition { from, event }),
        }
    }
}

impl fmt::Display for SettlementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SettlementState::Idle => "idle",
            SettlementState::IntentRequested => "intent_requested",
            SettlementState::AwaitingExternalConfirmation => "awaiting_external_confirmation",
            SettlementState::Reconciling => "reconciling",
            SettlementState::Settled => "settled",
            SettlementState::Failed => "failed",
            SettlementState::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// Caller-generated key binding every authority request of one checkout attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyToken(Uuid);

impl IdempotencyToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for IdempotencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntentId(pub String);

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Secret handed to the payment provider; never logged.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientSecret(pub String);

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientSecret(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    pub items: Vec<IntentItem>,
    pub currency: Currency,
    pub idempotency_token: IdempotencyToken,
}

/// Authority reply to intent creation, carrying its own breakdown for the
/// price cross-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResponse {
    pub client_secret: ClientSecret,
    #[serde(alias = "paymentIntentId")]
    pub intent_id: IntentId,
    pub breakdown: PriceBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementIntent {
    pub client_secret: ClientSecret,
    pub intent_id: IntentId,
    pub breakdown: PriceBreakdown,
    pub idempotency_token: IdempotencyToken,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Canceled,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Decimal,
}

/// Read-only projection of the server-owned order record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub intent_id: IntentId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub currency: Currency,
    pub breakdown: PriceBreakdown,
    #[serde(rename = "orderItems")]
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub order: Order,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ProviderOutcome {
    Success,
    Canceled,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    #[serde(flatten)]
    pub outcome: ProviderOutcome,
    pub provider_ref: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use SettlementEvent as E;
    use SettlementState as S;

    #[test]
    fn test_happy_path() {
        let state = S::Idle
            .transition(E::Begin)
            .and_then(|s| s.transition(E::IntentIssued))
            .and_then(|s| s.transition(E::ProviderSucceeded))
            .and_then(|s| s.transition(E::AuthorityConfirmed))
            .unwrap();
        assert_eq!(state, S::Settled);
    }

    #[test]
    fn test_begin_while_in_flight() {
        for state in [S::IntentRequested, S::AwaitingExternalConfirmation, S::Reconciling] {
            assert!(matches!(
                state.transition(E::Begin),
                Err(CheckoutError::CheckoutInProgress)
            ));
        }
    }

    #[test]
    fn test_begin_after_terminal() {
        for state in [S::Settled, S::Failed, S::Canceled] {
            assert_eq!(state.transition(E::Begin).unwrap(), S::IntentRequested);
        }
    }

    #[test]
    fn test_late_success_after_cancel_reconciles() {
        let state = S::AwaitingExternalConfirmation
            .transition(E::UserCanceled)
            .unwrap();
        assert_eq!(state, S::Canceled);
        assert_eq!(state.transition(E::ProviderSucceeded).unwrap(), S::Reconciling);
    }

    #[test]
    fn test_late_failure_after_cancel_stays_canceled() {
        assert_eq!(S::Canceled.transition(E::ProviderFailed).unwrap(), S::Canceled);
    }

    #[test]
    fn test_abandon_and_reject() {
        assert_eq!(S::IntentRequested.transition(E::Abandoned).unwrap(), S::Failed);
        assert_eq!(S::Reconciling.transition(E::AuthorityRejected).unwrap(), S::Failed);
        assert_eq!(
            S::AwaitingExternalConfirmation
                .transition(E::ProviderFailed)
                .unwrap(),
            S::Failed
        );
    }

    #[test]
    fn test_repeated_confirmation_stays_settled() {
        assert_eq!(S::Settled.transition(E::AuthorityConfirmed).unwrap(), S::Settled);
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(matches!(
            S::Idle.transition(E::ProviderSucceeded),
            Err(CheckoutError::InvalidTransition {
                from: S::Idle,
                event: E::ProviderSucceeded
            })
        ));
        assert!(S::Idle.transition(E::UserCanceled).is_err());
        assert!(S::Settled.transition(E::UserCanceled).is_err());
        assert!(S::Failed.transition(E::Resumed).is_err());
        assert!(S::Reconciling.transition(E::UserCanceled).is_err());
    }

    #[test]
    fn test_intent_response_accepts_payment_intent_id() {
        let json = r#"{
            "clientSecret": "pi_1_secret_abc",
            "paymentIntentId": "pi_1",
            "breakdown": {
                "subtotal": 20.0,
                "governmentTax": 1.45,
                "platformFee": 0.65,
                "total": 22.1
            }
        }"#;
        let response: IntentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.intent_id, IntentId("pi_1".to_string()));
        assert_eq!(response.breakdown.total, rust_decimal_macros::dec!(22.10));
    }

    #[test]
    fn test_provider_result_shape() {
        let json = r#"{"outcome":"failed","message":"card declined","providerRef":"ch_9"}"#;
        let result: ProviderResult = serde_json::from_str(json).unwrap();
        assert_eq!(
            result.outcome,
            ProviderOutcome::Failed {
                message: "card declined".to_string()
            }
        );
        assert_eq!(result.provider_ref.as_deref(), Some("ch_9"));
    }

    #[test]
    fn test_client_secret_debug_is_redacted() {
        let secret = ClientSecret("pi_1_secret_abc".to_string());
        assert_eq!(format!("{secret:?}"), "ClientSecret(***)");
    }
}
