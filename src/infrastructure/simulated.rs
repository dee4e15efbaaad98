//! Local stand-ins for the remote payment authority and the payment provider.
//!
//! The CLI settles against these, and tests use their knobs to inject latency,
//! transient failures and price disagreements.

use crate::domain::cart::{Currency, ProductId};
use crate::domain::ports::{Catalog, PaymentAuthority, PaymentProvider};
use crate::domain::pricing::FeeSchedule;
use crate::domain::settlement::{
    ClientSecret, ConfirmResponse, IdempotencyToken, IntentId, IntentRequest, IntentResponse,
    Order, OrderItem, OrderStatus, PaymentStatus, ProviderOutcome, ProviderResult,
};
use crate::error::{CheckoutError, Result};
use crate::infrastructure::in_memory::InMemoryCatalog;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::debug;
use uuid::Uuid;

struct IssuedIntent {
    response: IntentResponse,
    token: IdempotencyToken,
    currency: Currency,
    items: Vec<OrderItem>,
}

struct AuthorityState {
    intents: HashMap<IdempotencyToken, IntentId>,
    issued: HashMap<IntentId, IssuedIntent>,
    orders: HashMap<IntentId, Order>,
    next_order_number: u64,
    create_latency: Duration,
    confirm_latency: Duration,
    failing_creates: u32,
    failing_confirms: u32,
    payment_status: PaymentStatus,
    total_adjustment: Decimal,
}

impl Default for AuthorityState {
    fn default() -> Self {
        Self {
            intents: HashMap::new(),
            issued: HashMap::new(),
            orders: HashMap::new(),
            next_order_number: 1000,
            create_latency: Duration::ZERO,
            confirm_latency: Duration::ZERO,
            failing_creates: 0,
            failing_confirms: 0,
            payment_status: PaymentStatus::Succeeded,
            total_adjustment: Decimal::ZERO,
        }
    }
}

/// In-process payment authority. Prices requests from its own catalog, so a
/// cart carrying stale prices disagrees with it the way a real server would.
///
/// Both operations are idempotent: one intent per token, one order per intent.
#[derive(Clone)]
pub struct SimulatedAuthority {
    catalog: InMemoryCatalog,
    fees: FeeSchedule,
    state: Arc<Mutex<AuthorityState>>,
    create_calls: Arc<AtomicU32>,
    confirm_calls: Arc<AtomicU32>,
    orders_created: Arc<AtomicU32>,
}

impl SimulatedAuthority {
    pub fn new(catalog: InMemoryCatalog, fees: FeeSchedule) -> Self {
        Self {
            catalog,
            fees,
            state: Arc::new(Mutex::new(AuthorityState::default())),
            create_calls: Arc::new(AtomicU32::new(0)),
            confirm_calls: Arc::new(AtomicU32::new(0)),
            orders_created: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn confirm_calls(&self) -> u32 {
        self.confirm_calls.load(Ordering::SeqCst)
    }

    pub fn orders_created(&self) -> u32 {
        self.orders_created.load(Ordering::SeqCst)
    }

    pub async fn set_create_latency(&self, latency: Duration) {
        self.state.lock().await.create_latency = latency;
    }

    pub async fn set_confirm_latency(&self, latency: Duration) {
        self.state.lock().await.confirm_latency = latency;
    }

    /// The next `count` intent requests fail with a transport error.
    pub async fn fail_next_creates(&self, count: u32) {
        self.state.lock().await.failing_creates = count;
    }

    /// The next `count` confirmations fail with a transport error.
    pub async fn fail_next_confirms(&self, count: u32) {
        self.state.lock().await.failing_confirms = count;
    }

    /// Payment status reported for intents confirmed from now on.
    pub async fn set_payment_status(&self, status: PaymentStatus) {
        self.state.lock().await.payment_status = status;
    }

    /// Added to the total of every new breakdown.
    pub async fn set_total_adjustment(&self, adjustment: Decimal) {
        self.state.lock().await.total_adjustment = adjustment;
    }

    async fn price_items(&self, request: &IntentRequest) -> Result<(Decimal, Vec<OrderItem>)> {
        if request.items.is_empty() {
            return Err(CheckoutError::AuthorityRejected(
                "order has no items".to_string(),
            ));
        }

        let mut subtotal = Decimal::ZERO;
        let mut items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            if item.quantity == 0 {
                return Err(CheckoutError::AuthorityRejected(format!(
                    "product {} has no quantity",
                    item.product_id
                )));
            }
            let price = self.price_of(item.product_id).await?;
            subtotal = price
                .checked_mul(Decimal::from(item.quantity))
                .and_then(|line| subtotal.checked_add(line))
                .ok_or_else(|| {
                    CheckoutError::AuthorityRejected("order total overflows".to_string())
                })?;
            items.push(OrderItem {
                product_id: item.product_id,
                quantity: item.quantity,
                price,
            });
        }
        Ok((subtotal, items))
    }

    async fn price_of(&self, product_id: ProductId) -> Result<Decimal> {
        self.catalog
            .validate(product_id)
            .await?
            .ok_or_else(|| CheckoutError::AuthorityRejected(format!("unknown product {product_id}")))
    }
}

#[async_trait]
impl PaymentAuthority for SimulatedAuthority {
    async fn create_intent(&self, request: &IntentRequest) -> Result<IntentResponse> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let latency = {
            let mut state = self.state.lock().await;
            if state.failing_creates > 0 {
                state.failing_creates -= 1;
                return Err(CheckoutError::Transport(
                    "simulated connection reset".to_string(),
                ));
            }
            state.create_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let (subtotal, items) = self.price_items(request).await?;

        let mut state = self.state.lock().await;
        if let Some(intent_id) = state.intents.get(&request.idempotency_token)
            && let Some(issued) = state.issued.get(intent_id)
        {
            debug!(%intent_id, "replaying intent for repeated token");
            return Ok(issued.response.clone());
        }

        let mut breakdown = self.fees.compute_breakdown(subtotal)?;
        breakdown.total += state.total_adjustment;

        let intent_id = IntentId(format!("pi_{}", Uuid::new_v4().simple()));
        let response = IntentResponse {
            client_secret: ClientSecret(format!(
                "{intent_id}_secret_{}",
                Uuid::new_v4().simple()
            )),
            intent_id: intent_id.clone(),
            breakdown,
        };
        state
            .intents
            .insert(request.idempotency_token, intent_id.clone());
        state.issued.insert(
            intent_id,
            IssuedIntent {
                response: response.clone(),
                token: request.idempotency_token,
                currency: request.currency.clone(),
                items,
            },
        );
        Ok(response)
    }

    async fn confirm_intent(
        &self,
        intent_id: &IntentId,
        token: &IdempotencyToken,
    ) -> Result<ConfirmResponse> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        let latency = {
            let mut state = self.state.lock().await;
            if state.failing_confirms > 0 {
                state.failing_confirms -= 1;
                return Err(CheckoutError::Transport(
                    "simulated gateway timeout".to_string(),
                ));
            }
            state.confirm_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        if let Some(order) = state.orders.get(intent_id) {
            return Ok(ConfirmResponse {
                order: order.clone(),
                payment_status: order.payment_status,
            });
        }

        let Some(issued) = state.issued.get(intent_id) else {
            return Err(CheckoutError::AuthorityRejected(format!(
                "unknown intent {intent_id}"
            )));
        };
        if issued.token != *token {
            return Err(CheckoutError::AuthorityRejected(format!(
                "idempotency token does not match intent {intent_id}"
            )));
        }

        let payment_status = state.payment_status;
        let status = match payment_status {
            PaymentStatus::Succeeded => OrderStatus::Confirmed,
            PaymentStatus::Canceled => OrderStatus::Canceled,
            PaymentStatus::Pending | PaymentStatus::Failed => OrderStatus::Pending,
        };
        let order = Order {
            id: format!("ord_{}", Uuid::new_v4().simple()),
            order_number: format!("ORD-{}", state.next_order_number),
            intent_id: intent_id.clone(),
            status,
            payment_status,
            currency: issued.currency.clone(),
            breakdown: issued.response.breakdown,
            items: issued.items.clone(),
        };
        state.next_order_number += 1;
        state.orders.insert(intent_id.clone(), order.clone());
        self.orders_created.fetch_add(1, Ordering::SeqCst);

        Ok(ConfirmResponse {
            order,
            payment_status,
        })
    }
}

struct Script {
    outcome: ProviderOutcome,
    presentations: u32,
}

/// Payment provider that answers every presentation with a preset outcome.
///
/// While held, presentations wait until [`release`](Self::release) is called,
/// which stands in for a user sitting on the payment sheet.
#[derive(Clone)]
pub struct ScriptedProvider {
    script: Arc<std::sync::Mutex<Script>>,
    held: Arc<watch::Sender<bool>>,
}

impl ScriptedProvider {
    pub fn new(outcome: ProviderOutcome) -> Self {
        let (held, _) = watch::channel(false);
        Self {
            script: Arc::new(std::sync::Mutex::new(Script {
                outcome,
                presentations: 0,
            })),
            held: Arc::new(held),
        }
    }

    pub fn set_outcome(&self, outcome: ProviderOutcome) {
        if let Ok(mut script) = self.script.lock() {
            script.outcome = outcome;
        }
    }

    pub fn hold(&self) {
        self.held.send_replace(true);
    }

    pub fn release(&self) {
        self.held.send_replace(false);
    }

    pub fn presentations(&self) -> u32 {
        self.script
            .lock()
            .map(|script| script.presentations)
            .unwrap_or_default()
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    async fn present(&self, client_secret: &ClientSecret) -> Result<ProviderResult> {
        let presentation = {
            let mut script = self
                .script
                .lock()
                .map_err(|e| CheckoutError::InternalError(e.to_string().into()))?;
            script.presentations += 1;
            script.presentations
        };
        debug!(?client_secret, presentation, "presenting payment sheet");

        let mut held = self.held.subscribe();
        held.wait_for(|held| !*held)
            .await
            .map_err(|e| CheckoutError::Transport(e.to_string()))?;

        let outcome = self
            .script
            .lock()
            .map_err(|e| CheckoutError::InternalError(e.to_string().into()))?
            .outcome
            .clone();
        Ok(ProviderResult {
            outcome,
            provider_ref: Some(format!("sim_{presentation}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::settlement::IntentItem;
    use rust_decimal_macros::dec;

    async fn authority() -> SimulatedAuthority {
        let catalog = InMemoryCatalog::new();
        catalog.insert(ProductId(1), dec!(10.00)).await;
        SimulatedAuthority::new(catalog, FeeSchedule::default())
    }

    fn request(token: IdempotencyToken, product: u64, quantity: u32) -> IntentRequest {
        IntentRequest {
            items: vec![IntentItem {
                product_id: ProductId(product),
                quantity,
            }],
            currency: Currency::usd(),
            idempotency_token: token,
        }
    }

    #[tokio::test]
    async fn test_create_intent_prices_from_catalog() {
        let authority = authority().await;
        let response = authority
            .create_intent(&request(IdempotencyToken::generate(), 1, 2))
            .await
            .unwrap();

        assert_eq!(response.breakdown.subtotal, dec!(20.00));
        assert_eq!(response.breakdown.total, dec!(22.10));
        assert!(response.intent_id.0.starts_with("pi_"));
    }

    #[tokio::test]
    async fn test_create_intent_is_idempotent_per_token() {
        let authority = authority().await;
        let token = IdempotencyToken::generate();

        let first = authority.create_intent(&request(token, 1, 1)).await.unwrap();
        let second = authority.create_intent(&request(token, 1, 1)).await.unwrap();
        let other = authority
            .create_intent(&request(IdempotencyToken::generate(), 1, 1))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_ne!(first.intent_id, other.intent_id);
    }

    #[tokio::test]
    async fn test_unknown_product_is_rejected() {
        let authority = authority().await;
        let result = authority
            .create_intent(&request(IdempotencyToken::generate(), 42, 1))
            .await;

        assert!(matches!(result, Err(CheckoutError::AuthorityRejected(_))));
    }

    #[tokio::test]
    async fn test_confirm_is_idempotent() {
        let authority = authority().await;
        let token = IdempotencyToken::generate();
        let intent = authority.create_intent(&request(token, 1, 3)).await.unwrap();

        let first = authority
            .confirm_intent(&intent.intent_id, &token)
            .await
            .unwrap();
        let second = authority
            .confirm_intent(&intent.intent_id, &token)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.payment_status, PaymentStatus::Succeeded);
        assert_eq!(first.order.status, OrderStatus::Confirmed);
        assert_eq!(first.order.items[0].price, dec!(10.00));
        assert_eq!(authority.orders_created(), 1);
    }

    #[tokio::test]
    async fn test_confirm_rejects_foreign_token() {
        let authority = authority().await;
        let token = IdempotencyToken::generate();
        let intent = authority.create_intent(&request(token, 1, 1)).await.unwrap();

        let result = authority
            .confirm_intent(&intent.intent_id, &IdempotencyToken::generate())
            .await;

        assert!(matches!(result, Err(CheckoutError::AuthorityRejected(_))));
    }

    #[tokio::test]
    async fn test_injected_failures_are_transient() {
        let authority = authority().await;
        authority.fail_next_creates(1).await;
        let token = IdempotencyToken::generate();

        let failed = authority.create_intent(&request(token, 1, 1)).await;
        assert!(failed.as_ref().is_err_and(CheckoutError::is_transient));
        assert!(authority.create_intent(&request(token, 1, 1)).await.is_ok());
        assert_eq!(authority.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_held_provider_waits_for_release() {
        let provider = ScriptedProvider::new(ProviderOutcome::Success);
        provider.hold();
        let secret = ClientSecret("pi_1_secret".to_string());

        let pending =
            tokio::time::timeout(Duration::from_millis(20), provider.present(&secret)).await;
        assert!(pending.is_err());

        provider.release();
        let result = provider.present(&secret).await.unwrap();
        assert_eq!(result.outcome, ProviderOutcome::Success);
        assert_eq!(provider.presentations(), 2);
    }
}
