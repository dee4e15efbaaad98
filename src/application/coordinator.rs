use crate::application::retry::RetryPolicy;
use crate::application::session::CheckoutSession;
use crate::domain::cart::{Cart, LineItem};
use crate::domain::ports::{CatalogBox, OrderStoreBox, PaymentAuthorityBox, PaymentProviderBox};
use crate::domain::pricing::FeeSchedule;
use crate::domain::settlement::{
    IdempotencyToken, IntentId, IntentItem, IntentRequest, Order, PaymentStatus, ProviderOutcome,
    SettlementEvent, SettlementIntent, SettlementState,
};
use crate::error::{CheckoutError, Result};
use jiff::Timestamp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, watch};
use tracing::{error, info, warn};

/// Tunables of the settlement flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementSettings {
    pub fees: FeeSchedule,
    pub retry: RetryPolicy,
    /// Largest accepted difference between the local and the authority total.
    pub desync_tolerance: Decimal,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            retry: RetryPolicy::default(),
            desync_tolerance: dec!(0.01),
        }
    }
}

/// External collaborators the coordinator talks to.
pub struct SettlementPorts {
    pub authority: PaymentAuthorityBox,
    pub provider: PaymentProviderBox,
    pub catalog: CatalogBox,
    pub orders: OrderStoreBox,
}

/// Bookkeeping for the current checkout attempt.
struct Attempt {
    state: SettlementState,
    intent: Option<SettlementIntent>,
    /// Cart lines at `begin_checkout`; a canceled intent is only resumable
    /// while the cart still matches.
    snapshot: Vec<LineItem>,
    cancel: Arc<Notify>,
    /// Publishes the order once reconciliation settles. Replaced (closing it)
    /// when reconciliation fails.
    reconciled: watch::Sender<Option<Order>>,
    order: Option<Order>,
}

impl Attempt {
    fn idle() -> Self {
        Self {
            state: SettlementState::Idle,
            intent: None,
            snapshot: Vec::new(),
            cancel: Arc::new(Notify::new()),
            reconciled: watch::channel(None).0,
            order: None,
        }
    }
}

/// Drives one checkout attempt at a time from intent creation through the
/// payment provider to reconciliation with the authority.
///
/// The attempt lock is held only for state bookkeeping, never across a call to
/// an external party.
pub struct SettlementCoordinator {
    session: Arc<CheckoutSession>,
    ports: SettlementPorts,
    settings: SettlementSettings,
    attempt: Mutex<Attempt>,
}

impl SettlementCoordinator {
    pub fn new(
        session: Arc<CheckoutSession>,
        ports: SettlementPorts,
        settings: SettlementSettings,
    ) -> Self {
        Self {
            session,
            ports,
            settings,
            attempt: Mutex::new(Attempt::idle()),
        }
    }

    pub async fn state(&self) -> SettlementState {
        self.attempt.lock().await.state
    }

    pub async fn current_intent(&self) -> Option<SettlementIntent> {
        self.attempt.lock().await.intent.clone()
    }

    pub async fn settled_order(&self) -> Option<Order> {
        self.attempt.lock().await.order.clone()
    }

    /// Runs a full attempt: [`begin_checkout`](Self::begin_checkout) followed by
    /// [`await_confirmation`](Self::await_confirmation).
    pub async fn checkout(&self) -> Result<Order> {
        self.begin_checkout().await?;
        self.await_confirmation().await
    }

    /// Prices the cart and obtains a settlement intent from the authority.
    ///
    /// An empty cart is rejected without leaving `Idle`. Any later failure
    /// abandons the attempt; a new call starts over with a fresh token.
    #[tracing::instrument(skip(self), fields(session = %self.session.id()))]
    pub async fn begin_checkout(&self) -> Result<SettlementIntent> {
        let cart = self.session.snapshot().await;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let token = {
            let mut attempt = self.attempt.lock().await;
            let state = attempt.state.transition(SettlementEvent::Begin)?;
            *attempt = Attempt {
                state,
                snapshot: cart.items().to_vec(),
                ..Attempt::idle()
            };
            IdempotencyToken::generate()
        };
        info!(%token, lines = cart.items().len(), "checkout attempt started");

        match self.request_intent(&cart, token).await {
            Ok(intent) => {
                let mut attempt = self.attempt.lock().await;
                attempt.state = attempt.state.transition(SettlementEvent::IntentIssued)?;
                attempt.intent = Some(intent.clone());
                info!(intent_id = %intent.intent_id, total = %intent.breakdown.total, "settlement intent issued");
                Ok(intent)
            }
            Err(e) => {
                self.abandon(&e).await;
                Err(e)
            }
        }
    }

    async fn request_intent(&self, cart: &Cart, token: IdempotencyToken) -> Result<SettlementIntent> {
        for item in cart.items() {
            match self.ports.catalog.validate(item.product_id).await? {
                None => return Err(CheckoutError::InvalidLineItem(item.product_id)),
                Some(price) if price != item.unit_price.amount() => {
                    warn!(
                        product_id = %item.product_id,
                        cart_price = %item.unit_price.amount(),
                        catalog_price = %price,
                        "cart price differs from catalog"
                    );
                }
                Some(_) => {}
            }
        }

        let breakdown = self
            .settings
            .fees
            .compute_breakdown(cart.totals()?.total_price)?;
        let request = IntentRequest {
            items: cart
                .items()
                .iter()
                .map(|item| IntentItem {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .collect(),
            currency: cart.currency().cloned().unwrap_or_default(),
            idempotency_token: token,
        };

        let response = self
            .settings
            .retry
            .run("create_intent", || self.ports.authority.create_intent(&request))
            .await?;

        if breakdown.drift(&response.breakdown) > self.settings.desync_tolerance {
            error!(
                intent_id = %response.intent_id,
                local = %breakdown.total,
                remote = %response.breakdown.total,
                "local total disagrees with authority"
            );
            return Err(CheckoutError::PricingDesync {
                local: breakdown.total,
                remote: response.breakdown.total,
            });
        }

        Ok(SettlementIntent {
            client_secret: response.client_secret,
            intent_id: response.intent_id,
            breakdown,
            idempotency_token: token,
            created_at: Timestamp::now(),
        })
    }

    async fn abandon(&self, reason: &CheckoutError) {
        let mut attempt = self.attempt.lock().await;
        if let Ok(state) = attempt.state.transition(SettlementEvent::Abandoned) {
            attempt.state = state;
        }
        attempt.intent = None;
        warn!(error = %reason, "checkout attempt abandoned");
    }

    /// Hands the intent to the payment provider and waits for its outcome, or
    /// for [`cancel`](Self::cancel). A cancel returns
    /// [`CheckoutError::PaymentCanceled`] without reconciling.
    pub async fn await_confirmation(&self) -> Result<Order> {
        let (intent, cancel) = {
            let attempt = self.attempt.lock().await;
            match (attempt.state, &attempt.intent) {
                (SettlementState::AwaitingExternalConfirmation, Some(intent)) => {
                    (intent.clone(), attempt.cancel.clone())
                }
                (SettlementState::Canceled, _) => return Err(CheckoutError::PaymentCanceled),
                (state, _) => {
                    return Err(CheckoutError::StaleIntent(format!(
                        "no intent is awaiting confirmation while {state}"
                    )));
                }
            }
        };

        let result = tokio::select! {
            result = self.ports.provider.present(&intent.client_secret) => result,
            () = cancel.notified() => {
                info!(intent_id = %intent.intent_id, "canceled while awaiting the payment provider");
                return Err(CheckoutError::PaymentCanceled);
            }
        };

        let outcome = match result {
            Ok(result) => {
                info!(
                    intent_id = %intent.intent_id,
                    provider_ref = result.provider_ref.as_deref().unwrap_or("-"),
                    outcome = ?result.outcome,
                    "payment provider reported"
                );
                result.outcome
            }
            Err(e) => ProviderOutcome::Failed {
                message: e.to_string(),
            },
        };

        self.handle_provider_outcome(&intent.intent_id, outcome)
            .await
    }

    /// Applies a provider outcome for `intent_id`, including notifications that
    /// arrive out-of-band after a local cancel. A success always proceeds to
    /// reconciliation. A repeated success returns the same order, waiting for
    /// the reconciliation in flight if there is one.
    pub async fn handle_provider_outcome(
        &self,
        intent_id: &IntentId,
        outcome: ProviderOutcome,
    ) -> Result<Order> {
        let intent = {
            let mut attempt = self.attempt.lock().await;
            let intent = match &attempt.intent {
                Some(intent) if &intent.intent_id == intent_id => intent.clone(),
                _ => {
                    return Err(CheckoutError::StaleIntent(format!(
                        "intent {intent_id} does not belong to the current attempt"
                    )));
                }
            };

            match outcome {
                ProviderOutcome::Success => {
                    if attempt.state == SettlementState::Settled
                        && let Some(order) = &attempt.order
                    {
                        return Ok(order.clone());
                    }
                    if attempt.state == SettlementState::Reconciling {
                        let reconciled = attempt.reconciled.subscribe();
                        drop(attempt);
                        return Self::join_reconciliation(intent_id, reconciled).await;
                    }
                    attempt.state = attempt
                        .state
                        .transition(SettlementEvent::ProviderSucceeded)?;
                    intent
                }
                ProviderOutcome::Canceled => {
                    attempt.state = attempt
                        .state
                        .transition(SettlementEvent::ProviderCanceled)?;
                    info!(%intent_id, "payment canceled by the provider");
                    return Err(CheckoutError::PaymentCanceled);
                }
                ProviderOutcome::Failed { message } => {
                    let state = attempt
                        .state
                        .transition(SettlementEvent::ProviderFailed)?;
                    if state == SettlementState::Failed {
                        attempt.intent = None;
                    }
                    attempt.state = state;
                    warn!(%intent_id, %message, "payment failed at the provider");
                    return Err(CheckoutError::PaymentFailed(message));
                }
            }
        };

        self.reconcile(intent).await
    }

    async fn join_reconciliation(
        intent_id: &IntentId,
        mut reconciled: watch::Receiver<Option<Order>>,
    ) -> Result<Order> {
        info!(%intent_id, "joining reconciliation in flight");
        reconciled
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|order| order.as_ref().cloned())
            .ok_or_else(|| {
                CheckoutError::PaymentFailed(format!(
                    "reconciliation of intent {intent_id} did not settle"
                ))
            })
    }

    async fn reconcile(&self, intent: SettlementIntent) -> Result<Order> {
        info!(intent_id = %intent.intent_id, "reconciling with the authority");

        match self.confirmed_order(&intent).await {
            Ok(order) => self.settle(order).await,
            Err(e) => {
                let mut attempt = self.attempt.lock().await;
                attempt.state = attempt
                    .state
                    .transition(SettlementEvent::AuthorityRejected)?;
                attempt.intent = None;
                attempt.reconciled = watch::channel(None).0;
                warn!(intent_id = %intent.intent_id, error = %e, "reconciliation failed");
                Err(e)
            }
        }
    }

    /// The authority's order for `intent`, reusing a recorded projection when
    /// this intent was already confirmed (e.g. before a restart).
    async fn confirmed_order(&self, intent: &SettlementIntent) -> Result<Order> {
        if let Some(order) = self.ports.orders.get(&intent.intent_id).await?
            && order.payment_status == PaymentStatus::Succeeded
        {
            return Ok(order);
        }

        let response = self
            .settings
            .retry
            .run("confirm_intent", || {
                self.ports
                    .authority
                    .confirm_intent(&intent.intent_id, &intent.idempotency_token)
            })
            .await?;

        match response.payment_status {
            PaymentStatus::Succeeded => Ok(response.order),
            status => Err(CheckoutError::PaymentFailed(format!(
                "authority reported payment status {status}"
            ))),
        }
    }

    async fn settle(&self, order: Order) -> Result<Order> {
        {
            let mut attempt = self.attempt.lock().await;
            attempt.state = attempt
                .state
                .transition(SettlementEvent::AuthorityConfirmed)?;
            attempt.order = Some(order.clone());
            attempt.reconciled.send_replace(Some(order.clone()));
        }
        info!(order_id = %order.id, intent_id = %order.intent_id, total = %order.breakdown.total, "order settled");

        if let Err(e) = self.ports.orders.store(order.clone()).await {
            error!(order_id = %order.id, error = %e, "failed to record settled order");
        }
        if let Err(e) = self.session.clear().await {
            error!(session = %self.session.id(), error = %e, "failed to persist cleared cart");
        }
        Ok(order)
    }

    /// User-initiated cancel while the provider is presenting. Canceling an
    /// already canceled attempt is a no-op.
    pub async fn cancel(&self) -> Result<()> {
        let mut attempt = self.attempt.lock().await;
        if attempt.state == SettlementState::Canceled {
            return Ok(());
        }
        attempt.state = attempt.state.transition(SettlementEvent::UserCanceled)?;
        attempt.cancel.notify_one();
        info!(
            intent_id = attempt.intent.as_ref().map(|i| i.intent_id.0.as_str()).unwrap_or("-"),
            "checkout canceled by user"
        );
        Ok(())
    }

    /// Re-enters `AwaitingExternalConfirmation` with the intent of a canceled
    /// attempt, as long as the cart has not changed since it was priced.
    pub async fn resume(&self) -> Result<SettlementIntent> {
        let cart = self.session.snapshot().await;
        let mut attempt = self.attempt.lock().await;
        let state = attempt.state.transition(SettlementEvent::Resumed)?;

        let Some(intent) = attempt.intent.clone() else {
            return Err(CheckoutError::StaleIntent(
                "no intent retained for this attempt".to_string(),
            ));
        };
        if cart.items() != attempt.snapshot.as_slice() {
            attempt.intent = None;
            return Err(CheckoutError::StaleIntent(
                "cart changed since the intent was created".to_string(),
            ));
        }

        attempt.state = state;
        attempt.cancel = Arc::new(Notify::new());
        info!(intent_id = %intent.intent_id, "resumed canceled checkout");
        Ok(intent)
    }
}
