use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use storefront_checkout::application::coordinator::{
    SettlementCoordinator, SettlementPorts, SettlementSettings,
};
use storefront_checkout::application::retry::RetryPolicy;
use storefront_checkout::application::session::CheckoutSession;
use storefront_checkout::domain::cart::{ProductId, UnitPrice};
use storefront_checkout::domain::pricing::FeeSchedule;
use storefront_checkout::domain::settlement::ProviderOutcome;
use storefront_checkout::infrastructure::in_memory::{
    InMemoryCartStore, InMemoryCatalog, InMemoryOrderStore,
};
use storefront_checkout::infrastructure::simulated::{ScriptedProvider, SimulatedAuthority};

pub struct Storefront {
    pub catalog: InMemoryCatalog,
    pub carts: InMemoryCartStore,
    pub orders: InMemoryOrderStore,
    pub authority: SimulatedAuthority,
    pub provider: ScriptedProvider,
}

impl Storefront {
    /// Catalog with `(product, price)` entries and a provider answering `outcome`.
    pub async fn new(products: &[(u64, Decimal)], outcome: ProviderOutcome) -> Self {
        let catalog = InMemoryCatalog::new();
        for (id, price) in products {
            catalog.insert(ProductId(*id), *price).await;
        }
        Self {
            authority: SimulatedAuthority::new(catalog.clone(), FeeSchedule::default()),
            provider: ScriptedProvider::new(outcome),
            carts: InMemoryCartStore::new(),
            orders: InMemoryOrderStore::new(),
            catalog,
        }
    }

    pub async fn session(&self, id: &str) -> Arc<CheckoutSession> {
        Arc::new(
            CheckoutSession::open(id, Box::new(self.carts.clone()))
                .await
                .unwrap(),
        )
    }

    pub fn coordinator(&self, session: Arc<CheckoutSession>) -> SettlementCoordinator {
        SettlementCoordinator::new(
            session,
            SettlementPorts {
                authority: Box::new(self.authority.clone()),
                provider: Box::new(self.provider.clone()),
                catalog: Box::new(self.catalog.clone()),
                orders: Box::new(self.orders.clone()),
            },
            fast_settings(),
        )
    }
}

pub fn fast_settings() -> SettlementSettings {
    SettlementSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            request_timeout: Duration::from_millis(250),
        },
        ..SettlementSettings::default()
    }
}

pub async fn add(session: &CheckoutSession, product: u64, price: Decimal, quantity: i64) {
    session
        .add_item(ProductId(product), UnitPrice::usd(price).unwrap(), quantity)
        .await
        .unwrap();
}
