use super::cart::{Cart, ProductId};
use super::settlement::{
    ClientSecret, ConfirmResponse, IdempotencyToken, IntentId, IntentRequest, IntentResponse,
    Order, ProviderResult,
};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Remote order/payment authority. Both calls are idempotent: a repeated
/// `create_intent` with the same token returns the same intent, a repeated
/// `confirm_intent` with the same intent returns the same order.
#[async_trait]
pub trait PaymentAuthority: Send + Sync {
    async fn create_intent(&self, request: &IntentRequest) -> Result<IntentResponse>;
    async fn confirm_intent(
        &self,
        intent_id: &IntentId,
        token: &IdempotencyToken,
    ) -> Result<ConfirmResponse>;
}

/// External payment-provider SDK (presents its own UI).
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn present(&self, client_secret: &ClientSecret) -> Result<ProviderResult>;
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Price at the time of the lookup, or `None` when the product is unknown.
    async fn validate(&self, product_id: ProductId) -> Result<Option<Decimal>>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn save(&self, session_id: &str, cart: &Cart) -> Result<()>;
    async fn load(&self, session_id: &str) -> Result<Option<Cart>>;
    async fn remove(&self, session_id: &str) -> Result<()>;
}

/// Confirmed order projections, keyed by intent id.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn store(&self, order: Order) -> Result<()>;
    async fn get(&self, intent_id: &IntentId) -> Result<Option<Order>>;
    async fn get_all(&self) -> Result<Vec<Order>>;
}

pub type PaymentAuthorityBox = Box<dyn PaymentAuthority>;
pub type PaymentProviderBox = Box<dyn PaymentProvider>;
pub type CatalogBox = Box<dyn Catalog>;
pub type CartStoreBox = Box<dyn CartStore>;
pub type OrderStoreBox = Box<dyn OrderStore>;
