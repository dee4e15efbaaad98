use crate::domain::cart::{Cart, ProductId};
use crate::domain::ports::{CartStore, Catalog, OrderStore};
use crate::domain::settlement::{IntentId, Order};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for session carts.
///
/// Clones share the same map, so a cart saved through one handle can be
/// restored through another.
#[derive(Default, Clone)]
pub struct InMemoryCartStore {
    carts: Arc<RwLock<HashMap<String, Cart>>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn save(&self, session_id: &str, cart: &Cart) -> Result<()> {
        let mut carts = self.carts.write().await;
        carts.insert(session_id.to_string(), cart.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Cart>> {
        let carts = self.carts.read().await;
        Ok(carts.get(session_id).cloned())
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        self.carts.write().await.remove(session_id);
        Ok(())
    }
}

/// A thread-safe in-memory store for confirmed orders, keyed by intent id.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<IntentId, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn store(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        orders.insert(order.intent_id.clone(), order);
        Ok(())
    }

    async fn get(&self, intent_id: &IntentId) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(intent_id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut all: Vec<Order> = orders.values().cloned().collect();
        all.sort_by(|a, b| a.order_number.cmp(&b.order_number));
        Ok(all)
    }
}

/// Product catalog backed by a price map.
#[derive(Default, Clone)]
pub struct InMemoryCatalog {
    prices: Arc<RwLock<HashMap<ProductId, Decimal>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, product_id: ProductId, price: Decimal) {
        self.prices.write().await.insert(product_id, price);
    }

    pub async fn remove(&self, product_id: ProductId) {
        self.prices.write().await.remove(&product_id);
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn validate(&self, product_id: ProductId) -> Result<Option<Decimal>> {
        let prices = self.prices.read().await;
        Ok(prices.get(&product_id).copied())
    }
}
