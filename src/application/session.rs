use crate::domain::cart::{Cart, CartTotals, LineId, ProductId, UnitPrice};
use crate::domain::ports::CartStoreBox;
use crate::error::Result;
use tokio::sync::RwLock;
use tracing::debug;

/// Session context owning the cart of one shopper.
///
/// Every mutation goes through the pure [`Cart`] operations and is then written
/// to the [`CartStore`](crate::domain::ports::CartStore), so the cart survives a
/// restart. A cart that becomes empty is removed from the store.
pub struct CheckoutSession {
    id: String,
    cart: RwLock<Cart>,
    store: CartStoreBox,
}

impl CheckoutSession {
    /// Opens a session, restoring its persisted cart or starting empty.
    pub async fn open(id: impl Into<String>, store: CartStoreBox) -> Result<Self> {
        let id = id.into();
        let cart = store.load(&id).await?.unwrap_or_default();
        debug!(session = %id, lines = cart.items().len(), "opened checkout session");
        Ok(Self {
            id,
            cart: RwLock::new(cart),
            store,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn add_item(
        &self,
        product_id: ProductId,
        unit_price: UnitPrice,
        quantity: i64,
    ) -> Result<LineId> {
        self.mutate(|cart| cart.add_item(product_id, unit_price, quantity))
            .await
    }

    pub async fn update_quantity(&self, line_id: LineId, quantity: i64) -> Result<()> {
        self.mutate(|cart| cart.update_quantity(line_id, quantity))
            .await
    }

    pub async fn remove_item(&self, line_id: LineId) -> Result<()> {
        self.mutate(|cart| {
            cart.remove_item(line_id);
            Ok(())
        })
        .await
    }

    pub async fn clear(&self) -> Result<()> {
        self.mutate(|cart| {
            cart.clear();
            Ok(())
        })
        .await
    }

    pub async fn totals(&self) -> Result<CartTotals> {
        self.cart.read().await.totals()
    }

    /// Copy of the current cart, detached from later mutations.
    pub async fn snapshot(&self) -> Cart {
        self.cart.read().await.clone()
    }

    /// Applies `op` to a copy and swaps it in only once the store accepted it,
    /// so a failed write leaves the session cart as it was.
    async fn mutate<T>(&self, op: impl FnOnce(&mut Cart) -> Result<T>) -> Result<T> {
        let mut cart = self.cart.write().await;
        let mut next = cart.clone();
        let value = op(&mut next)?;
        if next.is_empty() {
            self.store.remove(&self.id).await?;
        } else {
            self.store.save(&self.id, &next).await?;
        }
        *cart = next;
        Ok(value)
    }
}
