use crate::domain::cart::Cart;
use crate::domain::ports::{CartStore, OrderStore};
use crate::domain::settlement::{IntentId, Order};
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column Family for session carts, keyed by session id.
pub const CF_CARTS: &str = "carts";
/// Column Family for confirmed orders, keyed by intent id.
pub const CF_ORDERS: &str = "orders";

/// A persistent store implementation using RocksDB.
///
/// Carts and orders live in separate Column Families with JSON values, so a
/// session's cart and the orders it settled survive a restart.
///
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path`, creating the "carts" and
    /// "orders" column families when missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_carts = ColumnFamilyDescriptor::new(CF_CARTS, Options::default());
        let cf_orders = ColumnFamilyDescriptor::new(CF_ORDERS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_carts, cf_orders])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            CheckoutError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn put_json<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let value = serde_json::to_vec(value)?;
        self.db.put_cf(self.cf(cf)?, key, value)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_pinned_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CartStore for RocksDBStore {
    async fn save(&self, session_id: &str, cart: &Cart) -> Result<()> {
        self.put_json(CF_CARTS, session_id.as_bytes(), cart)
    }

    async fn load(&self, session_id: &str) -> Result<Option<Cart>> {
        self.get_json(CF_CARTS, session_id.as_bytes())
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        self.db.delete_cf(self.cf(CF_CARTS)?, session_id.as_bytes())?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn store(&self, order: Order) -> Result<()> {
        self.put_json(CF_ORDERS, order.intent_id.0.as_bytes(), &order)
    }

    async fn get(&self, intent_id: &IntentId) -> Result<Option<Order>> {
        self.get_json(CF_ORDERS, intent_id.0.as_bytes())
    }

    async fn get_all(&self) -> Result<Vec<Order>> {
        let cf = self.cf(CF_ORDERS)?;
        let mut orders = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            orders.push(serde_json::from_slice::<Order>(&value)?);
        }
        orders.sort_by(|a, b| a.order_number.cmp(&b.order_number));
        Ok(orders)
    }
}
