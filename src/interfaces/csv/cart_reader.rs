use crate::domain::cart::{Cart, Currency, ProductId, UnitPrice};
use crate::error::{CheckoutError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One `product_id, unit_price, quantity[, currency]` record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CartRow {
    pub product_id: u64,
    pub unit_price: Decimal,
    pub quantity: i64,
    #[serde(default)]
    pub currency: Option<String>,
}

impl CartRow {
    pub fn product_id(&self) -> ProductId {
        ProductId(self.product_id)
    }

    /// Unit price in the row's currency, USD when the column is blank.
    pub fn unit_price(&self) -> Result<UnitPrice> {
        let currency = match self.currency.as_deref() {
            Some(code) if !code.is_empty() => Currency::new(code)?,
            _ => Currency::usd(),
        };
        UnitPrice::new(self.unit_price, currency)
    }
}

/// Reads cart lines from a CSV source.
///
/// Whitespace is trimmed and the currency column may be omitted, in which case
/// the line is priced in USD.
pub struct CartReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CartReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows, one result per record.
    pub fn rows(self) -> impl Iterator<Item = Result<CartRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(CheckoutError::from))
    }

    /// Builds a cart from every row, going through the regular cart operations
    /// so repeated products merge and invalid quantities are rejected.
    pub fn into_cart(self) -> Result<Cart> {
        let mut cart = Cart::new();
        for row in self.rows() {
            let row = row?;
            cart.add_item(row.product_id(), row.unit_price()?, row.quantity)?;
        }
        Ok(cart)
    }
}
