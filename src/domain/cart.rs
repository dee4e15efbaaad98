use crate::error::{CheckoutError, Result};
use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog identifier of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub u64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cart-assigned identifier of a line, distinct from the product it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(pub u64);

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code, always stored upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_uppercase()))
        } else {
            Err(CheckoutError::InvalidCartState(format!(
                "'{code}' is not a currency code"
            )))
        }
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::usd()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = CheckoutError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// Non-negative price of a single unit in a given currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPrice {
    amount: Decimal,
    currency: Currency,
}

impl UnitPrice {
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self> {
        if amount < Decimal::ZERO {
            return Err(CheckoutError::InvalidCartState(format!(
                "unit price {amount} is negative"
            )));
        }
        Ok(Self { amount, currency })
    }

    pub fn usd(amount: Decimal) -> Result<Self> {
        Self::new(amount, Currency::usd())
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub line_id: LineId,
    pub product_id: ProductId,
    pub unit_price: UnitPrice,
    pub quantity: u32,
    pub added_at: Timestamp,
}

impl LineItem {
    /// Exact `unit_price × quantity`, unrounded.
    pub fn line_total(&self) -> Result<Decimal> {
        self.unit_price
            .amount()
            .checked_mul(Decimal::from(self.quantity))
            .ok_or_else(|| {
                CheckoutError::InvalidCartState(format!("total of line {} overflows", self.line_id))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub total_items: u64,
    pub total_price: Decimal,
}

/// The line-item collection that feeds pricing.
///
/// Every retained line has a quantity of at least one. Totals and currency are
/// derived from the lines on each call and never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    items: Vec<LineItem>,
    next_line_id: u64,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `quantity` units of a product, merging into the existing line for
    /// that product when there is one. A merged line keeps its original price.
    pub fn add_item(
        &mut self,
        product_id: ProductId,
        unit_price: UnitPrice,
        quantity: i64,
    ) -> Result<LineId> {
        let quantity = positive_quantity(quantity)?;

        if let Some(expected) = self.currency()
            && expected != unit_price.currency()
        {
            return Err(CheckoutError::CurrencyMismatch {
                expected: expected.clone(),
                found: unit_price.currency().clone(),
            });
        }

        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|item| item.product_id == product_id)
        {
            let previous = existing.quantity;
            existing.quantity = previous
                .checked_add(quantity)
                .ok_or(CheckoutError::InvalidQuantity(i64::from(quantity)))?;
            let line_id = existing.line_id;
            if let Err(e) = self.totals() {
                self.set_quantity(line_id, previous);
                return Err(e);
            }
            return Ok(line_id);
        }

        self.next_line_id += 1;
        let line_id = LineId(self.next_line_id);
        self.items.push(LineItem {
            line_id,
            product_id,
            unit_price,
            quantity,
            added_at: Timestamp::now(),
        });
        if let Err(e) = self.totals() {
            self.items.pop();
            return Err(e);
        }
        Ok(line_id)
    }

    /// Adds a single unit of a product.
    pub fn add_one(&mut self, product_id: ProductId, unit_price: UnitPrice) -> Result<LineId> {
        self.add_item(product_id, unit_price, 1)
    }

    /// Replaces the quantity of a line. Zero or less removes the line.
    pub fn update_quantity(&mut self, line_id: LineId, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            self.remove_item(line_id);
            return Ok(());
        }
        let quantity = positive_quantity(quantity)?;
        let Some(previous) = self.line(line_id).map(|item| item.quantity) else {
            return Ok(());
        };
        self.set_quantity(line_id, quantity);
        if let Err(e) = self.totals() {
            self.set_quantity(line_id, previous);
            return Err(e);
        }
        Ok(())
    }

    fn set_quantity(&mut self, line_id: LineId, quantity: u32) {
        if let Some(item) = self.items.iter_mut().find(|item| item.line_id == line_id) {
            item.quantity = quantity;
        }
    }

    /// Removing an absent line is a no-op.
    pub fn remove_item(&mut self, line_id: LineId) {
        self.items.retain(|item| item.line_id != line_id);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Fails with [`CheckoutError::InvalidCartState`] when the price does not fit
    /// a `Decimal`. Mutations refuse to reach that state, but a cart restored
    /// from storage is not re-validated.
    pub fn totals(&self) -> Result<CartTotals> {
        let mut totals = CartTotals {
            total_items: 0,
            total_price: Decimal::ZERO,
        };
        for item in &self.items {
            totals.total_items += u64::from(item.quantity);
            totals.total_price = totals
                .total_price
                .checked_add(item.line_total()?)
                .ok_or_else(|| CheckoutError::InvalidCartState("cart total overflows".to_string()))?;
        }
        Ok(totals)
    }

    pub fn currency(&self) -> Option<&Currency> {
        self.items.first().map(|item| item.unit_price.currency())
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn line(&self, line_id: LineId) -> Option<&LineItem> {
        self.items.iter().find(|item| item.line_id == line_id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn positive_quantity(quantity: i64) -> Result<u32> {
    if quantity < 1 {
        return Err(CheckoutError::InvalidQuantity(quantity));
    }
    u32::try_from(quantity).map_err(|_| CheckoutError::InvalidQuantity(quantity))
}
