use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use storefront_checkout::domain::cart::{Cart, LineId, ProductId, UnitPrice};
use storefront_checkout::domain::pricing::{compute_breakdown, round_cents};

fn random_amount(rng: &mut StdRng) -> Decimal {
    // Up to 100_000.000 with three decimal places, so rounding is exercised.
    Decimal::new(rng.gen_range(0..100_000_000), 3)
}

#[test]
fn test_breakdown_invariants_hold_for_random_subtotals() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..2_000 {
        let subtotal = random_amount(&mut rng);
        let b = compute_breakdown(subtotal).unwrap();

        assert_eq!(b.subtotal, round_cents(subtotal));
        assert_eq!(b.government_tax, round_cents(subtotal * dec!(0.0725)));
        assert_eq!(b.platform_fee, round_cents(subtotal * dec!(0.0325)));
        assert_eq!(b.total, b.subtotal + b.government_tax + b.platform_fee);
        assert!(b.total >= b.subtotal);
        assert_eq!(b.total.scale(), 2);
        assert_eq!(compute_breakdown(subtotal).unwrap(), b);
    }
}

#[test]
fn test_cart_totals_match_lines_after_random_operations() {
    let mut rng = StdRng::seed_from_u64(42);
    let prices = [dec!(0.99), dec!(4.99), dec!(10.00), dec!(12.50), dec!(199.95)];

    for _ in 0..200 {
        let mut cart = Cart::new();
        let mut lines: Vec<LineId> = Vec::new();

        for _ in 0..30 {
            match rng.gen_range(0..4) {
                0 | 1 => {
                    let product = rng.gen_range(0..prices.len());
                    let price = UnitPrice::usd(prices[product]).unwrap();
                    let quantity = rng.gen_range(1..5);
                    let line = cart
                        .add_item(ProductId(product as u64), price, quantity)
                        .unwrap();
                    if !lines.contains(&line) {
                        lines.push(line);
                    }
                }
                2 if !lines.is_empty() => {
                    let line = lines[rng.gen_range(0..lines.len())];
                    cart.update_quantity(line, rng.gen_range(-1..6)).unwrap();
                }
                3 if !lines.is_empty() => {
                    let line = lines.swap_remove(rng.gen_range(0..lines.len()));
                    cart.remove_item(line);
                }
                _ => {}
            }
            lines.retain(|line| cart.line(*line).is_some());

            let totals = cart.totals().unwrap();
            let expected_price: Decimal = cart
                .items()
                .iter()
                .map(|item| item.unit_price.amount() * Decimal::from(item.quantity))
                .sum();
            let expected_items: u64 = cart.items().iter().map(|item| u64::from(item.quantity)).sum();

            assert_eq!(totals.total_price, expected_price);
            assert_eq!(totals.total_items, expected_items);
            assert!(cart.items().iter().all(|item| item.quantity >= 1));
        }
    }
}
