use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub name: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub default_location_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A line item of a completed sale. `returned_quantity` is the cumulative
/// ledger of units claimed by committed returns; it is only ever moved by
/// the quantity ledger (reserve/release), never written directly.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SoldLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_amount: Decimal,
    pub returned_quantity: i32,
}

impl SoldLine {
    /// Units still eligible for return. Derived, never stored.
    pub fn returnable_quantity(&self) -> i32 {
        (self.quantity - self.returned_quantity).max(0)
    }

    /// Per-unit price after spreading the line discount across its units.
    pub fn effective_unit_price(&self) -> Decimal {
        if self.quantity <= 0 || self.discount_amount.is_zero() {
            return self.unit_price;
        }
        let gross = self.unit_price * Decimal::from(self.quantity);
        ((gross - self.discount_amount) / Decimal::from(self.quantity)).round_dp(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(quantity: i32, returned: i32) -> SoldLine {
        SoldLine {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Widget".to_string(),
            quantity,
            unit_price: Decimal::new(2500, 2),
            discount_amount: Decimal::ZERO,
            returned_quantity: returned,
        }
    }

    #[test]
    fn returnable_is_sold_minus_returned() {
        assert_eq!(line(10, 0).returnable_quantity(), 10);
        assert_eq!(line(10, 4).returnable_quantity(), 6);
        assert_eq!(line(10, 10).returnable_quantity(), 0);
    }

    #[test]
    fn returnable_never_goes_negative() {
        // A corrupt row must not surface a negative returnable count.
        assert_eq!(line(3, 5).returnable_quantity(), 0);
    }

    #[test]
    fn effective_price_spreads_discount() {
        let mut l = line(4, 0);
        l.discount_amount = Decimal::new(1000, 2); // 10.00 off 4 × 25.00
        assert_eq!(l.effective_unit_price(), Decimal::new(2250, 2));
    }

    #[test]
    fn effective_price_without_discount_is_unit_price() {
        assert_eq!(line(4, 0).effective_unit_price(), Decimal::new(2500, 2));
    }
}
