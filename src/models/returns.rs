use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a return request. Stored as TEXT; the orchestrator is the
/// sole writer of the column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnState {
    Draft,
    Validated,
    Processed,
    Cancelled,
}

impl ReturnState {
    pub fn as_str(self) -> &'static str {
        match self {
            ReturnState::Draft => "draft",
            ReturnState::Validated => "validated",
            ReturnState::Processed => "processed",
            ReturnState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ReturnState::Draft),
            "validated" => Some(ReturnState::Validated),
            "processed" => Some(ReturnState::Processed),
            "cancelled" => Some(ReturnState::Cancelled),
            _ => None,
        }
    }

    /// Lines are only mutable while the return is a draft.
    pub fn lines_mutable(self) -> bool {
        matches!(self, ReturnState::Draft)
    }

    pub fn can_validate(self) -> bool {
        matches!(self, ReturnState::Draft)
    }

    pub fn can_process(self) -> bool {
        matches!(self, ReturnState::Validated)
    }

    pub fn can_cancel(self) -> bool {
        matches!(self, ReturnState::Draft | ReturnState::Validated)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReturnState::Processed | ReturnState::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundMethod {
    Refund,
    Exchange,
}

impl RefundMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RefundMethod::Refund => "refund",
            RefundMethod::Exchange => "exchange",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "refund" => Some(RefundMethod::Refund),
            "exchange" => Some(RefundMethod::Exchange),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ReturnRequest {
    pub id: Uuid,
    pub name: String,
    pub original_order_id: Uuid,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub return_date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub refund_amount: Decimal,
    pub refund_method: String,
    pub exchange_processed: bool,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub processed_by: Option<Uuid>,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReturnRequest {
    pub fn lifecycle(&self) -> Option<ReturnState> {
        ReturnState::parse(&self.state)
    }

    pub fn method(&self) -> Option<RefundMethod> {
        RefundMethod::parse(&self.refund_method)
    }
}

/// One product's return within a request. `unit_price` and `subtotal` are
/// nullable: upstream may create a line before its money fields are
/// finalized, and reconciliation repairs them rather than rejecting the
/// return.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReturnLine {
    pub id: Uuid,
    pub return_id: Uuid,
    pub product_id: Uuid,
    pub product_name: Option<String>,
    pub original_order_line_id: Uuid,
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
    pub subtotal: Option<Decimal>,
    pub return_reason: Option<String>,
    pub state: String,
}

impl ReturnLine {
    /// The stored subtotal, or `quantity × unit_price` when it is missing.
    /// `None` only when the unit price is missing too.
    pub fn computed_subtotal(&self) -> Option<Decimal> {
        self.subtotal
            .or_else(|| self.unit_price.map(|p| Decimal::from(self.quantity) * p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_text() {
        for state in [
            ReturnState::Draft,
            ReturnState::Validated,
            ReturnState::Processed,
            ReturnState::Cancelled,
        ] {
            assert_eq!(ReturnState::parse(state.as_str()), Some(state));
        }
        assert_eq!(ReturnState::parse("bogus"), None);
    }

    #[test]
    fn transition_table() {
        assert!(ReturnState::Draft.can_validate());
        assert!(!ReturnState::Validated.can_validate());
        assert!(ReturnState::Validated.can_process());
        assert!(!ReturnState::Draft.can_process());
        assert!(ReturnState::Draft.can_cancel());
        assert!(ReturnState::Validated.can_cancel());
        assert!(!ReturnState::Processed.can_cancel());
        assert!(!ReturnState::Cancelled.can_cancel());
        assert!(ReturnState::Processed.is_terminal());
        assert!(ReturnState::Cancelled.is_terminal());
    }

    fn bare_line(quantity: i32) -> ReturnLine {
        ReturnLine {
            id: Uuid::new_v4(),
            return_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: None,
            original_order_line_id: Uuid::new_v4(),
            quantity,
            unit_price: None,
            subtotal: None,
            return_reason: None,
            state: "draft".to_string(),
        }
    }

    #[test]
    fn subtotal_recomputed_from_quantity_and_price() {
        let mut line = bare_line(3);
        line.unit_price = Some(Decimal::new(2500, 2));
        assert_eq!(line.computed_subtotal(), Some(Decimal::new(7500, 2)));
    }

    #[test]
    fn stored_subtotal_wins_over_recomputation() {
        let mut line = bare_line(3);
        line.unit_price = Some(Decimal::new(2500, 2));
        line.subtotal = Some(Decimal::new(7000, 2));
        assert_eq!(line.computed_subtotal(), Some(Decimal::new(7000, 2)));
    }

    #[test]
    fn subtotal_unknown_without_price() {
        assert_eq!(bare_line(3).computed_subtotal(), None);
    }
}
