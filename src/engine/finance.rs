use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    error::EngineError,
    models::{RefundMethod, ReturnLine, ReturnRequest},
};

/// Sum return lines into a total, repairing what it can on the way.
///
/// A missing subtotal is recomputed from `quantity × unit_price` and
/// reported back for persistence; a line missing its unit price too
/// contributes zero and is logged as a data-integrity warning. Never a
/// hard failure: a return already in flight must still be closeable.
pub fn sum_lines(lines: &[ReturnLine]) -> (Decimal, Vec<(Uuid, Decimal)>) {
    let mut total = Decimal::ZERO;
    let mut repairs = Vec::new();

    for line in lines {
        match line.subtotal {
            Some(subtotal) => total += subtotal,
            None => match line.computed_subtotal() {
                Some(subtotal) => {
                    log::warn!(
                        "return line {} has no subtotal; recomputed {} from {} x {}",
                        line.id,
                        subtotal,
                        line.quantity,
                        line.unit_price.unwrap_or_default()
                    );
                    repairs.push((line.id, subtotal));
                    total += subtotal;
                }
                None => {
                    log::warn!(
                        "return line {} has neither subtotal nor unit price; \
                         contributes zero to the return total",
                        line.id
                    );
                }
            },
        }
    }

    (total, repairs)
}

/// Refund settlement rule: a plain refund pays out the full total, an
/// exchange leaves the refund amount untouched (any differential is a
/// business rule set by the caller).
pub fn settle(total: Decimal, method: RefundMethod, current_refund: Decimal) -> Decimal {
    match method {
        RefundMethod::Refund => total,
        RefundMethod::Exchange => current_refund,
    }
}

/// Compute and persist a return's totals inside the caller's transaction.
/// Repaired subtotals are written back so the defect does not resurface.
pub async fn compute_totals(
    tx: &mut Transaction<'_, Postgres>,
    ret: &ReturnRequest,
) -> Result<(Decimal, Decimal), EngineError> {
    let lines = sqlx::query_as::<_, ReturnLine>(
        "SELECT * FROM pos_return_lines WHERE return_id = $1 ORDER BY id",
    )
    .bind(ret.id)
    .fetch_all(&mut **tx)
    .await?;

    let (total, repairs) = sum_lines(&lines);
    for (line_id, subtotal) in &repairs {
        sqlx::query("UPDATE pos_return_lines SET subtotal = $1 WHERE id = $2")
            .bind(subtotal)
            .bind(line_id)
            .execute(&mut **tx)
            .await?;
    }

    let method = ret.method().ok_or_else(|| {
        EngineError::Internal(format!(
            "return {} has unknown refund method {:?}",
            ret.id, ret.refund_method
        ))
    })?;
    let refund = settle(total, method, ret.refund_amount);

    sqlx::query(
        "UPDATE pos_returns SET total_amount = $1, refund_amount = $2, updated_at = now() \
         WHERE id = $3",
    )
    .bind(total)
    .bind(refund)
    .bind(ret.id)
    .execute(&mut **tx)
    .await?;

    Ok((total, refund))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn line(quantity: i32, unit_price: Option<Decimal>, subtotal: Option<Decimal>) -> ReturnLine {
        ReturnLine {
            id: Uuid::new_v4(),
            return_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: None,
            original_order_line_id: Uuid::new_v4(),
            quantity,
            unit_price,
            subtotal,
            return_reason: None,
            state: "validated".to_string(),
        }
    }

    #[test]
    fn sums_stored_subtotals() {
        let lines = vec![
            line(1, None, Some(Decimal::new(1000, 2))),
            line(1, None, Some(Decimal::new(2550, 2))),
        ];
        let (total, repairs) = sum_lines(&lines);
        assert_eq!(total, Decimal::new(3550, 2));
        assert!(repairs.is_empty());
    }

    #[test]
    fn recomputes_missing_subtotal_from_quantity_and_price() {
        let lines = vec![line(3, Some(Decimal::new(2500, 2)), None)];
        let (total, repairs) = sum_lines(&lines);
        assert_eq!(total, Decimal::new(7500, 2));
        assert_eq!(repairs.len(), 1);
        assert_eq!(repairs[0].1, Decimal::new(7500, 2));
    }

    #[test]
    fn line_without_price_contributes_zero_instead_of_failing() {
        let lines = vec![
            line(2, None, None),
            line(1, None, Some(Decimal::new(500, 2))),
        ];
        let (total, repairs) = sum_lines(&lines);
        assert_eq!(total, Decimal::new(500, 2));
        assert!(repairs.is_empty());
    }

    #[test]
    fn empty_return_sums_to_zero() {
        let (total, repairs) = sum_lines(&[]);
        assert_eq!(total, Decimal::ZERO);
        assert!(repairs.is_empty());
    }

    #[test]
    fn refund_settlement_pays_the_full_total() {
        let total = Decimal::new(7500, 2);
        assert_eq!(settle(total, RefundMethod::Refund, Decimal::ZERO), total);
    }

    #[test]
    fn exchange_settlement_preserves_the_refund_amount() {
        let total = Decimal::new(7500, 2);
        let partial = Decimal::new(1200, 2);
        assert_eq!(settle(total, RefundMethod::Exchange, partial), partial);
        assert_eq!(
            settle(total, RefundMethod::Exchange, Decimal::ZERO),
            Decimal::ZERO
        );
    }
}
