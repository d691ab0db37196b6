use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    database::Database,
    error::EngineError,
    models::{
        record_code, Order, QualityCheck, QualityState, RefundMethod, ReturnLine, ReturnRequest,
        ReturnState, SoldLine,
    },
};

use super::{finance, ledger, stock};

#[derive(Debug, Deserialize)]
pub struct NewReturn {
    pub order_id: Uuid,
    pub refund_method: RefundMethod,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub lines: Vec<NewReturnLine>,
}

#[derive(Debug, Deserialize)]
pub struct NewReturnLine {
    pub sold_line_id: Uuid,
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
    pub return_reason: Option<String>,
}

/// Open a return in draft against a completed order. Quantities are only
/// sanity-checked here; the ledger reservation happens at validation.
pub async fn create_return(db: &Database, req: NewReturn) -> Result<ReturnRequest, EngineError> {
    let mut tx = db.begin().await?;

    let order = sqlx::query_as::<_, Order>("SELECT * FROM pos_orders WHERE id = $1")
        .bind(req.order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "order",
            id: req.order_id,
        })?;

    let return_id = Uuid::new_v4();
    let ret = sqlx::query_as::<_, ReturnRequest>(
        "INSERT INTO pos_returns \
         (id, name, original_order_id, customer_name, customer_phone, refund_method, \
          notes, created_by, state) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
    )
    .bind(return_id)
    .bind(record_code("RET"))
    .bind(order.id)
    .bind(&req.customer_name)
    .bind(&req.customer_phone)
    .bind(req.refund_method.as_str())
    .bind(&req.notes)
    .bind(req.created_by)
    .bind(ReturnState::Draft.as_str())
    .fetch_one(&mut *tx)
    .await?;

    for line in &req.lines {
        insert_line(&mut tx, &ret, line).await?;
    }

    tx.commit().await?;
    log::info!("return {} opened against order {}", ret.name, order.name);
    Ok(ret)
}

async fn insert_line(
    tx: &mut Transaction<'_, Postgres>,
    ret: &ReturnRequest,
    line: &NewReturnLine,
) -> Result<ReturnLine, EngineError> {
    if line.quantity <= 0 {
        return Err(EngineError::InvalidQuantity(line.quantity));
    }

    let sold = sqlx::query_as::<_, SoldLine>("SELECT * FROM pos_order_lines WHERE id = $1")
        .bind(line.sold_line_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "sold line",
            id: line.sold_line_id,
        })?;

    if sold.order_id != ret.original_order_id {
        return Err(EngineError::OrderMismatch {
            sold_line_id: sold.id,
            order_id: ret.original_order_id,
        });
    }

    // Price defaults to the sold line's discounted per-unit price; the
    // subtotal is materialized eagerly so it is never left unset.
    let unit_price = line.unit_price.unwrap_or_else(|| sold.effective_unit_price());
    let subtotal = Decimal::from(line.quantity) * unit_price;

    let row = sqlx::query_as::<_, ReturnLine>(
        "INSERT INTO pos_return_lines \
         (id, return_id, product_id, product_name, original_order_line_id, quantity, \
          unit_price, subtotal, return_reason, state) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(ret.id)
    .bind(sold.product_id)
    .bind(&sold.product_name)
    .bind(sold.id)
    .bind(line.quantity)
    .bind(unit_price)
    .bind(subtotal)
    .bind(&line.return_reason)
    .bind("draft")
    .fetch_one(&mut **tx)
    .await?;

    Ok(row)
}

/// Add a line to a draft return.
pub async fn add_line(
    db: &Database,
    return_id: Uuid,
    line: NewReturnLine,
) -> Result<ReturnLine, EngineError> {
    let mut tx = db.begin().await?;
    let ret = lock_return(&mut tx, return_id).await?;
    let state = lifecycle(&ret)?;
    if !state.lines_mutable() {
        return Err(invalid_transition(&ret, "add a line"));
    }
    let row = insert_line(&mut tx, &ret, &line).await?;
    tx.commit().await?;
    Ok(row)
}

/// Remove a line from a draft return.
pub async fn remove_line(db: &Database, return_id: Uuid, line_id: Uuid) -> Result<(), EngineError> {
    let mut tx = db.begin().await?;
    let ret = lock_return(&mut tx, return_id).await?;
    let state = lifecycle(&ret)?;
    if !state.lines_mutable() {
        return Err(invalid_transition(&ret, "remove a line"));
    }
    let deleted = sqlx::query("DELETE FROM pos_return_lines WHERE id = $1 AND return_id = $2")
        .bind(line_id)
        .bind(return_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(EngineError::NotFound {
            entity: "return line",
            id: line_id,
        });
    }
    tx.commit().await?;
    Ok(())
}

/// Reserve every line's quantity against the ledger and freeze the return.
///
/// All reservations happen in one transaction: if any line over-asks, every
/// failure is collected and the whole transaction rolls back, leaving the
/// return in draft with no partial reservation behind.
pub async fn validate_return(db: &Database, return_id: Uuid) -> Result<ReturnRequest, EngineError> {
    let mut tx = db.begin().await?;
    let ret = lock_return(&mut tx, return_id).await?;
    let state = lifecycle(&ret)?;
    if !state.can_validate() {
        return Err(invalid_transition(&ret, "validate"));
    }

    let lines = lines_of(&mut tx, return_id).await?;
    if lines.is_empty() {
        return Err(EngineError::EmptyReturn(return_id));
    }

    let mut failures = Vec::new();
    for line in &lines {
        match ledger::reserve(&mut tx, line.original_order_line_id, line.quantity).await {
            Ok(()) => {}
            Err(EngineError::InsufficientReturnableQuantity(detail)) => {
                failures.push(format!("line {}: {}", line.id, detail));
            }
            Err(other) => return Err(other),
        }
    }
    if !failures.is_empty() {
        // Dropping the transaction rolls back the reservations that did land.
        return Err(EngineError::InsufficientReturnableQuantity(
            failures.join("; "),
        ));
    }

    // Physical intake: the returned units enter stock at quarantine, where
    // they sit until inspection routes them onward.
    let (source_kind, dest_kind) = stock::intake_route();
    let source = stock::location_by_kind(&mut tx, source_kind).await?;
    let quarantine = stock::location_by_kind(&mut tx, dest_kind).await?;
    for line in &lines {
        stock::move_stock(
            &mut tx,
            line.product_id,
            line.quantity,
            &source,
            &quarantine,
            Some(&ret.name),
            ret.created_by,
        )
        .await?;
    }

    for line in &lines {
        sqlx::query(
            "INSERT INTO quality_checks (id, name, return_line_id, quantity, quality_state) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(record_code("QC"))
        .bind(line.id)
        .bind(line.quantity)
        .bind(QualityState::Pending.as_str())
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE pos_return_lines SET state = 'validated' WHERE return_id = $1")
        .bind(return_id)
        .execute(&mut *tx)
        .await?;

    let ret = set_state(&mut tx, return_id, ReturnState::Validated).await?;
    tx.commit().await?;
    log::info!("return {} validated with {} lines", ret.name, lines.len());
    Ok(ret)
}

/// Close a validated return: every line must be inspected, totals are
/// finalized, and the refund or exchange settlement is recorded against
/// the actor who closed it.
pub async fn process_return(
    db: &Database,
    return_id: Uuid,
    actor: Option<Uuid>,
) -> Result<ReturnRequest, EngineError> {
    let mut tx = db.begin().await?;
    let ret = lock_return(&mut tx, return_id).await?;
    process_guard(&ret)?;

    let lines = lines_of(&mut tx, return_id).await?;
    let checks = sqlx::query_as::<_, QualityCheck>(
        "SELECT qc.* FROM quality_checks qc \
         JOIN pos_return_lines l ON l.id = qc.return_line_id \
         WHERE l.return_id = $1",
    )
    .bind(return_id)
    .fetch_all(&mut *tx)
    .await?;

    let pending = uninspected_lines(&lines, &checks);
    if !pending.is_empty() {
        return Err(EngineError::PendingInspection {
            return_id,
            pending: pending
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    if ret.method() == Some(RefundMethod::Exchange) {
        exchange_guard(&ret)?;
        sqlx::query("UPDATE pos_returns SET exchange_processed = true WHERE id = $1")
            .bind(return_id)
            .execute(&mut *tx)
            .await?;
    }

    let (total, refund) = finance::compute_totals(&mut tx, &ret).await?;

    sqlx::query("UPDATE pos_returns SET processed_by = $1 WHERE id = $2")
        .bind(actor)
        .bind(return_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE pos_return_lines SET state = 'processed' WHERE return_id = $1")
        .bind(return_id)
        .execute(&mut *tx)
        .await?;

    let ret = set_state(&mut tx, return_id, ReturnState::Processed).await?;
    tx.commit().await?;
    log::info!(
        "return {} processed: total {}, refund {}",
        ret.name,
        total,
        refund
    );
    Ok(ret)
}

/// Abandon a return. A validated return hands its reservations back to the
/// ledger; a never-validated draft cascades its lines away. Row-locking the
/// return serializes this against an in-flight validation.
pub async fn cancel_return(db: &Database, return_id: Uuid) -> Result<ReturnRequest, EngineError> {
    let mut tx = db.begin().await?;
    let ret = lock_return(&mut tx, return_id).await?;
    let state = lifecycle(&ret)?;
    if !state.can_cancel() {
        return Err(invalid_transition(&ret, "cancel"));
    }

    match state {
        ReturnState::Draft => {
            sqlx::query("DELETE FROM pos_return_lines WHERE return_id = $1")
                .bind(return_id)
                .execute(&mut *tx)
                .await?;
        }
        ReturnState::Validated => {
            let lines = lines_of(&mut tx, return_id).await?;
            let (source_kind, dest_kind) = stock::intake_route();
            let customer = stock::location_by_kind(&mut tx, source_kind).await?;
            let quarantine = stock::location_by_kind(&mut tx, dest_kind).await?;
            for line in &lines {
                ledger::release(&mut tx, line.original_order_line_id, line.quantity).await?;
                // Uninspected units are still sitting in quarantine; hand
                // them back. Inspected lines already had their stock
                // consequence and keep it for audit.
                if line.state == "validated" {
                    stock::move_stock(
                        &mut tx,
                        line.product_id,
                        line.quantity,
                        &quarantine,
                        &customer,
                        Some(&ret.name),
                        None,
                    )
                    .await?;
                }
            }
            sqlx::query("UPDATE pos_return_lines SET state = 'cancelled' WHERE return_id = $1")
                .bind(return_id)
                .execute(&mut *tx)
                .await?;
        }
        _ => unreachable!("can_cancel covers draft and validated only"),
    }

    let ret = set_state(&mut tx, return_id, ReturnState::Cancelled).await?;
    tx.commit().await?;
    log::info!("return {} cancelled", ret.name);
    Ok(ret)
}

pub async fn get_return(db: &Database, return_id: Uuid) -> Result<ReturnRequest, EngineError> {
    sqlx::query_as::<_, ReturnRequest>("SELECT * FROM pos_returns WHERE id = $1")
        .bind(return_id)
        .fetch_optional(db)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "return",
            id: return_id,
        })
}

pub async fn get_return_lines(
    db: &Database,
    return_id: Uuid,
) -> Result<Vec<ReturnLine>, EngineError> {
    let lines = sqlx::query_as::<_, ReturnLine>(
        "SELECT * FROM pos_return_lines WHERE return_id = $1 ORDER BY id",
    )
    .bind(return_id)
    .fetch_all(db)
    .await?;
    Ok(lines)
}

/// Persisted totals; reading twice without intervening mutation returns
/// identical values.
pub async fn get_return_totals(
    db: &Database,
    return_id: Uuid,
) -> Result<(Decimal, Decimal), EngineError> {
    let ret = get_return(db, return_id).await?;
    Ok((ret.total_amount, ret.refund_amount))
}

// --- shared transaction helpers ---

/// Row-lock the return for the duration of a lifecycle transition. This is
/// the per-ReturnRequest exclusivity: two processing calls for the same
/// return serialize here.
async fn lock_return(
    tx: &mut Transaction<'_, Postgres>,
    return_id: Uuid,
) -> Result<ReturnRequest, EngineError> {
    sqlx::query_as::<_, ReturnRequest>("SELECT * FROM pos_returns WHERE id = $1 FOR UPDATE")
        .bind(return_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "return",
            id: return_id,
        })
}

/// Lines of a return, row-locked: transitions take the line locks before
/// touching stock levels so they order consistently with an in-flight
/// inspection (which locks its line first).
async fn lines_of(
    tx: &mut Transaction<'_, Postgres>,
    return_id: Uuid,
) -> Result<Vec<ReturnLine>, EngineError> {
    let lines = sqlx::query_as::<_, ReturnLine>(
        "SELECT * FROM pos_return_lines WHERE return_id = $1 ORDER BY id FOR UPDATE",
    )
    .bind(return_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(lines)
}

async fn set_state(
    tx: &mut Transaction<'_, Postgres>,
    return_id: Uuid,
    state: ReturnState,
) -> Result<ReturnRequest, EngineError> {
    let ret = sqlx::query_as::<_, ReturnRequest>(
        "UPDATE pos_returns SET state = $1, updated_at = now() WHERE id = $2 RETURNING *",
    )
    .bind(state.as_str())
    .bind(return_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(ret)
}

// --- pure transition guards ---

fn lifecycle(ret: &ReturnRequest) -> Result<ReturnState, EngineError> {
    ret.lifecycle().ok_or_else(|| {
        EngineError::Internal(format!(
            "return {} has unknown state {:?}",
            ret.id, ret.state
        ))
    })
}

fn invalid_transition(ret: &ReturnRequest, operation: &'static str) -> EngineError {
    EngineError::InvalidTransition {
        entity: "return",
        id: ret.id,
        state: ret.state.clone(),
        operation,
    }
}

/// Processing is only reachable from `validated`; a repeat call on a
/// processed return is `AlreadyProcessed`, not a generic state error.
fn process_guard(ret: &ReturnRequest) -> Result<(), EngineError> {
    match lifecycle(ret)? {
        ReturnState::Validated => Ok(()),
        ReturnState::Processed => Err(EngineError::AlreadyProcessed(ret.id)),
        _ => Err(invalid_transition(ret, "process")),
    }
}

/// The exchange flag flips false→true exactly once per return.
fn exchange_guard(ret: &ReturnRequest) -> Result<(), EngineError> {
    if ret.exchange_processed {
        Err(EngineError::AlreadyProcessed(ret.id))
    } else {
        Ok(())
    }
}

/// Lines whose quality check is still pending (or missing altogether).
fn uninspected_lines(lines: &[ReturnLine], checks: &[QualityCheck]) -> Vec<Uuid> {
    lines
        .iter()
        .filter(|line| {
            !checks
                .iter()
                .any(|c| c.return_line_id == line.id && c.is_inspected())
        })
        .map(|line| line.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn request(state: &str, method: RefundMethod, exchange_processed: bool) -> ReturnRequest {
        ReturnRequest {
            id: Uuid::new_v4(),
            name: "RET-TEST0001".to_string(),
            original_order_id: Uuid::new_v4(),
            customer_name: None,
            customer_phone: None,
            return_date: Utc::now(),
            total_amount: Decimal::ZERO,
            refund_amount: Decimal::ZERO,
            refund_method: method.as_str().to_string(),
            exchange_processed,
            notes: None,
            created_by: None,
            processed_by: None,
            state: state.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(id: Uuid) -> ReturnLine {
        ReturnLine {
            id,
            return_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: None,
            original_order_line_id: Uuid::new_v4(),
            quantity: 1,
            unit_price: None,
            subtotal: None,
            return_reason: None,
            state: "validated".to_string(),
        }
    }

    fn check(line_id: Uuid, state: &str) -> QualityCheck {
        QualityCheck {
            id: Uuid::new_v4(),
            name: "QC-TEST0001".to_string(),
            return_line_id: line_id,
            quantity: 1,
            quality_state: state.to_string(),
            disposition: None,
            notes: None,
            checked_by: None,
            check_date: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn processing_requires_a_validated_return() {
        assert!(process_guard(&request("validated", RefundMethod::Refund, false)).is_ok());
        assert!(matches!(
            process_guard(&request("draft", RefundMethod::Refund, false)),
            Err(EngineError::InvalidTransition { .. })
        ));
        assert!(matches!(
            process_guard(&request("cancelled", RefundMethod::Refund, false)),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn reprocessing_fails_with_already_processed() {
        assert!(matches!(
            process_guard(&request("processed", RefundMethod::Exchange, true)),
            Err(EngineError::AlreadyProcessed(_))
        ));
    }

    #[test]
    fn exchange_flag_flips_exactly_once() {
        assert!(exchange_guard(&request("validated", RefundMethod::Exchange, false)).is_ok());
        assert!(matches!(
            exchange_guard(&request("validated", RefundMethod::Exchange, true)),
            Err(EngineError::AlreadyProcessed(_))
        ));
    }

    #[test]
    fn pending_checks_block_processing() {
        let a = line(Uuid::new_v4());
        let b = line(Uuid::new_v4());
        let checks = vec![check(a.id, "inspected"), check(b.id, "pending")];
        let pending = uninspected_lines(&[a, b.clone()], &checks);
        assert_eq!(pending, vec![b.id]);
    }

    #[test]
    fn fully_inspected_return_has_no_pending_lines() {
        let a = line(Uuid::new_v4());
        let checks = vec![check(a.id, "inspected")];
        assert!(uninspected_lines(&[a], &checks).is_empty());
    }

    #[test]
    fn line_without_a_check_counts_as_pending() {
        let a = line(Uuid::new_v4());
        assert_eq!(uninspected_lines(std::slice::from_ref(&a), &[]), vec![a.id]);
    }
}
