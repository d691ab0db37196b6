use uuid::Uuid;

use crate::{
    database::Database,
    error::EngineError,
    models::{Disposition, QualityCheck, QualityState, ReturnLine},
};

use super::stock;

/// Drive a pending quality check to its terminal disposition.
///
/// The check row is locked for the duration, the stock consequence is
/// applied, and the check is marked inspected — all in one transaction, so
/// an inspected check without its stock movement (or the reverse) cannot
/// exist.
pub async fn inspect(
    db: &Database,
    return_line_id: Uuid,
    disposition: Disposition,
    inspector: Option<Uuid>,
    notes: Option<String>,
) -> Result<QualityCheck, EngineError> {
    let mut tx = db.begin().await?;

    let check = sqlx::query_as::<_, QualityCheck>(
        "SELECT * FROM quality_checks WHERE return_line_id = $1 FOR UPDATE",
    )
    .bind(return_line_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(EngineError::NotFound {
        entity: "quality check for return line",
        id: return_line_id,
    })?;

    if check.is_inspected() {
        return Err(EngineError::AlreadyInspected(check.id));
    }

    // Row-lock the line so the guard below re-evaluates against the
    // committed row: a concurrent cancel either finishes first (and the
    // guard rejects) or waits for this transaction.
    let line =
        sqlx::query_as::<_, ReturnLine>("SELECT * FROM pos_return_lines WHERE id = $1 FOR UPDATE")
            .bind(return_line_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "return line",
                id: return_line_id,
            })?;

    inspectable(&line)?;

    stock::apply_disposition(&mut tx, &line, disposition, inspector, &check.name).await?;

    let check = sqlx::query_as::<_, QualityCheck>(
        "UPDATE quality_checks \
         SET quality_state = $1, disposition = $2, checked_by = $3, check_date = now(), \
             notes = COALESCE($4, notes) \
         WHERE id = $5 RETURNING *",
    )
    .bind(QualityState::Inspected.as_str())
    .bind(disposition.as_str())
    .bind(inspector)
    .bind(notes)
    .bind(check.id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE pos_return_lines SET state = 'inspected' WHERE id = $1")
        .bind(return_line_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    log::info!(
        "quality check {} inspected: line {} -> {}",
        check.name,
        return_line_id,
        disposition.as_str()
    );
    Ok(check)
}

/// A pending check can outlive its return (cancellation keeps checks for
/// audit); only lines of a live validated return may be inspected.
fn inspectable(line: &ReturnLine) -> Result<(), EngineError> {
    if line.state == "validated" {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            entity: "return line",
            id: line.id,
            state: line.state.clone(),
            operation: "inspect",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(state: &str) -> ReturnLine {
        ReturnLine {
            id: Uuid::new_v4(),
            return_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: None,
            original_order_line_id: Uuid::new_v4(),
            quantity: 1,
            unit_price: None,
            subtotal: None,
            return_reason: None,
            state: state.to_string(),
        }
    }

    #[test]
    fn only_validated_lines_are_inspectable() {
        assert!(inspectable(&line("validated")).is_ok());
    }

    #[test]
    fn cancelled_line_is_rejected_despite_its_pending_check() {
        // Cancellation keeps the pending check around; inspecting it must
        // not move stock for a return that already handed its reservation
        // back.
        for state in ["draft", "cancelled", "processed", "inspected"] {
            assert!(matches!(
                inspectable(&line(state)),
                Err(EngineError::InvalidTransition { .. })
            ));
        }
    }
}
