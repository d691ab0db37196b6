use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{database::Database, error::EngineError, models::SoldLine};

/// Atomically claim `quantity` returnable units of a sold line.
///
/// The guarded single-statement update is the compare-and-increment that
/// keeps concurrent reservations on the same line from jointly exceeding
/// the sold quantity: exactly one of two racing reservations for the last
/// unit can match the WHERE clause.
pub async fn reserve(
    tx: &mut Transaction<'_, Postgres>,
    sold_line_id: Uuid,
    quantity: i32,
) -> Result<(), EngineError> {
    if quantity <= 0 {
        return Err(EngineError::InvalidQuantity(quantity));
    }

    let updated = sqlx::query(
        "UPDATE pos_order_lines \
         SET returned_quantity = returned_quantity + $1 \
         WHERE id = $2 AND returned_quantity + $1 <= quantity",
    )
    .bind(quantity)
    .bind(sold_line_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if updated == 1 {
        return Ok(());
    }

    // Zero rows: either the line is missing or the ask exceeds what remains.
    let line = sqlx::query_as::<_, SoldLine>("SELECT * FROM pos_order_lines WHERE id = $1")
        .bind(sold_line_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "sold line",
            id: sold_line_id,
        })?;

    Err(EngineError::InsufficientReturnableQuantity(format!(
        "sold line {} requests {} units but only {} remain returnable",
        sold_line_id,
        quantity,
        line.returnable_quantity()
    )))
}

/// Reverse a reservation, used when a return is cancelled before
/// processing. The returned ledger is never driven negative.
pub async fn release(
    tx: &mut Transaction<'_, Postgres>,
    sold_line_id: Uuid,
    quantity: i32,
) -> Result<(), EngineError> {
    if quantity <= 0 {
        return Err(EngineError::InvalidQuantity(quantity));
    }

    let updated = sqlx::query(
        "UPDATE pos_order_lines \
         SET returned_quantity = returned_quantity - $1 \
         WHERE id = $2 AND returned_quantity - $1 >= 0",
    )
    .bind(quantity)
    .bind(sold_line_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if updated == 1 {
        return Ok(());
    }

    let line = sqlx::query_as::<_, SoldLine>("SELECT * FROM pos_order_lines WHERE id = $1")
        .bind(sold_line_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "sold line",
            id: sold_line_id,
        })?;

    Err(EngineError::OverRelease {
        sold_line_id,
        requested: quantity,
        returned: line.returned_quantity,
    })
}

/// Units of a sold line still eligible for return. Pure read.
pub async fn returnable(db: &Database, sold_line_id: Uuid) -> Result<i32, EngineError> {
    let line = sqlx::query_as::<_, SoldLine>("SELECT * FROM pos_order_lines WHERE id = $1")
        .bind(sold_line_id)
        .fetch_optional(db)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "sold line",
            id: sold_line_id,
        })?;
    Ok(line.returnable_quantity())
}
