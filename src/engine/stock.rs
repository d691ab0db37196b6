use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    database::Database,
    error::EngineError,
    models::{
        record_code, Disposition, LocationKind, MoveState, Product, ReturnLine, ScrapItem,
        ScrapStatus, StockLevel, StockLocation, StockMovement,
    },
};

/// Where a disposition sends the units sitting in quarantine, and whether
/// it leaves a scrap record behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePlan {
    pub destination: LocationKind,
    pub creates_scrap: bool,
}

/// Intake leg of the return flow: validated units physically enter stock
/// at quarantine, coming from the customer counterpart location. Without
/// this credit every later disposition would drain quarantine below zero.
pub fn intake_route() -> (LocationKind, LocationKind) {
    (LocationKind::Customer, LocationKind::Quarantine)
}

pub fn route(disposition: Disposition) -> RoutePlan {
    match disposition {
        Disposition::Restock => RoutePlan {
            destination: LocationKind::Internal,
            creates_scrap: false,
        },
        Disposition::Scrap => RoutePlan {
            destination: LocationKind::Scrap,
            creates_scrap: true,
        },
    }
}

/// The singleton location of a given kind (quarantine, scrap).
pub async fn location_by_kind(
    tx: &mut Transaction<'_, Postgres>,
    kind: LocationKind,
) -> Result<StockLocation, EngineError> {
    sqlx::query_as::<_, StockLocation>(
        "SELECT * FROM stock_locations WHERE kind = $1 AND is_active = true LIMIT 1",
    )
    .bind(kind.as_str())
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| EngineError::UnknownLocation(kind.as_str().to_string()))
}

/// The product's default sellable location, the only destination that
/// counts as restocking.
pub async fn default_sellable_location(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
) -> Result<StockLocation, EngineError> {
    sqlx::query_as::<_, StockLocation>(
        "SELECT l.* FROM stock_locations l \
         JOIN products p ON p.default_location_id = l.id \
         WHERE p.id = $1 AND l.is_active = true AND l.kind = 'internal'",
    )
    .bind(product_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| EngineError::UnknownLocation(format!("sellable location of product {}", product_id)))
}

/// Transfer `quantity` units between two locations: a draft stock move is
/// recorded, both on-hand counters are adjusted with single-row atomic
/// increments, and the move is marked done. On-hand counts change only at
/// the done transition, inside the caller's transaction.
pub async fn move_stock(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    quantity: i32,
    from: &StockLocation,
    to: &StockLocation,
    reference: Option<&str>,
    moved_by: Option<Uuid>,
) -> Result<StockMovement, EngineError> {
    if quantity <= 0 {
        return Err(EngineError::InvalidQuantity(quantity));
    }

    let move_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO stock_moves \
         (id, product_id, from_location_id, to_location_id, quantity, state, reference, moved_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(move_id)
    .bind(product_id)
    .bind(from.id)
    .bind(to.id)
    .bind(quantity)
    .bind(MoveState::Draft.as_str())
    .bind(reference)
    .bind(moved_by)
    .execute(&mut **tx)
    .await?;

    adjust_level(tx, product_id, from.id, -quantity).await?;
    adjust_level(tx, product_id, to.id, quantity).await?;

    let movement = sqlx::query_as::<_, StockMovement>(
        "UPDATE stock_moves SET state = $1, done_at = now() WHERE id = $2 RETURNING *",
    )
    .bind(MoveState::Done.as_str())
    .bind(move_id)
    .fetch_one(&mut **tx)
    .await?;

    log::info!(
        "stock move {} done: {} x product {} from {} to {}",
        movement.id,
        quantity,
        product_id,
        from.code,
        to.code
    );
    Ok(movement)
}

async fn adjust_level(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    location_id: Uuid,
    delta: i32,
) -> Result<(), EngineError> {
    sqlx::query(
        "INSERT INTO stock_levels (product_id, location_id, quantity_on_hand) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (product_id, location_id) \
         DO UPDATE SET quantity_on_hand = stock_levels.quantity_on_hand + EXCLUDED.quantity_on_hand, \
                       updated_at = now()",
    )
    .bind(product_id)
    .bind(location_id)
    .bind(delta)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Execute the stock consequence of an inspection: restocked units move
/// from quarantine back to the product's sellable location; scrapped units
/// move to the scrap location and leave a pending ScrapItem behind.
pub async fn apply_disposition(
    tx: &mut Transaction<'_, Postgres>,
    line: &ReturnLine,
    disposition: Disposition,
    actor: Option<Uuid>,
    reference: &str,
) -> Result<StockMovement, EngineError> {
    let quarantine = location_by_kind(tx, LocationKind::Quarantine).await?;
    let plan = route(disposition);
    let destination = match plan.destination {
        LocationKind::Internal => default_sellable_location(tx, line.product_id).await?,
        kind => location_by_kind(tx, kind).await?,
    };

    let movement = move_stock(
        tx,
        line.product_id,
        line.quantity,
        &quarantine,
        &destination,
        Some(reference),
        actor,
    )
    .await?;

    if plan.creates_scrap {
        sqlx::query(
            "INSERT INTO scrap_items \
             (id, name, product_id, source_location_id, quantity, reason, reference, status, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(Uuid::new_v4())
        .bind(record_code("SCR"))
        .bind(line.product_id)
        .bind(quarantine.id)
        .bind(line.quantity)
        .bind(line.return_reason.as_deref().unwrap_or("return inspection"))
        .bind(reference)
        .bind(ScrapStatus::Pending.as_str())
        .bind(actor)
        .execute(&mut **tx)
        .await?;
    }

    Ok(movement)
}

/// Confirm physical receipt of scrapped units at the disposal point.
/// Separate from the return flow; pending items only.
pub async fn receive_scrap(
    db: &Database,
    scrap_item_id: Uuid,
    received_by: Option<Uuid>,
) -> Result<ScrapItem, EngineError> {
    let mut tx = db.begin().await?;

    let item = sqlx::query_as::<_, ScrapItem>("SELECT * FROM scrap_items WHERE id = $1 FOR UPDATE")
        .bind(scrap_item_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "scrap item",
            id: scrap_item_id,
        })?;

    if ScrapStatus::parse(&item.status) != Some(ScrapStatus::Pending) {
        return Err(EngineError::InvalidTransition {
            entity: "scrap item",
            id: scrap_item_id,
            state: item.status,
            operation: "receive",
        });
    }

    let item = sqlx::query_as::<_, ScrapItem>(
        "UPDATE scrap_items SET status = $1, received_by = $2, received_at = now() \
         WHERE id = $3 RETURNING *",
    )
    .bind(ScrapStatus::Received.as_str())
    .bind(received_by)
    .bind(scrap_item_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(item)
}

/// Sellable on-hand for a product: the sum across internal locations.
pub async fn sellable_quantity(db: &Database, product_id: Uuid) -> Result<i64, EngineError> {
    let _product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(db)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "product",
            id: product_id,
        })?;

    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(sl.quantity_on_hand), 0) FROM stock_levels sl \
         JOIN stock_locations l ON l.id = sl.location_id \
         WHERE sl.product_id = $1 AND l.kind = 'internal' AND l.is_active = true",
    )
    .bind(product_id)
    .fetch_one(db)
    .await?;
    Ok(total)
}

/// Per-location on-hand counts for a product.
pub async fn levels_for_product(
    db: &Database,
    product_id: Uuid,
) -> Result<Vec<StockLevel>, EngineError> {
    let levels = sqlx::query_as::<_, StockLevel>(
        "SELECT * FROM stock_levels WHERE product_id = $1 ORDER BY location_id",
    )
    .bind(product_id)
    .fetch_all(db)
    .await?;
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validated_units_enter_stock_at_quarantine() {
        let (source, destination) = intake_route();
        assert_eq!(source, LocationKind::Customer);
        assert_eq!(destination, LocationKind::Quarantine);
    }

    #[test]
    fn restock_routes_to_sellable_stock_without_scrap() {
        let plan = route(Disposition::Restock);
        assert_eq!(plan.destination, LocationKind::Internal);
        assert!(!plan.creates_scrap);
    }

    #[test]
    fn scrap_routes_to_scrap_location_and_records_scrap() {
        let plan = route(Disposition::Scrap);
        assert_eq!(plan.destination, LocationKind::Scrap);
        assert!(plan.creates_scrap);
    }
}
