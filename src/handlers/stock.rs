use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    database::Database,
    engine::stock,
    error::EngineError,
    models::{ScrapItem, StockLevel},
};

#[derive(Deserialize)]
pub struct ReceiveScrapRequest {
    pub received_by: Option<Uuid>,
}

pub async fn receive_scrap(
    State(db): State<Database>,
    Path(scrap_item_id): Path<Uuid>,
    Json(req): Json<ReceiveScrapRequest>,
) -> Result<Json<ScrapItem>, EngineError> {
    let item = stock::receive_scrap(&db, scrap_item_id, req.received_by).await?;
    Ok(Json(item))
}

pub async fn list_scrap_items(
    State(db): State<Database>,
) -> Result<Json<Vec<ScrapItem>>, EngineError> {
    let items =
        sqlx::query_as::<_, ScrapItem>("SELECT * FROM scrap_items ORDER BY created_at DESC")
            .fetch_all(&db)
            .await?;
    Ok(Json(items))
}

#[derive(Serialize)]
pub struct SellableResponse {
    pub product_id: Uuid,
    pub sellable_quantity: i64,
}

pub async fn product_stock_levels(
    State(db): State<Database>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Vec<StockLevel>>, EngineError> {
    let levels = stock::levels_for_product(&db, product_id).await?;
    Ok(Json(levels))
}

pub async fn product_sellable(
    State(db): State<Database>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<SellableResponse>, EngineError> {
    let sellable_quantity = stock::sellable_quantity(&db, product_id).await?;
    Ok(Json(SellableResponse {
        product_id,
        sellable_quantity,
    }))
}
