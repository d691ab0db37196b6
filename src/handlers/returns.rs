use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    database::Database,
    engine::{ledger, orchestrator, quality},
    error::EngineError,
    models::{Disposition, QualityCheck, ReturnLine, ReturnRequest},
};

#[derive(Serialize)]
pub struct ReturnResponse {
    pub id: Uuid,
    pub name: String,
    pub original_order_id: Uuid,
    pub state: String,
    pub refund_method: String,
    pub exchange_processed: bool,
    pub total_amount: Decimal,
    pub refund_amount: Decimal,
    pub processed_by: Option<Uuid>,
    pub return_date: DateTime<Utc>,
}

impl From<ReturnRequest> for ReturnResponse {
    fn from(ret: ReturnRequest) -> Self {
        Self {
            id: ret.id,
            name: ret.name,
            original_order_id: ret.original_order_id,
            state: ret.state,
            refund_method: ret.refund_method,
            exchange_processed: ret.exchange_processed,
            total_amount: ret.total_amount,
            refund_amount: ret.refund_amount,
            processed_by: ret.processed_by,
            return_date: ret.return_date,
        }
    }
}

#[derive(Serialize)]
pub struct ReturnDetailResponse {
    #[serde(flatten)]
    pub summary: ReturnResponse,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<ReturnLine>,
    pub quality_checks: Vec<QualityCheck>,
}

#[derive(Serialize)]
pub struct TotalsResponse {
    pub total_amount: Decimal,
    pub refund_amount: Decimal,
}

pub async fn create_return(
    State(db): State<Database>,
    Json(req): Json<orchestrator::NewReturn>,
) -> Result<Json<ReturnResponse>, EngineError> {
    let ret = orchestrator::create_return(&db, req).await?;
    Ok(Json(ret.into()))
}

pub async fn list_returns(
    State(db): State<Database>,
) -> Result<Json<Vec<ReturnResponse>>, EngineError> {
    let returns =
        sqlx::query_as::<_, ReturnRequest>("SELECT * FROM pos_returns ORDER BY created_at DESC")
            .fetch_all(&db)
            .await?
            .into_iter()
            .map(ReturnResponse::from)
            .collect();
    Ok(Json(returns))
}

pub async fn get_return(
    State(db): State<Database>,
    Path(return_id): Path<Uuid>,
) -> Result<Json<ReturnDetailResponse>, EngineError> {
    let ret = orchestrator::get_return(&db, return_id).await?;
    let lines = orchestrator::get_return_lines(&db, return_id).await?;
    let quality_checks = sqlx::query_as::<_, QualityCheck>(
        "SELECT qc.* FROM quality_checks qc \
         JOIN pos_return_lines l ON l.id = qc.return_line_id \
         WHERE l.return_id = $1",
    )
    .bind(return_id)
    .fetch_all(&db)
    .await?;

    let customer_name = ret.customer_name.clone();
    let customer_phone = ret.customer_phone.clone();
    let notes = ret.notes.clone();
    Ok(Json(ReturnDetailResponse {
        summary: ret.into(),
        customer_name,
        customer_phone,
        notes,
        lines,
        quality_checks,
    }))
}

pub async fn validate_return(
    State(db): State<Database>,
    Path(return_id): Path<Uuid>,
) -> Result<Json<ReturnResponse>, EngineError> {
    let ret = orchestrator::validate_return(&db, return_id).await?;
    Ok(Json(ret.into()))
}

#[derive(Deserialize)]
pub struct ProcessRequest {
    pub processed_by: Option<Uuid>,
}

pub async fn process_return(
    State(db): State<Database>,
    Path(return_id): Path<Uuid>,
    body: Option<Json<ProcessRequest>>,
) -> Result<Json<ReturnResponse>, EngineError> {
    let actor = body.and_then(|Json(req)| req.processed_by);
    let ret = orchestrator::process_return(&db, return_id, actor).await?;
    Ok(Json(ret.into()))
}

pub async fn cancel_return(
    State(db): State<Database>,
    Path(return_id): Path<Uuid>,
) -> Result<Json<ReturnResponse>, EngineError> {
    let ret = orchestrator::cancel_return(&db, return_id).await?;
    Ok(Json(ret.into()))
}

pub async fn get_return_totals(
    State(db): State<Database>,
    Path(return_id): Path<Uuid>,
) -> Result<Json<TotalsResponse>, EngineError> {
    let (total_amount, refund_amount) = orchestrator::get_return_totals(&db, return_id).await?;
    Ok(Json(TotalsResponse {
        total_amount,
        refund_amount,
    }))
}

#[derive(Deserialize)]
pub struct AddLineRequest {
    pub sold_line_id: Uuid,
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
    pub return_reason: Option<String>,
}

pub async fn add_line(
    State(db): State<Database>,
    Path(return_id): Path<Uuid>,
    Json(req): Json<AddLineRequest>,
) -> Result<Json<ReturnLine>, EngineError> {
    let line = orchestrator::add_line(
        &db,
        return_id,
        orchestrator::NewReturnLine {
            sold_line_id: req.sold_line_id,
            quantity: req.quantity,
            unit_price: req.unit_price,
            return_reason: req.return_reason,
        },
    )
    .await?;
    Ok(Json(line))
}

pub async fn remove_line(
    State(db): State<Database>,
    Path((return_id, line_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>, EngineError> {
    orchestrator::remove_line(&db, return_id, line_id).await?;
    Ok(Json(serde_json::json!({ "removed": line_id })))
}

#[derive(Serialize)]
pub struct ReturnableResponse {
    pub sold_line_id: Uuid,
    pub returnable_quantity: i32,
}

pub async fn sold_line_returnable(
    State(db): State<Database>,
    Path(sold_line_id): Path<Uuid>,
) -> Result<Json<ReturnableResponse>, EngineError> {
    let returnable_quantity = ledger::returnable(&db, sold_line_id).await?;
    Ok(Json(ReturnableResponse {
        sold_line_id,
        returnable_quantity,
    }))
}

#[derive(Deserialize)]
pub struct InspectRequest {
    pub disposition: Disposition,
    pub inspector_id: Option<Uuid>,
    pub notes: Option<String>,
}

pub async fn inspect_line(
    State(db): State<Database>,
    Path(return_line_id): Path<Uuid>,
    Json(req): Json<InspectRequest>,
) -> Result<Json<QualityCheck>, EngineError> {
    let check = quality::inspect(
        &db,
        return_line_id,
        req.disposition,
        req.inspector_id,
        req.notes,
    )
    .await?;
    Ok(Json(check))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_request_actor_is_optional() {
        let req: ProcessRequest = serde_json::from_str("{}").unwrap();
        assert!(req.processed_by.is_none());

        let actor = Uuid::new_v4();
        let json = format!(r#"{{"processed_by":"{}"}}"#, actor);
        let req: ProcessRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req.processed_by, Some(actor));
    }
}
