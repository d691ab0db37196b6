use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use uuid::Uuid;

/// Error taxonomy of the return engine. Validation errors are
/// caller-correctable and map to 422; state errors mean an operation was
/// invoked out of sequence and map to 409. Every message names the
/// offending entity and the violated invariant so the calling layer can
/// present it verbatim.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("insufficient returnable quantity: {0}")]
    InsufficientReturnableQuantity(String),

    #[error("invalid quantity {0}: must be a positive number of units")]
    InvalidQuantity(i32),

    #[error("no active stock location registered for {0}")]
    UnknownLocation(String),

    #[error(
        "releasing {requested} units of sold line {sold_line_id} would drive its \
         returned quantity ({returned}) negative"
    )]
    OverRelease {
        sold_line_id: Uuid,
        requested: i32,
        returned: i32,
    },

    #[error("sold line {sold_line_id} does not belong to order {order_id}")]
    OrderMismatch { sold_line_id: Uuid, order_id: Uuid },

    #[error("return {0} has no lines to validate")]
    EmptyReturn(Uuid),

    #[error("quality check {0} is already inspected")]
    AlreadyInspected(Uuid),

    #[error("return {0} is already processed")]
    AlreadyProcessed(Uuid),

    #[error("return {return_id} has uninspected lines: {pending}")]
    PendingInspection { return_id: Uuid, pending: String },

    #[error("{entity} {id} is {state}: cannot {operation}")]
    InvalidTransition {
        entity: &'static str,
        id: Uuid,
        state: String,
        operation: &'static str,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::InsufficientReturnableQuantity(_)
            | EngineError::InvalidQuantity(_)
            | EngineError::UnknownLocation(_)
            | EngineError::OrderMismatch { .. }
            | EngineError::EmptyReturn(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::OverRelease { .. }
            | EngineError::AlreadyInspected(_)
            | EngineError::AlreadyProcessed(_)
            | EngineError::PendingInspection { .. }
            | EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
            EngineError::Database(e) => {
                log::error!("database error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            EngineError::Internal(msg) => {
                log::error!("{}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_entity_and_invariant() {
        let id = Uuid::nil();
        let err = EngineError::OverRelease {
            sold_line_id: id,
            requested: 3,
            returned: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains(&id.to_string()));
        assert!(msg.contains("3"));
        assert!(msg.contains("negative"));
    }
}
