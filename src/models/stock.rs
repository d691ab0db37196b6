use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Internal,
    Quarantine,
    Scrap,
    /// Virtual counterpart location returned units come from (and go back
    /// to when a validated return is cancelled before inspection).
    Customer,
}

impl LocationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LocationKind::Internal => "internal",
            LocationKind::Quarantine => "quarantine",
            LocationKind::Scrap => "scrap",
            LocationKind::Customer => "customer",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockLocation {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub kind: String,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct StockLevel {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub quantity_on_hand: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveState {
    Draft,
    Done,
    Cancelled,
}

impl MoveState {
    pub fn as_str(self) -> &'static str {
        match self {
            MoveState::Draft => "draft",
            MoveState::Done => "done",
            MoveState::Cancelled => "cancelled",
        }
    }
}

/// A directed transfer of units between two locations. Immutable once
/// `done`; survives archival of the return that triggered it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub quantity: i32,
    pub state: String,
    pub reference: Option<String>,
    pub moved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub done_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapStatus {
    Pending,
    Received,
}

impl ScrapStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScrapStatus::Pending => "pending",
            ScrapStatus::Received => "received",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ScrapStatus::Pending),
            "received" => Some(ScrapStatus::Received),
            _ => None,
        }
    }
}

/// Units removed from sellable inventory. Advanced to `received` only by an
/// explicit confirmation at the disposal point, outside the return flow.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScrapItem {
    pub id: Uuid,
    pub name: String,
    pub product_id: Uuid,
    pub source_location_id: Uuid,
    pub quantity: i32,
    pub reason: String,
    pub reference: Option<String>,
    pub status: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub received_by: Option<Uuid>,
    pub received_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}
