use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityState {
    Pending,
    Inspected,
}

impl QualityState {
    pub fn as_str(self) -> &'static str {
        match self {
            QualityState::Pending => "pending",
            QualityState::Inspected => "inspected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QualityState::Pending),
            "inspected" => Some(QualityState::Inspected),
            _ => None,
        }
    }
}

/// Inspection outcome for returned units. Restock is the only path that
/// puts units back into sellable stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Restock,
    Scrap,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Restock => "restock",
            Disposition::Scrap => "scrap",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "restock" => Some(Disposition::Restock),
            "scrap" => Some(Disposition::Scrap),
            _ => None,
        }
    }
}

/// One inspection per return line (1:1). `quantity` mirrors the line's
/// quantity at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QualityCheck {
    pub id: Uuid,
    pub name: String,
    pub return_line_id: Uuid,
    pub quantity: i32,
    pub quality_state: String,
    pub disposition: Option<String>,
    pub notes: Option<String>,
    pub checked_by: Option<Uuid>,
    pub check_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl QualityCheck {
    pub fn is_inspected(&self) -> bool {
        QualityState::parse(&self.quality_state) == Some(QualityState::Inspected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_round_trips_through_text() {
        assert_eq!(Disposition::parse("restock"), Some(Disposition::Restock));
        assert_eq!(Disposition::parse("scrap"), Some(Disposition::Scrap));
        assert_eq!(Disposition::parse("refurbish"), None);
        assert_eq!(Disposition::Scrap.as_str(), "scrap");
    }

    #[test]
    fn pending_check_is_not_inspected() {
        let check = QualityCheck {
            id: Uuid::new_v4(),
            name: "QC-0001".to_string(),
            return_line_id: Uuid::new_v4(),
            quantity: 2,
            quality_state: "pending".to_string(),
            disposition: None,
            notes: None,
            checked_by: None,
            check_date: None,
            created_at: Utc::now(),
        };
        assert!(!check.is_inspected());
    }
}
