pub mod order;
pub mod quality;
pub mod returns;
pub mod stock;

pub use order::{Order, Product, SoldLine};
pub use quality::{Disposition, QualityCheck, QualityState};
pub use returns::{RefundMethod, ReturnLine, ReturnRequest, ReturnState};
pub use stock::{
    LocationKind, MoveState, ScrapItem, ScrapStatus, StockLevel, StockLocation, StockMovement,
};

use uuid::Uuid;

/// Short human-readable record code, e.g. `RET-9F2C41AB`.
pub fn record_code(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, hex[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::record_code;

    #[test]
    fn record_codes_carry_their_prefix() {
        let code = record_code("RET");
        assert!(code.starts_with("RET-"));
        assert_eq!(code.len(), 12);
        assert_ne!(record_code("RET"), record_code("RET"));
    }
}
