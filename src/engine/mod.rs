pub mod finance;
pub mod ledger;
pub mod orchestrator;
pub mod quality;
pub mod stock;
