pub mod returns;
pub mod stock;
