pub mod config;
pub mod dashboard;
pub mod errors;
pub mod inventory;
pub mod logging;
