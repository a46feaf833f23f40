pub mod audit;
pub mod domain;
mod ingestion_worker;
pub mod mqtt;

pub use ingestion_worker::*;
