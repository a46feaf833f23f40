mod attribute_resolver;
pub mod calibration;
pub mod field;
mod ingestion_service;
mod payload_normalizer;
mod persistence_mapper;
mod reading_resolver;
mod topic;

pub use attribute_resolver::*;
pub use ingestion_service::*;
pub use payload_normalizer::*;
pub use persistence_mapper::*;
pub use reading_resolver::*;
pub use topic::*;
