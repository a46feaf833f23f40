mod client;
mod config;
mod device_summary_repository;
mod sensor_reading_repository;

pub use client::*;
pub use config::*;
pub use device_summary_repository::*;
pub use sensor_reading_repository::*;
