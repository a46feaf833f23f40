pub mod domain;
pub mod postgres;
pub mod retry;
pub mod telemetry;

pub use domain::*;
pub use retry::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockAuditSink;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDeviceSummaryRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockSensorReadingRepository;
