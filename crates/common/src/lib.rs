pub mod garde;
pub mod nats;
pub mod tags;
pub mod telemetry;

pub use tags::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use nats::MockJetStreamConsumer;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockPullConsumer;
#[cfg(any(test, feature = "testing"))]
pub use tags::MockConnectionMonitor;
#[cfg(any(test, feature = "testing"))]
pub use tags::MockTagStore;
