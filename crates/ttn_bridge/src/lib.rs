pub mod domain;
pub mod nats;
pub mod schedule;
pub mod ttn;
pub mod ttn_bridge;

pub use domain::*;
pub use nats::*;
pub use schedule::*;
pub use ttn::*;
pub use ttn_bridge::*;
