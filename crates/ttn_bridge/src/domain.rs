mod context;
mod delivery;
mod device_map;
mod downlink;
mod downlink_service;
mod error;
mod error_recorder;
mod settings;
mod sleeper;
mod stats;
mod tag_updater;
mod transport;
mod uplink;
mod uplink_service;

pub use context::*;
pub use delivery::*;
pub use device_map::*;
pub use downlink::*;
pub use downlink_service::*;
pub use error::*;
pub use error_recorder::*;
pub use settings::*;
pub use sleeper::*;
pub use stats::*;
pub use tag_updater::*;
pub use transport::*;
pub use uplink::*;
pub use uplink_service::*;
