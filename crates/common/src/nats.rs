mod client;
mod consumer;
mod traits;

pub use client::*;
pub use consumer::*;
pub use traits::*;
