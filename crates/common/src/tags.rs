//! Platform tag storage.
//!
//! Tags are named, JSON-valued entries owned by this process. Writing
//! `Value::Null` clears a tag; a cleared or never-written tag reads as `None`.

mod connection;
mod error;
mod in_memory_tag_store;
mod nats_kv_tag_store;
mod tag_store;

pub use connection::*;
pub use error::*;
pub use in_memory_tag_store::*;
pub use nats_kv_tag_store::*;
pub use tag_store::*;
