mod ttn_http_client;

pub use ttn_http_client::*;
