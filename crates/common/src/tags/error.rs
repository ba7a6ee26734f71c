use thiserror::Error;

pub type TagStoreResult<T> = Result<T, TagStoreError>;

#[derive(Error, Debug)]
pub enum TagStoreError {
    #[error("tag store backend error: {0}")]
    Backend(#[source] anyhow::Error),

    #[error("failed to encode tag '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode tag '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
