mod aliases;
mod reference;

use thiserror::Error;

pub use aliases::AliasMap;
pub use reference::{AudioReference, AudioSource, AUDIO_MIME, OBJECT_STORE_SCHEME};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioFetchError {
    #[error("audio object not found: gs://{bucket}/{key} (canonical {canonical})")]
    NotFound {
        bucket: String,
        key: String,
        canonical: String,
    },
    #[error("object storage request failed: {0}")]
    Transport(String),
}
