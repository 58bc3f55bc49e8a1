//! Error type shared across the automation crates.
//!
//! Only faults that stop a unit of work live here. The delivery-side
//! taxonomy is carried by richer types where it belongs: a transport
//! failure or dead target is a `SendError` (paddock-channels), a rate
//! limit is an `Admission::Denied` deferral, and exhausted attempts are a
//! queue-state transition — none of those abort anything.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaddockError>;

#[derive(Debug, Error)]
pub enum PaddockError {
    #[error("store: {0}")]
    Store(String),

    /// A batch flush failed; fatal for the current definition only.
    #[error("batch write: {0}")]
    BatchWrite(String),

    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}
