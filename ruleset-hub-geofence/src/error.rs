//! Geofence error types

use ruleset_hub_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeofenceError {
    #[error("No tokio runtime available to schedule notifications")]
    NoRuntime,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Push transport error: {0}")]
    Transport(String),
}
