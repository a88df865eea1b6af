use thiserror::Error;

use cinder_types::HexError;
use cinder_work::WorkError;

/// Everything that can go wrong between a client request and its
/// response. Each value becomes an error response for the originating
/// request only; nothing here ever takes a worker thread down.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{action} failed: missing {field} value")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },

    #[error("invalid hex value: {0}")]
    InvalidHex(#[from] HexError),

    #[error("invalid action field")]
    InvalidAction,

    #[error("no work device has been configured")]
    NoDevice,

    #[error("work request limit exceeded")]
    QueueFull,

    #[error("no jobs available")]
    NoJobsAvailable,

    #[error("no device available to run the job")]
    NoDeviceAvailable,

    #[error("hash not found in work queue")]
    NotFound,

    #[error("control requests are not allowed; this must be enabled in the server configuration")]
    ControlDisabled,

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Work(#[from] WorkError),

    #[error("{0}")]
    Other(String),
}
