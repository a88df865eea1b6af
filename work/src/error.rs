use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkError {
    #[error("work generation cancelled")]
    Cancelled,

    #[error("driver failure: {0}")]
    Driver(String),
}
