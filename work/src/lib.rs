//! Blake2b proof-of-work search engine.
//!
//! A nonce is valid for a root hash when the byte-reversed low word of
//! `Blake2b-512(nonce_le ‖ root)` falls below the threshold derived from
//! the requested difficulty. This crate owns the difficulty/threshold
//! arithmetic, the search loop, and nonce validation; devices and job
//! scheduling live in `cinder-server`.

pub mod difficulty;
pub mod driver;
pub mod error;
pub mod generator;
pub mod gpu;
pub mod validator;

pub use difficulty::{achieved_difficulty, derive_threshold, from_multiplier, to_multiplier};
pub use driver::{CancelToken, Driver, SolveOutcome};
pub use error::WorkError;
pub use generator::CpuDriver;
pub use gpu::GpuDriver;
pub use validator::{validate_work, work_value};
