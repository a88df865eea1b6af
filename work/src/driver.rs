//! The capability a compute device must provide.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cinder_types::{U128, U256};

use crate::error::WorkError;

/// Cooperative cancellation flag, shared between a search and its owner.
///
/// The search polls this on a coarse interval; setting it does not
/// interrupt a trial in progress.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// How a search ended, short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveOutcome {
    /// A nonce satisfied the threshold; `difficulty` is what it achieved.
    Found { nonce: u64, difficulty: U128 },
    /// The iteration cap was reached; `nonce` is the last value tried,
    /// unverified.
    Exhausted { nonce: u64 },
}

/// A proof-of-work solver backing one compute device.
///
/// Implementations derive the comparison threshold from `difficulty`
/// themselves and must poll `cancel` often enough that cancellation takes
/// effect within a fraction of a second.
pub trait Driver: Send + Sync {
    fn solve(
        &self,
        root_hash: &U256,
        difficulty: U128,
        cancel: &CancelToken,
    ) -> Result<SolveOutcome, WorkError>;
}
