//! The CPU search loop.

use blake2::{Blake2b512, Digest};
use rand::Rng;

use cinder_types::{U128, U256};

use crate::difficulty::{achieved_difficulty, derive_threshold};
use crate::driver::{CancelToken, Driver, SolveOutcome};
use crate::error::WorkError;
use crate::validator::work_value;

/// Iteration cap for a single search. Finding a nonce at the live base
/// difficulty takes on the order of billions of trials.
pub const DEFAULT_MAX_ITERATIONS: u64 = 10_000_000_000;

/// Reseed the nonce and log progress every this many trials.
const RESEED_INTERVAL: u64 = 100_000_000;

/// Poll the cancellation token every this many trials.
const CANCEL_POLL_INTERVAL: u64 = 1 << 16;

/// Proof-of-work search on the host CPU.
pub struct CpuDriver {
    max_iterations: u64,
}

impl CpuDriver {
    pub fn new() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Construct with a custom iteration cap (useful in tests and benches,
    /// where exhausting the default cap would take hours).
    pub fn with_max_iterations(max_iterations: u64) -> Self {
        Self { max_iterations }
    }
}

impl Default for CpuDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for CpuDriver {
    fn solve(
        &self,
        root_hash: &U256,
        difficulty: U128,
        cancel: &CancelToken,
    ) -> Result<SolveOutcome, WorkError> {
        let threshold = derive_threshold(difficulty);
        let mut rng = rand::thread_rng();

        // 40-byte input: work nonce (8 bytes, little-endian) then root hash.
        let mut input = [0u8; 40];
        input[8..40].copy_from_slice(root_hash.as_bytes());

        let mut work: u64 = rng.gen();
        let mut iterations: u64 = 0;

        while iterations < self.max_iterations {
            if iterations % CANCEL_POLL_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(WorkError::Cancelled);
            }

            input[0..8].copy_from_slice(&work.to_le_bytes());
            let digest = Blake2b512::digest(input);
            let mut low = [0u8; 8];
            low.copy_from_slice(&digest[..8]);
            let hash_value = u64::from_le_bytes(low).swap_bytes();

            if hash_value < threshold {
                // Recompute through the shared recipe to report what the
                // nonce achieves, exactly as a validator will see it.
                let achieved = achieved_difficulty(work_value(root_hash, work));
                tracing::debug!(nonce = %format!("{work:016X}"), iterations, "valid nonce found");
                return Ok(SolveOutcome::Found {
                    nonce: work,
                    difficulty: U128::from_u64(achieved),
                });
            }

            work = work.wrapping_add(1);
            iterations += 1;

            if iterations % RESEED_INTERVAL == 0 {
                work = rng.gen();
                tracing::info!(iterations, "work generation still searching, reseeding nonce");
            }
        }

        tracing::warn!(
            iterations,
            "work generation exhausted its iteration cap without a valid nonce"
        );
        Ok(SolveOutcome::Exhausted { nonce: work })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::validate_work;

    #[test]
    fn difficulty_one_succeeds_immediately() {
        let driver = CpuDriver::new();
        let root = U256::ZERO;
        let outcome = driver
            .solve(&root, U128::new(1), &CancelToken::new())
            .unwrap();
        match outcome {
            SolveOutcome::Found { nonce, difficulty } => {
                assert!(validate_work(&root, nonce, U128::new(1)));
                assert!(difficulty.raw() >= 1);
            }
            SolveOutcome::Exhausted { .. } => panic!("difficulty 1 must not exhaust"),
        }
    }

    #[test]
    fn achieved_difficulty_meets_request() {
        let driver = CpuDriver::new();
        let root = U256::from_hex("cc").unwrap();
        let requested = U128::new(64);
        match driver.solve(&root, requested, &CancelToken::new()).unwrap() {
            SolveOutcome::Found { difficulty, .. } => {
                assert!(difficulty.raw() >= requested.raw());
            }
            SolveOutcome::Exhausted { .. } => panic!("easy difficulty must not exhaust"),
        }
    }

    #[test]
    fn zero_difficulty_exhausts() {
        // Threshold 0 is unsatisfiable; a small cap keeps the test fast.
        let driver = CpuDriver::with_max_iterations(1_000);
        let outcome = driver
            .solve(&U256::ZERO, U128::ZERO, &CancelToken::new())
            .unwrap();
        assert!(matches!(outcome, SolveOutcome::Exhausted { .. }));
    }

    #[test]
    fn pre_set_token_cancels_before_any_trial() {
        let driver = CpuDriver::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = driver.solve(&U256::ZERO, U128::ZERO, &cancel);
        assert_eq!(result, Err(WorkError::Cancelled));
    }
}
