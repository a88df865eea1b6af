//! The unit of work tracked by the scheduler.

use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use cinder_types::{U128, U256};

/// What a client asked for.
#[derive(Clone, Debug)]
pub struct JobRequest {
    pub root_hash: U256,
    /// Normalized difficulty: when the client supplied a positive
    /// multiplier this is already derived from the base difficulty.
    pub difficulty: U128,
    pub multiplier: f64,
}

/// What the search produced. Zeroed until the job completes.
#[derive(Clone, Debug)]
pub struct JobResult {
    /// The nonce, zero-extended; only the low 8 bytes are meaningful.
    pub work: U128,
    /// The difficulty the nonce actually achieved.
    pub difficulty: U128,
    pub multiplier: f64,
}

impl Default for JobResult {
    fn default() -> Self {
        Self {
            work: U128::ZERO,
            difficulty: U128::ZERO,
            multiplier: 0.0,
        }
    }
}

/// A queued, active or completed work request.
///
/// Jobs are value types: they are copied between the scheduler's
/// collections rather than shared, so no job ever lives in two of them.
#[derive(Clone, Debug)]
pub struct Job {
    id: u32,
    priority: u32,
    pub request: JobRequest,
    pub result: JobResult,
    start_time: Option<SystemTime>,
    end_time: Option<SystemTime>,
}

impl Job {
    /// Ids come from the scheduler's dispenser; they start at 1 and are
    /// never reused within the process.
    pub(crate) fn new(id: u32, priority: u32, request: JobRequest) -> Self {
        Self {
            id,
            priority,
            request,
            result: JobResult::default(),
            start_time: None,
            end_time: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn start(&mut self) {
        self.start_time = Some(SystemTime::now());
    }

    pub fn stop(&mut self) {
        self.end_time = Some(SystemTime::now());
    }

    /// Wall-clock duration in milliseconds, 0 while either end is unset.
    pub fn duration_ms(&self) -> u64 {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end
                .duration_since(start)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Start instant as Unix milliseconds, 0 when unset.
    pub fn start_ms(&self) -> u64 {
        unix_ms(self.start_time)
    }

    /// End instant as Unix milliseconds, 0 when unset.
    pub fn end_ms(&self) -> u64 {
        unix_ms(self.end_time)
    }
}

fn unix_ms(instant: Option<SystemTime>) -> u64 {
    instant
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.id == other.id
    }
}

impl Eq for Job {}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority dequeues first; within a priority class, lower
        // id (earlier submission) wins.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
