use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::{BASE_NONCE_CEILING, CEILING_SAFETY_FACTOR, PROGRESS_INTERVAL};
use crate::blockchain::block::now_timestamp;
use crate::blockchain::{Block, compute_hash, meets_proof_of_work};

/// Everything a nonce search hashes over except the nonce itself.
/// The timestamp is fixed once here and reused for every trial and for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningInput {
    pub index: u64,
    pub timestamp: String,
    pub data: String,
    pub prev_hash: String,
}

impl MiningInput {
    /// Work for the successor of `prev`, stamped with the current time.
    pub fn next_after(prev: &Block, data: impl Into<String>) -> Self {
        Self {
            index: prev.index + 1,
            timestamp: now_timestamp(),
            data: data.into(),
            prev_hash: prev.hash.clone(),
        }
    }

    pub fn hash_for(&self, nonce: u64) -> String {
        compute_hash(self.index, &self.timestamp, &self.data, &self.prev_hash, nonce)
    }

    /// The block this input produces with the given nonce.
    pub fn into_block(self, nonce: u64) -> Block {
        let hash = self.hash_for(nonce);
        Block {
            index: self.index,
            timestamp: self.timestamp,
            data: self.data,
            prev_hash: self.prev_hash,
            nonce,
            hash,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningPolicy {
    pub difficulty: u32,
    pub progress_interval: u64,
    /// Highest nonce tried (inclusive) before giving up.
    pub nonce_ceiling: u64,
}

impl MiningPolicy {
    pub fn for_difficulty(difficulty: u32) -> Self {
        let scaled = 16u64
            .checked_pow(difficulty)
            .and_then(|expected| expected.checked_mul(CEILING_SAFETY_FACTOR))
            .unwrap_or(u64::MAX);
        Self {
            difficulty,
            progress_interval: PROGRESS_INTERVAL,
            nonce_ceiling: scaled.max(BASE_NONCE_CEILING),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningProgress {
    pub attempts: u64,
    pub nonce: u64,
    pub hash: String,
    pub hash_rate: u64, // hashes per second
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinedNonce {
    pub nonce: u64,
    pub hash: String,
    pub attempts: u64,
    pub hash_rate: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(MinedNonce),
    TimedOut { attempts: u64, ceiling: u64 },
    Cancelled { attempts: u64 },
}

/// Brute-force `nonce = 0, 1, 2, ...` for the smallest nonce whose hash meets
/// `policy.difficulty`. `on_progress` runs every `policy.progress_interval`
/// attempts; returning `Break` abandons the search like a cancellation does.
pub fn search<F>(
    input: &MiningInput,
    policy: &MiningPolicy,
    cancel: &AtomicBool,
    mut on_progress: F,
) -> SearchOutcome
where
    F: FnMut(MiningProgress) -> ControlFlow<()>,
{
    let start = Instant::now();
    let mut attempts: u64 = 0;

    for nonce in 0..=policy.nonce_ceiling {
        if cancel.load(Ordering::Relaxed) {
            return SearchOutcome::Cancelled { attempts };
        }

        let hash = input.hash_for(nonce);
        attempts += 1;

        if policy.progress_interval > 0 && attempts % policy.progress_interval == 0 {
            let elapsed = start.elapsed();
            let progress = MiningProgress {
                attempts,
                nonce,
                hash: hash.clone(),
                hash_rate: hash_rate(attempts, elapsed),
                elapsed_ms: elapsed.as_millis() as u64,
            };
            if on_progress(progress).is_break() {
                return SearchOutcome::Cancelled { attempts };
            }
        }

        if meets_proof_of_work(&hash, policy.difficulty) {
            let elapsed = start.elapsed();
            return SearchOutcome::Found(MinedNonce {
                nonce,
                hash,
                attempts,
                hash_rate: hash_rate(attempts, elapsed),
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }
    }

    SearchOutcome::TimedOut {
        attempts,
        ceiling: policy.nonce_ceiling,
    }
}

fn hash_rate(attempts: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (attempts as f64 / secs) as u64
    } else {
        0
    }
}
