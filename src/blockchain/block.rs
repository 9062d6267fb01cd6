use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{GENESIS_DATA, GENESIS_PREV_HASH, GENESIS_TIMESTAMP};

/// A single block in the chain. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: String, // ISO 8601, millisecond precision, UTC
    pub data: String,
    pub prev_hash: String,
    pub nonce: u64,   // Proof-of-Work nonce
    pub hash: String, // Cached hash of the block
}

/// SHA-256 over `index|timestamp|data|prevHash|nonce`, as lowercase hex.
pub fn compute_hash(index: u64, timestamp: &str, data: &str, prev_hash: &str, nonce: u64) -> String {
    let preimage = format!("{index}|{timestamp}|{data}|{prev_hash}|{nonce}");
    let mut hasher = Sha256::new();
    hasher.update(preimage.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// True when `hash` starts with `difficulty` literal `'0'` characters.
pub fn meets_proof_of_work(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|c| c == b'0')
}

/// Current UTC time in the fixed block timestamp format, e.g. `2025-01-01T00:00:00.000Z`.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Block {
    /// Create the genesis block. Not mined; built from fixed fields only.
    pub fn genesis() -> Self {
        let mut block = Self {
            index: 0,
            timestamp: GENESIS_TIMESTAMP.to_string(),
            data: GENESIS_DATA.to_string(),
            prev_hash: GENESIS_PREV_HASH.to_string(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// Build the successor of `prev` with the given fields and a locally computed hash.
    /// Nothing here checks Proof-of-Work; that is the validator's job.
    pub fn candidate(prev: &Block, timestamp: String, data: String, nonce: u64) -> Self {
        let mut block = Self {
            index: prev.index + 1,
            timestamp,
            data,
            prev_hash: prev.hash.clone(),
            nonce,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// Recompute the hash from this block's fields (excluding `hash` itself).
    pub fn compute_hash(&self) -> String {
        compute_hash(
            self.index,
            &self.timestamp,
            &self.data,
            &self.prev_hash,
            self.nonce,
        )
    }
}
