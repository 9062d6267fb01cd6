//! Field-level checks on block submissions, applied before the ledger sees them.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::blockchain::{Block, MAX_DATA_CHARS};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("Block data must be a non-empty string")]
    EmptyData,
    #[error("Block data must be 1000 characters or less")]
    DataTooLong,
    #[error("Nonce must be a non-negative integer")]
    InvalidNonce,
    #[error("Timestamp is required")]
    MissingTimestamp,
}

impl SubmissionError {
    /// Machine-readable reason code returned to the caller.
    pub fn code(&self) -> &'static str {
        match self {
            SubmissionError::EmptyData | SubmissionError::DataTooLong => "invalid_data",
            SubmissionError::InvalidNonce => "invalid_nonce",
            SubmissionError::MissingTimestamp => "invalid_timestamp",
        }
    }
}

/// Raw append payload. Fields stay loosely typed so each bad field maps to its own code.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlockRequest {
    pub data: Option<Value>,
    pub nonce: Option<Value>,
    pub timestamp: Option<Value>,
    pub index: Option<u64>,
    pub prev_hash: Option<String>,
    pub hash: Option<String>,
}

/// A submission whose fields passed boundary checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSubmission {
    pub data: String,
    pub nonce: u64,
    pub timestamp: String,
    pub index: Option<u64>,
    pub prev_hash: Option<String>,
    pub hash: Option<String>,
}

/// Trim and bound-check block data.
pub fn normalize_data(data: Option<&Value>) -> Result<String, SubmissionError> {
    let trimmed = data
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SubmissionError::EmptyData)?;
    if trimmed.chars().count() > MAX_DATA_CHARS {
        return Err(SubmissionError::DataTooLong);
    }
    Ok(trimmed.to_string())
}

/// A non-negative integer, also when written as a float such as `5.0`.
fn whole_number(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f < u64::MAX as f64)
            .map(|f| f as u64)
    })
}

impl NewBlockRequest {
    pub fn validate(self) -> Result<BlockSubmission, SubmissionError> {
        let data = normalize_data(self.data.as_ref())?;
        let nonce = self
            .nonce
            .as_ref()
            .and_then(whole_number)
            .ok_or(SubmissionError::InvalidNonce)?;
        let timestamp = self
            .timestamp
            .as_ref()
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(SubmissionError::MissingTimestamp)?
            .to_string();

        Ok(BlockSubmission {
            data,
            nonce,
            timestamp,
            index: self.index,
            prev_hash: self.prev_hash,
            hash: self.hash,
        })
    }
}

impl BlockSubmission {
    /// Candidate block on top of `tail`. Fields the caller supplied are used as
    /// given (and checked by the validator); the rest are derived from `tail`.
    pub fn into_candidate(self, tail: &Block) -> Block {
        let BlockSubmission {
            data,
            nonce,
            timestamp,
            index,
            prev_hash,
            hash,
        } = self;

        let mut block = Block {
            index: index.unwrap_or(tail.index + 1),
            timestamp,
            data,
            prev_hash: prev_hash.unwrap_or_else(|| tail.hash.clone()),
            nonce,
            hash: String::new(),
        };
        block.hash = hash.unwrap_or_else(|| block.compute_hash());
        block
    }
}
