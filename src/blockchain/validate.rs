use thiserror::Error;

use super::{Block, meets_proof_of_work};

/// Why a candidate block was refused against its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("index does not follow the previous block")]
    Sequencing,
    #[error("prevHash does not match the previous block's hash")]
    Linkage,
    #[error("hash does not match the block contents")]
    Integrity,
    #[error("hash does not meet the proof-of-work difficulty")]
    ProofOfWork,
}

/// Problems found while walking a whole chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainFault {
    #[error("chain is empty")]
    Empty,
    #[error("genesis block differs from the canonical genesis")]
    Genesis,
    #[error("block #{index} rejected: {reason}")]
    Block { index: u64, reason: Rejection },
}

/// Check `candidate` against `predecessor`. Pure; no I/O.
/// Sequencing, linkage, integrity and Proof-of-Work are checked in that order
/// and the first failure wins.
pub fn validate_successor(
    candidate: &Block,
    predecessor: &Block,
    difficulty: u32,
) -> Result<(), Rejection> {
    if predecessor.index.checked_add(1) != Some(candidate.index) {
        return Err(Rejection::Sequencing);
    }
    if candidate.prev_hash != predecessor.hash {
        return Err(Rejection::Linkage);
    }
    if candidate.hash != candidate.compute_hash() {
        return Err(Rejection::Integrity);
    }
    if !meets_proof_of_work(&candidate.hash, difficulty) {
        return Err(Rejection::ProofOfWork);
    }
    Ok(())
}

pub fn is_chain_valid(candidate: &Block, predecessor: &Block, difficulty: u32) -> bool {
    validate_successor(candidate, predecessor, difficulty).is_ok()
}

/// Validate an entire chain: canonical genesis, then every link.
pub fn verify_chain(chain: &[Block], difficulty: u32) -> Result<(), ChainFault> {
    let genesis = chain.first().ok_or(ChainFault::Empty)?;
    if *genesis != Block::genesis() {
        return Err(ChainFault::Genesis);
    }

    for pair in chain.windows(2) {
        let (prev, current) = (&pair[0], &pair[1]);
        validate_successor(current, prev, difficulty).map_err(|reason| ChainFault::Block {
            index: current.index,
            reason,
        })?;
    }
    Ok(())
}
