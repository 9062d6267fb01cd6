use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use super::{Block, ChainFault, DEFAULT_CHAIN_KEY, Rejection, validate_successor, verify_chain};
use crate::storage::{ChainStore, MemoryStore, StoreError};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("block rejected: {0}")]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Optional slicing of the chain for reads.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    /// Newest-first only for the literal `true`; any other value reads oldest-first.
    #[serde(default, deserialize_with = "literal_true")]
    pub reverse: bool,
}

fn literal_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw == "true")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub blocks: Vec<Block>,
    pub pagination: Pagination,
}

impl Page {
    /// Slice `chain` (newest-first when `reverse`) by offset/limit.
    /// Without a limit (or with `limit=0`) everything from `offset` on is returned.
    pub fn from_chain(mut chain: Vec<Block>, query: PageQuery) -> Self {
        let total = chain.len();
        if query.reverse {
            chain.reverse();
        }

        let start = query.offset.min(total);
        let (limit, end, has_more) = match query.limit.filter(|&limit| limit > 0) {
            Some(limit) => {
                let end = start.saturating_add(limit).min(total);
                (limit, end, query.offset.saturating_add(limit) < total)
            }
            None => (total, total, false),
        };

        let blocks = chain.drain(start..end).collect();
        Self {
            blocks,
            pagination: Pagination {
                total,
                limit,
                offset: query.offset,
                has_more,
            },
        }
    }
}

/// Outcome of a full-chain verification.
#[derive(Debug, Clone)]
pub struct ChainReport {
    pub length: usize,
    pub fault: Option<ChainFault>,
}

/// The canonical chain. Appends (and lazy genesis creation) are serialized by a
/// single writer lock; reads go straight to the store, which replaces the chain
/// as a whole value on every write.
pub struct Ledger {
    store: Box<dyn ChainStore>,
    key: String,
    difficulty: u32,
    writer: Mutex<()>,
}

impl Ledger {
    pub fn new(store: Box<dyn ChainStore>, key: impl Into<String>, difficulty: u32) -> Self {
        Self {
            store,
            key: key.into(),
            difficulty,
            writer: Mutex::new(()),
        }
    }

    /// Ledger over a fresh in-memory store under the default key.
    pub fn in_memory(difficulty: u32) -> Self {
        Self::new(Box::new(MemoryStore::new()), DEFAULT_CHAIN_KEY, difficulty)
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn storage_kind(&self) -> &'static str {
        self.store.kind()
    }

    /// The full chain, genesis first. Creates the genesis chain on first access.
    pub fn read(&self) -> LedgerResult<Vec<Block>> {
        match self.store.get(&self.key)? {
            Some(chain) if !chain.is_empty() => Ok(chain),
            _ => {
                let _guard = self.lock_writer();
                self.load_or_init()
            }
        }
    }

    /// The tail block.
    pub fn latest(&self) -> LedgerResult<Block> {
        let chain = self.read()?;
        Ok(tail(&chain).clone())
    }

    pub fn len(&self) -> LedgerResult<usize> {
        Ok(self.read()?.len())
    }

    /// Validate `candidate` against the current tail and append it.
    /// On any failure the stored chain is left untouched.
    pub fn append(&self, candidate: Block) -> LedgerResult<Block> {
        let _guard = self.lock_writer();
        let mut chain = self.load_or_init()?;

        if let Err(reason) = validate_successor(&candidate, tail(&chain), self.difficulty) {
            warn!(
                "LEDGER - rejected block #{} (nonce={}, hash={}): {}",
                candidate.index, candidate.nonce, candidate.hash, reason
            );
            return Err(reason.into());
        }

        chain.push(candidate.clone());
        self.store.set(&self.key, &chain)?;
        info!(
            "LEDGER - appended block #{} hash={} (length {})",
            candidate.index,
            candidate.hash,
            chain.len()
        );
        Ok(candidate)
    }

    pub fn page(&self, query: PageQuery) -> LedgerResult<Page> {
        Ok(Page::from_chain(self.read()?, query))
    }

    /// Re-validate every stored block from genesis.
    pub fn verify(&self) -> LedgerResult<ChainReport> {
        let chain = self.read()?;
        Ok(ChainReport {
            length: chain.len(),
            fault: verify_chain(&chain, self.difficulty).err(),
        })
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        // the guard protects no data, so a poisoned lock is still usable
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Caller must hold the writer lock.
    fn load_or_init(&self) -> LedgerResult<Vec<Block>> {
        if let Some(chain) = self.store.get(&self.key)? {
            if !chain.is_empty() {
                return Ok(chain);
            }
        }

        let chain = vec![Block::genesis()];
        self.store.set(&self.key, &chain)?;
        info!(
            "LEDGER - initialized chain '{}' with genesis {} ({} storage)",
            self.key,
            chain[0].hash,
            self.store.kind()
        );
        Ok(chain)
    }
}

fn tail(chain: &[Block]) -> &Block {
    chain
        .last()
        .expect("Ledger chain should always hold at least the genesis block")
}
